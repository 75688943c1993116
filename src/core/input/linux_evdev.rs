use super::RawKeyEvent;
use log::{error, trace};
use std::io::{ErrorKind, Read};
use std::time::Instant;

const EV_KEY: u16 = 0x01;

// `struct input_event` on 64-bit Linux.
const EVENT_SIZE: usize = 24;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct InputEventRaw {
    tv_sec: i64,
    tv_usec: i64,
    type_: u16,
    code: u16,
    value: i32,
}

#[inline(always)]
fn field<const N: usize>(buf: &[u8; EVENT_SIZE], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[at..at + N]);
    out
}

impl InputEventRaw {
    fn decode(buf: &[u8; EVENT_SIZE]) -> Self {
        Self {
            tv_sec: i64::from_ne_bytes(field(buf, 0)),
            tv_usec: i64::from_ne_bytes(field(buf, 8)),
            type_: u16::from_ne_bytes(field(buf, 16)),
            code: u16::from_ne_bytes(field(buf, 18)),
            value: i32::from_ne_bytes(field(buf, 20)),
        }
    }
}

/// Reads events until the device fails or `emit` returns false.
pub(super) fn run(mut device: impl Read, name: &str, mut emit: impl FnMut(RawKeyEvent) -> bool) {
    let mut buf = [0u8; EVENT_SIZE];
    loop {
        if let Err(e) = device.read_exact(&mut buf) {
            if e.kind() != ErrorKind::UnexpectedEof {
                error!("Unable to read keyboard input from {name}: {e}");
            }
            return;
        }
        let ev = InputEventRaw::decode(&buf);
        if ev.type_ != EV_KEY {
            continue;
        }
        // 0 = release, 1 = press, 2 = autorepeat
        if ev.value == 2 {
            continue;
        }
        let timestamp = Instant::now();
        trace!(
            "key code={} value={} kernel_time={}.{:06}",
            ev.code, ev.value, ev.tv_sec, ev.tv_usec
        );
        let forwarded = emit(RawKeyEvent {
            code: ev.code,
            pressed: ev.value != 0,
            timestamp,
        });
        if !forwarded {
            return;
        }
    }
}
