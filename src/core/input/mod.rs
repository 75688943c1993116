use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::JoinHandle;
use std::time::Instant;
use thiserror::Error;

mod linux_evdev;

/// Linux key code of Escape; pressing it ends the session.
pub const KEY_ESC: u16 = 1;

/// Capacity of the queue between the reader thread and the frame loop.
pub const INPUT_QUEUE_CAPACITY: usize = 128;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("unable to open input device {path:?}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unable to start input thread: {0}")]
    Spawn(std::io::Error),
}

/// A key edge as read from the device, stamped on arrival.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub code: u16,
    pub pressed: bool,
    pub timestamp: Instant,
}

/// Physical key code to chart column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keymap {
    codes: Vec<u16>,
}

impl Keymap {
    pub fn new(codes: Vec<u16>) -> Self {
        Self { codes }
    }

    /// Parses a comma separated list such as `12,40,17,50`.
    pub fn parse(list: &str) -> Option<Self> {
        let codes = list
            .split(',')
            .map(|c| c.trim().parse::<u16>().ok())
            .collect::<Option<Vec<u16>>>()?;
        if codes.is_empty() {
            return None;
        }
        Some(Self { codes })
    }

    #[inline(always)]
    pub fn column_of(&self, code: u16) -> Option<u8> {
        self.codes.iter().position(|&c| c == code).map(|i| i as u8)
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn to_list(&self) -> String {
        self.codes
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

pub fn channel() -> (SyncSender<RawKeyEvent>, Receiver<RawKeyEvent>) {
    mpsc::sync_channel(INPUT_QUEUE_CAPACITY)
}

/// Opens an evdev node and forwards its key edges from a dedicated thread.
/// The thread stops when the device errors or the receiver is dropped.
pub fn spawn_device_reader(path: &Path, tx: SyncSender<RawKeyEvent>) -> Result<JoinHandle<()>, InputError> {
    let file = std::fs::File::open(path).map_err(|source| InputError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path.display().to_string();
    std::thread::Builder::new()
        .name("input".to_string())
        .spawn(move || {
            linux_evdev::run(file, &name, |ev| tx.send(ev).is_ok());
        })
        .map_err(InputError::Spawn)
}

#[cfg(test)]
mod tests {
    use super::Keymap;

    #[test]
    fn keymap_maps_codes_to_columns() {
        let map = Keymap::parse("12, 40,17,50").unwrap();
        assert_eq!(map.len(), 4);
        assert_eq!(map.column_of(12), Some(0));
        assert_eq!(map.column_of(50), Some(3));
        assert_eq!(map.column_of(1), None);
        assert_eq!(map.to_list(), "12,40,17,50");
    }

    #[test]
    fn malformed_keymaps_are_rejected() {
        assert!(Keymap::parse("12,x,17").is_none());
        assert!(Keymap::parse("").is_none());
    }
}
