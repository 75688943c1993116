use std::fmt::Write as _;
use std::io::{self, Write};

/// Cell-addressed drawing surface. Rows and columns are 1-based terminal
/// coordinates.
pub trait Renderer {
    fn init(&mut self) -> io::Result<()>;
    fn fill(&mut self, row: u16, col: u16, glyph: &str);
    fn flush(&mut self) -> io::Result<()>;
    fn deinit(&mut self) -> io::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Wraps `text` in a 24-bit foreground colour.
pub fn colored(color: Rgb, text: &str) -> String {
    format!("\x1b[38;2;{};{};{}m{text}\x1b[0m", color.0, color.1, color.2)
}

/// Writes ANSI cursor moves into a frame buffer and emits it on flush.
pub struct TerminalRenderer<W: Write> {
    out: W,
    buffer: String,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            buffer: String::with_capacity(16 * 1024),
        }
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn init(&mut self) -> io::Result<()> {
        // Alternate screen, hide cursor, home, clear.
        self.out.write_all(b"\x1b[?1049h\x1b[?25l\x1b[H\x1b[J")?;
        self.out.flush()
    }

    #[inline(always)]
    fn fill(&mut self, row: u16, col: u16, glyph: &str) {
        let _ = write!(self.buffer, "\x1b[{row};{col}H{glyph}");
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.out.write_all(self.buffer.as_bytes())?;
        self.buffer.clear();
        self.out.flush()
    }

    fn deinit(&mut self) -> io::Result<()> {
        self.flush()?;
        self.out.write_all(b"\x1b[?1049l\x1b[?25h")?;
        self.out.flush()
    }
}

/// Terminal size as `(rows, columns)`, if stdout is a terminal.
#[cfg(unix)]
pub fn terminal_size() -> Option<(u16, u16)> {
    let mut ws = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let rc = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };
    if rc != 0 || ws.ws_row == 0 || ws.ws_col == 0 {
        return None;
    }
    Some((ws.ws_row, ws.ws_col))
}

#[cfg(not(unix))]
pub fn terminal_size() -> Option<(u16, u16)> {
    None
}

/// Keeps every fill in memory; used to inspect what a frame drew.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingRenderer {
    pub cells: Vec<(u16, u16, String)>,
    pub flushes: usize,
}

#[cfg(test)]
impl RecordingRenderer {
    pub fn contains(&self, needle: &str) -> bool {
        self.cells.iter().any(|(_, _, g)| g.contains(needle))
    }
}

#[cfg(test)]
impl Renderer for RecordingRenderer {
    fn init(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn fill(&mut self, row: u16, col: u16, glyph: &str) {
        self.cells.push((row, col, glyph.to_string()));
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn deinit(&mut self) -> io::Result<()> {
        Ok(())
    }
}
