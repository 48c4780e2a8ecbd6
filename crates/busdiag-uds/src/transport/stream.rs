//! Byte stream endpoints

use std::io;

use busdiag_core::BusFrame;

use super::TransportError;

/// An open byte stream (serial port or simulated adapter)
///
/// Calls are short: `read_available` must return promptly with whatever
/// is buffered, `Ok(0)` when nothing is. The connection never holds its
/// lock across a wait for more data.
pub trait StreamHandle: Send {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Drop anything buffered on the input side
    fn clear_input(&mut self) -> io::Result<()>;

    /// Frames delivered whole instead of as a text line
    ///
    /// Carries frames whose direction the dialect cannot print. Serial
    /// ports never have any.
    fn take_frames(&mut self) -> Vec<BusFrame> {
        Vec::new()
    }
}

/// Opens stream handles; called once per connect and once per reconnect attempt
pub trait Connector: Send + Sync {
    fn open(&self) -> Result<Box<dyn StreamHandle>, TransportError>;

    /// Human readable endpoint name for logs
    fn describe(&self) -> String;
}

const MAX_LINE_LEN: usize = 1024;

/// Splits a byte stream into lines on `\r` or `\n`
#[derive(Debug, Default)]
pub struct LineAssembler {
    partial: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every line completed by them
    ///
    /// Empty lines are dropped. A line growing past 1024 bytes without a
    /// terminator is discarded.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\r' || b == b'\n' {
                if !self.partial.is_empty() {
                    lines.push(String::from_utf8_lossy(&self.partial).into_owned());
                    self.partial.clear();
                }
            } else if self.partial.len() >= MAX_LINE_LEN {
                tracing::warn!(len = self.partial.len(), "Discarding unterminated line");
                self.partial.clear();
            } else {
                self.partial.push(b);
            }
        }
        lines
    }

    pub fn clear(&mut self) {
        self.partial.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lines_split_on_either_terminator() {
        let mut lines = LineAssembler::new();
        assert_eq!(lines.push(b"t7E8"), Vec::<String>::new());
        assert_eq!(lines.push(b"0\rz\r\n\nID:1"), vec!["t7E80", "z"]);
        assert_eq!(lines.push(b"00\n"), vec!["ID:100"]);
    }

    #[test]
    fn test_overlong_line_is_discarded() {
        let mut lines = LineAssembler::new();
        let junk = vec![b'x'; MAX_LINE_LEN + 10];
        lines.push(&junk);
        assert_eq!(lines.push(b"\rok\r"), vec!["x".repeat(9), "ok".to_string()]);
    }
}
