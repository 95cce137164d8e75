//! Log capture for TUI mode
//!
//! `LogBuffer` implements `MakeWriter`, so tracing-subscriber writes log lines
//! into memory instead of stderr while the alternate screen is up. The TUI
//! drains it every frame and shows the newest line in the status bar.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

/// Lines kept between drains; older ones are dropped first.
const CAPACITY: usize = 200;

/// Shared ring buffer of complete log lines.
#[derive(Clone, Default)]
pub struct LogBuffer {
    inner: Arc<Mutex<VecDeque<String>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line, evicting the oldest at capacity.
    ///
    /// A poisoned lock is recovered; logging must not cascade a panic.
    pub fn push(&self, line: String) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if guard.len() >= CAPACITY {
            guard.pop_front();
        }
        guard.push_back(line);
    }

    /// Take every buffered line, oldest first.
    pub fn drain(&self) -> Vec<String> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.drain(..).collect()
    }
}

/// Per-event writer. Bytes are buffered until a newline completes a line.
pub struct BufferWriter {
    buffer: LogBuffer,
    pending: Vec<u8>,
}

impl BufferWriter {
    fn new(buffer: LogBuffer) -> Self {
        Self {
            buffer,
            pending: Vec::new(),
        }
    }

    fn push_pending(&mut self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        let line = text.trim_end();
        if !line.is_empty() {
            self.buffer.push(line.to_string());
        }
    }
}

impl Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.push_pending(&line);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.push_pending(&rest);
        }
        Ok(())
    }
}

impl Drop for BufferWriter {
    fn drop(&mut self) {
        let _ = Write::flush(self);
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = BufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BufferWriter::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_empties_buffer() {
        let buf = LogBuffer::new();
        buf.push("one".to_string());
        buf.push("two".to_string());
        assert_eq!(buf.drain(), vec!["one", "two"]);
        assert!(buf.drain().is_empty());
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let buf = LogBuffer::new();
        for i in 0..CAPACITY + 5 {
            buf.push(format!("line {}", i));
        }
        let lines = buf.drain();
        assert_eq!(lines.len(), CAPACITY);
        assert_eq!(lines[0], "line 5");
    }

    #[test]
    fn test_writer_splits_lines_and_flushes_tail_on_drop() {
        let buf = LogBuffer::new();
        {
            let mut writer = buf.make_writer();
            write!(writer, " INFO connected\r\nWARN lost\npartial").unwrap();
            assert_eq!(buf.drain(), vec![" INFO connected", "WARN lost"]);
        }
        assert_eq!(buf.drain(), vec!["partial"]);
    }
}
