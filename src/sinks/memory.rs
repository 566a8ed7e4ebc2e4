//! In-memory writer for capturing output

use crate::core::Destination;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

/// Cloneable in-memory byte sink
///
/// Every clone shares the same buffer, so one handle can be routed into the
/// registry while another inspects what was written.
///
/// # Example
///
/// ```
/// use rust_output_system::sinks::MemoryWriter;
/// use std::io::Write;
///
/// let capture = MemoryWriter::new();
/// let mut handle = capture.clone();
/// handle.write_all(b"hello").unwrap();
/// assert_eq!(capture.contents(), "hello");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Destination writing into this buffer
    pub fn destination(&self) -> Destination {
        Destination::writer(self.clone())
    }

    /// Buffer contents, lossily decoded
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }

    /// Drain the buffer, returning what it held
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.buffer.lock());
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
