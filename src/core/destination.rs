//! Output destinations for text and file routing

use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

/// A writer shared between the registry and its owner
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// Where one channel's text or file copy goes
#[derive(Clone, Default)]
pub enum Destination {
    /// The registry's stdout stream
    Stdout,
    /// The registry's stderr stream
    Stderr,
    /// Swallow everything
    #[default]
    Discard,
    /// Any other shared writer (files, sockets, buffers)
    Writer(SharedWriter),
}

impl Destination {
    /// Wrap an owned writer
    pub fn writer<W: Write + Send + 'static>(writer: W) -> Self {
        Destination::Writer(Arc::new(Mutex::new(writer)))
    }

    /// Wrap an already shared writer
    pub fn shared(writer: SharedWriter) -> Self {
        Destination::Writer(writer)
    }

    pub fn is_discard(&self) -> bool {
        matches!(self, Destination::Discard)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Destination::Stdout => "stdout",
            Destination::Stderr => "stderr",
            Destination::Discard => "discard",
            Destination::Writer(_) => "writer",
        }
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Destination::{}", self.label())
    }
}

/// The two process streams, replaceable for capture
#[derive(Clone)]
pub struct Streams {
    pub stdout: SharedWriter,
    pub stderr: SharedWriter,
}

impl Streams {
    pub fn process() -> Self {
        Self {
            stdout: Arc::new(Mutex::new(io::stdout())),
            stderr: Arc::new(Mutex::new(io::stderr())),
        }
    }

    /// Write `bytes` to `destination` and flush it
    pub fn write(&self, destination: &Destination, bytes: &[u8]) -> io::Result<()> {
        let target = match destination {
            Destination::Discard => return Ok(()),
            Destination::Stdout => &self.stdout,
            Destination::Stderr => &self.stderr,
            Destination::Writer(writer) => writer,
        };
        let mut guard = target.lock();
        guard.write_all(bytes)?;
        guard.flush()
    }

    /// Write to stderr, ignoring failures
    pub fn write_stderr_lossy(&self, bytes: &[u8]) {
        let mut guard = self.stderr.lock();
        let _ = guard.write_all(bytes);
        let _ = guard.flush();
    }
}

impl Default for Streams {
    fn default() -> Self {
        Self::process()
    }
}

impl fmt::Debug for Streams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Streams")
    }
}
