//! Syslog export over TCP
//!
//! Sends each exported message to a remote collector as one
//! `<PRI>tag[pid]: message` line, reconnecting once when the connection
//! has dropped.

use crate::core::error::{OutputError, Result};
use crate::core::export::{ExportClass, ExportSink};
use parking_lot::Mutex;
use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;

/// Syslog facility "user-level messages"
const FACILITY_USER: u8 = 1;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Export sink writing syslog lines to a TCP collector
///
/// # Example
///
/// ```no_run
/// use rust_output_system::sinks::SyslogSink;
/// use rust_output_system::Coordinator;
/// use std::sync::Arc;
///
/// let sink = SyslogSink::connect("127.0.0.1:514", "backup-tool")
///     .expect("Failed to connect to syslog collector");
///
/// let output = Coordinator::builder().build();
/// output.hook_export(Arc::new(sink));
/// output.error("disk almost full");
/// ```
pub struct SyslogSink {
    address: String,
    tag: String,
    stream: Mutex<Option<TcpStream>>,
    reconnect_on_error: bool,
}

impl SyslogSink {
    /// Connect to `address`, tagging every line with `tag`
    ///
    /// # Errors
    ///
    /// Returns error if connection fails
    pub fn connect(address: &str, tag: &str) -> Result<Self> {
        let stream = Self::open(address)?;
        Ok(Self {
            address: address.to_string(),
            tag: tag.to_string(),
            stream: Mutex::new(Some(stream)),
            reconnect_on_error: true,
        })
    }

    /// Enable or disable a reconnect attempt after a failed send
    ///
    /// Default: enabled
    #[must_use]
    pub fn with_reconnect(mut self, enable: bool) -> Self {
        self.reconnect_on_error = enable;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn open(address: &str) -> Result<TcpStream> {
        let stream = TcpStream::connect(address).map_err(|e| {
            OutputError::io_operation("connecting", format!("syslog collector {}", address), e)
        })?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// One syslog line for `msg` at `class`
    pub fn format_line(&self, class: ExportClass, msg: &str) -> String {
        let priority = FACILITY_USER * 8 + class.syslog_code();
        format!(
            "<{}>{}[{}]: {}\n",
            priority,
            self.tag,
            std::process::id(),
            msg.trim_end_matches('\n')
        )
    }

    fn send(&self, class: ExportClass, msg: &str) -> Result<()> {
        let line = self.format_line(class, msg);
        let mut stream = self.stream.lock();

        let first = match stream.as_mut() {
            Some(conn) => conn.write_all(line.as_bytes()),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "syslog stream not connected",
            )),
        };

        let err = match first {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        *stream = None;

        if !self.reconnect_on_error {
            return Err(OutputError::export(class.to_str(), err.to_string()));
        }

        match Self::open(&self.address) {
            Ok(mut conn) => {
                conn.write_all(line.as_bytes())
                    .map_err(|e| OutputError::export(class.to_str(), e.to_string()))?;
                *stream = Some(conn);
                Ok(())
            }
            Err(reconnect_err) => Err(OutputError::export(
                class.to_str(),
                format!("{} (reconnect: {})", err, reconnect_err),
            )),
        }
    }
}

impl ExportSink for SyslogSink {
    fn info(&self, msg: &str) -> Result<()> {
        self.send(ExportClass::Info, msg)
    }

    fn notice(&self, msg: &str) -> Result<()> {
        self.send(ExportClass::Notice, msg)
    }

    fn warning(&self, msg: &str) -> Result<()> {
        self.send(ExportClass::Warning, msg)
    }

    fn error(&self, msg: &str) -> Result<()> {
        self.send(ExportClass::Error, msg)
    }

    fn emergency(&self, msg: &str) -> Result<()> {
        self.send(ExportClass::Emergency, msg)
    }

    fn debug(&self, msg: &str) -> Result<()> {
        self.send(ExportClass::Debug, msg)
    }

    fn name(&self) -> &str {
        "syslog"
    }
}

impl Drop for SyslogSink {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.get_mut().as_mut() {
            let _ = stream.flush();
        }
    }
}
