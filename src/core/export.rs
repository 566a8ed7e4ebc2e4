//! Export of log messages to an external syslog-like sink

use super::error::Result;
use std::fmt;

/// The six severity classes an export sink understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportClass {
    Info,
    Notice,
    Warning,
    Error,
    Emergency,
    Debug,
}

impl ExportClass {
    pub fn to_str(&self) -> &'static str {
        match self {
            ExportClass::Info => "info",
            ExportClass::Notice => "notice",
            ExportClass::Warning => "warning",
            ExportClass::Error => "error",
            ExportClass::Emergency => "emergency",
            ExportClass::Debug => "debug",
        }
    }

    /// RFC 5424 numeric severity
    pub fn syslog_code(&self) -> u8 {
        match self {
            ExportClass::Emergency => 0,
            ExportClass::Error => 3,
            ExportClass::Warning => 4,
            ExportClass::Notice => 5,
            ExportClass::Info => 6,
            ExportClass::Debug => 7,
        }
    }
}

impl fmt::Display for ExportClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

/// External sink receiving unformatted messages
///
/// # Example
///
/// ```
/// use rust_output_system::core::{ExportSink, Result};
///
/// struct Quiet;
///
/// impl ExportSink for Quiet {
///     fn info(&self, _msg: &str) -> Result<()> { Ok(()) }
///     fn notice(&self, _msg: &str) -> Result<()> { Ok(()) }
///     fn warning(&self, _msg: &str) -> Result<()> { Ok(()) }
///     fn error(&self, _msg: &str) -> Result<()> { Ok(()) }
///     fn emergency(&self, _msg: &str) -> Result<()> { Ok(()) }
///     fn debug(&self, _msg: &str) -> Result<()> { Ok(()) }
/// }
/// ```
pub trait ExportSink: Send + Sync {
    fn info(&self, msg: &str) -> Result<()>;
    fn notice(&self, msg: &str) -> Result<()>;
    fn warning(&self, msg: &str) -> Result<()>;
    fn error(&self, msg: &str) -> Result<()>;
    fn emergency(&self, msg: &str) -> Result<()>;
    fn debug(&self, msg: &str) -> Result<()>;

    fn name(&self) -> &str {
        "export"
    }

    /// Route `msg` to the method for `class`
    fn export(&self, class: ExportClass, msg: &str) -> Result<()> {
        match class {
            ExportClass::Info => self.info(msg),
            ExportClass::Notice => self.notice(msg),
            ExportClass::Warning => self.warning(msg),
            ExportClass::Error => self.error(msg),
            ExportClass::Emergency => self.emergency(msg),
            ExportClass::Debug => self.debug(msg),
        }
    }
}
