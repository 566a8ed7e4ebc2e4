//! Severity and channel definitions
//!
//! A [`Severity`] names one log category. Configuration calls take a set of
//! severities (`BitFlags<Severity>`), while every dispatch targets exactly one
//! [`Channel`]: either a severity or one of the internal pseudo-channels used
//! for plain printing and flash lines.

use enumflags2::{bitflags, BitFlags};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::export::ExportClass;

#[bitflags]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info = 1 << 0,
    Error = 1 << 1,
    Warn = 1 << 2,
    Notice = 1 << 3,
    Debug = 1 << 4,
    Trace = 1 << 5,
    Fatal = 1 << 6,
    Aux = 1 << 7,
    Aux2 = 1 << 8,
    Aux3 = 1 << 9,
    Aux4 = 1 << 10,
}

/// Number of severities in the lookup table
pub const SEVERITY_COUNT: usize = 11;

impl Severity {
    /// All severities except debug and trace
    pub fn standard() -> BitFlags<Severity> {
        BitFlags::all() & !(Severity::Debug | Severity::Trace)
    }

    /// Every severity
    pub fn all() -> BitFlags<Severity> {
        BitFlags::all()
    }

    /// Position of this severity in the lookup table
    #[inline]
    pub fn index(self) -> usize {
        (self as u16).trailing_zeros() as usize
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Error => "ERROR",
            Severity::Warn => "WARN",
            Severity::Notice => "NOTICE",
            Severity::Debug => "DEBUG",
            Severity::Trace => "TRACE",
            Severity::Fatal => "FATAL",
            Severity::Aux => "AUX",
            Severity::Aux2 => "AUX2",
            Severity::Aux3 => "AUX3",
            Severity::Aux4 => "AUX4",
        }
    }

    /// Prefix a fresh registry assigns to this severity
    pub fn default_prefix(&self) -> &'static str {
        match self {
            Severity::Error => "[ERROR] ",
            Severity::Warn => "[WARN] ",
            Severity::Notice => "[NOTICE] ",
            Severity::Debug => "[DEBUG] ",
            Severity::Trace => "[TRACE] ",
            Severity::Fatal => "[FATAL] ",
            _ => "",
        }
    }

    /// Export sink method this severity is forwarded to
    pub fn export_class(&self) -> ExportClass {
        match self {
            Severity::Info | Severity::Aux | Severity::Aux2 | Severity::Aux3 | Severity::Aux4 => {
                ExportClass::Info
            }
            Severity::Error => ExportClass::Error,
            Severity::Warn => ExportClass::Warning,
            Severity::Fatal => ExportClass::Emergency,
            Severity::Notice => ExportClass::Notice,
            Severity::Debug | Severity::Trace => ExportClass::Debug,
        }
    }

    pub fn color_code(&self) -> colored::Color {
        use colored::Color::*;
        match self {
            Severity::Trace => BrightBlack,
            Severity::Debug => Blue,
            Severity::Info | Severity::Aux | Severity::Aux2 | Severity::Aux3 | Severity::Aux4 => {
                Green
            }
            Severity::Notice => Cyan,
            Severity::Warn => Yellow,
            Severity::Error => Red,
            Severity::Fatal => BrightRed,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INFO" => Ok(Severity::Info),
            "ERROR" | "ERR" => Ok(Severity::Error),
            "WARN" | "WARNING" => Ok(Severity::Warn),
            "NOTICE" => Ok(Severity::Notice),
            "DEBUG" => Ok(Severity::Debug),
            "TRACE" => Ok(Severity::Trace),
            "FATAL" => Ok(Severity::Fatal),
            "AUX" => Ok(Severity::Aux),
            "AUX2" => Ok(Severity::Aux2),
            "AUX3" => Ok(Severity::Aux3),
            "AUX4" => Ok(Severity::Aux4),
            _ => Err(format!("Invalid severity: '{}'", s)),
        }
    }
}

/// Target of a single dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Level(Severity),
    /// Plain stdout output, never copied to files
    Print,
    /// Plain stderr output, never copied to files
    Stderr,
    /// Overwrite-in-place status line
    Flash,
}

/// Number of entries in the writer table
pub const CHANNEL_COUNT: usize = SEVERITY_COUNT + 3;

impl Channel {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Channel::Level(severity) => severity.index(),
            Channel::Print => SEVERITY_COUNT,
            Channel::Stderr => SEVERITY_COUNT + 1,
            Channel::Flash => SEVERITY_COUNT + 2,
        }
    }

    /// Pseudo-channels carry no prefix, no timestamp and are never
    /// copied to files or exported.
    #[inline]
    pub fn is_no_log(self) -> bool {
        !matches!(self, Channel::Level(_))
    }

    #[inline]
    pub fn severity(self) -> Option<Severity> {
        match self {
            Channel::Level(severity) => Some(severity),
            _ => None,
        }
    }
}

impl From<Severity> for Channel {
    fn from(severity: Severity) -> Self {
        Channel::Level(severity)
    }
}
