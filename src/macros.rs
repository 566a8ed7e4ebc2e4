//! Formatting macros for the coordinator
//!
//! Each macro takes the coordinator first, then `format!` arguments.
//!
//! # Examples
//!
//! ```
//! use rust_output_system::prelude::*;
//! use rust_output_system::sinks::MemoryWriter;
//! use rust_output_system::{info, warn};
//!
//! let stdout = MemoryWriter::new();
//! let output = Coordinator::builder().stdout(stdout.clone()).build();
//!
//! info!(output, "Server started");
//! warn!(output, "Retry {} of {}", 3, 5);
//! assert_eq!(stdout.contents(), "Server started\n[WARN] Retry 3 of 5\n");
//! ```

/// Log a formatted message at the given severity.
///
/// ```
/// # use rust_output_system::prelude::*;
/// # let output = Coordinator::builder().build();
/// use rust_output_system::log;
/// log!(output, Severity::Aux2, "Synced {} rows", 12);
/// ```
#[macro_export]
macro_rules! log {
    ($output:expr, $severity:expr, $($arg:tt)+) => {
        $output.log($severity, format!($($arg)+))
    };
}

#[macro_export]
macro_rules! trace {
    ($output:expr, $($arg:tt)+) => {
        $crate::log!($output, $crate::Severity::Trace, $($arg)+)
    };
}

#[macro_export]
macro_rules! debug {
    ($output:expr, $($arg:tt)+) => {
        $crate::log!($output, $crate::Severity::Debug, $($arg)+)
    };
}

#[macro_export]
macro_rules! info {
    ($output:expr, $($arg:tt)+) => {
        $crate::log!($output, $crate::Severity::Info, $($arg)+)
    };
}

#[macro_export]
macro_rules! notice {
    ($output:expr, $($arg:tt)+) => {
        $crate::log!($output, $crate::Severity::Notice, $($arg)+)
    };
}

#[macro_export]
macro_rules! warn {
    ($output:expr, $($arg:tt)+) => {
        $crate::log!($output, $crate::Severity::Warn, $($arg)+)
    };
}

#[macro_export]
macro_rules! error {
    ($output:expr, $($arg:tt)+) => {
        $crate::log!($output, $crate::Severity::Error, $($arg)+)
    };
}

/// Log at the auxiliary severity.
#[macro_export]
macro_rules! aux {
    ($output:expr, $($arg:tt)+) => {
        $crate::log!($output, $crate::Severity::Aux, $($arg)+)
    };
}

/// Log at Fatal and terminate. Never returns.
///
/// ```no_run
/// # use rust_output_system::prelude::*;
/// # let output = Coordinator::builder().build();
/// use rust_output_system::fatal;
/// fatal!(output, "Unable to open {}", "config.json");
/// ```
#[macro_export]
macro_rules! fatal {
    ($output:expr, $($arg:tt)+) => {
        $output.fatal(format!($($arg)+))
    };
}
