//! # Rust Output System
//!
//! Process-wide output and shutdown coordination for command line tools.
//!
//! ## Features
//!
//! - **Severity Routing**: Eleven severities, each with its own prefix,
//!   display destination, timestamped file copy and optional export
//! - **Status Line**: Transient flash lines that never interleave with
//!   regular output
//! - **Transfers**: Byte-counting readers with animated progress and a
//!   summary line on completion
//! - **Graceful Shutdown**: One winner among fatal errors, exit requests
//!   and signals; LIFO cleanups; blocking sections that delay termination
//!
//! ## Example
//!
//! ```
//! use rust_output_system::prelude::*;
//! use rust_output_system::sinks::MemoryWriter;
//!
//! let stdout = MemoryWriter::new();
//! let output = Coordinator::builder()
//!     .stdout(stdout.clone())
//!     .terminator(|_code| {})
//!     .build();
//!
//! output.on_shutdown(|| println!("closing database"));
//! output.info("done");
//! output.request_exit(0).unwrap();
//! assert_eq!(output.state(), ShutdownState::ExitRequested);
//! ```

pub mod core;
pub mod macros;
pub mod sinks;

pub mod prelude {
    pub use crate::core::{
        global, stringer, Channel, CleanupHandle, Coordinator, CoordinatorBuilder, Destination,
        ExportClass, ExportSink, LoadingStyle, OutputConfig, OutputError, OutputMetrics,
        ProgressBar, Result, Severity, ShutdownGuard, ShutdownState, TerminalState, Timezone,
        TransferFlag, TransferStream, WriterConfig,
    };
}

pub use crate::core::{
    global, stringer, Channel, CleanupHandle, Coordinator, CoordinatorBuilder, CountingReader,
    Destination, ExportClass, ExportSink, LoadingStyle, OutputConfig, OutputError, OutputMetrics,
    ProgressBar, Result, Severity, ShutdownGuard, ShutdownState, ShutdownTrigger, TerminalState,
    Timezone, TransferFlag, TransferState, TransferStream, WriterConfig,
};
pub use sinks::{MemoryWriter, RotatingFile, RotationPolicy, SyslogSink};
