//! Core coordinator types and traits

pub mod config;
pub mod coordinator;
pub mod destination;
pub mod error;
pub mod export;
pub mod loading;
pub mod metrics;
pub mod progress;
pub mod registry;
pub mod renderer;
pub mod severity;
pub mod shutdown;
pub mod signals;
pub mod timestamp;
pub mod transfer;
pub mod transfer_registry;

pub use config::OutputConfig;
pub use coordinator::{global, stringer, Coordinator, CoordinatorBuilder, Terminator};
pub use destination::{Destination, SharedWriter, Streams};
pub use error::{CleanupError, CleanupResult, OutputError, Result};
pub use export::{ExportClass, ExportSink};
pub use loading::{LoadingIndicator, LoadingOutput, LoadingStyle};
pub use metrics::OutputMetrics;
pub use progress::ProgressBar;
pub use registry::{DispatchOutcome, SeverityRegistry, WriterConfig};
pub use renderer::{LineRenderer, TerminalState};
pub use severity::{Channel, Severity};
pub use shutdown::{
    CleanupHandle, ShutdownCoordinator, ShutdownGuard, ShutdownState, ShutdownTrigger,
};
pub use signals::SignalListener;
pub use timestamp::Timezone;
pub use transfer::{CountingReader, TransferFlag, TransferState, TransferStream, UNKNOWN_SIZE};
pub use transfer_registry::{StatusOutput, TransferRegistry};
