//! Writers and export sinks usable as destinations

pub mod memory;
pub mod network;
pub mod rotating_file;

pub use memory::MemoryWriter;
pub use network::SyslogSink;
pub use rotating_file::{RotatingFile, RotationPolicy};
