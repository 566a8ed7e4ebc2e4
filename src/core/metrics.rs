//! Output metrics for observability
//!
//! Counters describing how the coordinator's output paths behaved:
//! lines written, status-line frames shown or dropped under contention,
//! and the failures that feed the fatal-on-error policy.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for output observability
///
/// # Example
///
/// ```
/// use rust_output_system::OutputMetrics;
///
/// let metrics = OutputMetrics::new();
/// metrics.record_line();
/// metrics.record_flash_dropped();
///
/// assert_eq!(metrics.lines_written(), 1);
/// assert_eq!(metrics.flash_dropped(), 1);
/// ```
#[derive(Debug)]
pub struct OutputMetrics {
    /// Lines written to a text destination
    lines_written: AtomicU64,

    /// Status-line frames written to the terminal
    flash_written: AtomicU64,

    /// Status-line frames dropped because the registry was busy
    flash_dropped: AtomicU64,

    /// Failed writes to file destinations
    file_errors: AtomicU64,

    /// Failed exports to the external sink
    export_errors: AtomicU64,

    /// Cleanup actions that returned an error during shutdown
    cleanup_errors: AtomicU64,
}

impl OutputMetrics {
    /// Create a new metrics instance with all counters at zero
    pub const fn new() -> Self {
        Self {
            lines_written: AtomicU64::new(0),
            flash_written: AtomicU64::new(0),
            flash_dropped: AtomicU64::new(0),
            file_errors: AtomicU64::new(0),
            export_errors: AtomicU64::new(0),
            cleanup_errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn lines_written(&self) -> u64 {
        self.lines_written.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn flash_written(&self) -> u64 {
        self.flash_written.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn flash_dropped(&self) -> u64 {
        self.flash_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn file_errors(&self) -> u64 {
        self.file_errors.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn export_errors(&self) -> u64 {
        self.export_errors.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn cleanup_errors(&self) -> u64 {
        self.cleanup_errors.load(Ordering::Relaxed)
    }

    /// Record a line written; returns the previous count
    #[inline]
    pub fn record_line(&self) -> u64 {
        self.lines_written.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_flash(&self) -> u64 {
        self.flash_written.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_flash_dropped(&self) -> u64 {
        self.flash_dropped.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_file_error(&self) -> u64 {
        self.file_errors.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_export_error(&self) -> u64 {
        self.export_errors.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_cleanup_error(&self) -> u64 {
        self.cleanup_errors.fetch_add(1, Ordering::Relaxed)
    }

    /// Share of status-line frames that were dropped, as a percentage
    ///
    /// Returns 0.0 if no frames were attempted.
    pub fn flash_drop_rate(&self) -> f64 {
        let dropped = self.flash_dropped() as f64;
        let total = self.flash_written() as f64 + dropped;
        if total == 0.0 {
            0.0
        } else {
            (dropped / total) * 100.0
        }
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        self.lines_written.store(0, Ordering::Relaxed);
        self.flash_written.store(0, Ordering::Relaxed);
        self.flash_dropped.store(0, Ordering::Relaxed);
        self.file_errors.store(0, Ordering::Relaxed);
        self.export_errors.store(0, Ordering::Relaxed);
        self.cleanup_errors.store(0, Ordering::Relaxed);
    }
}

impl Default for OutputMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for OutputMetrics {
    /// Create a snapshot of the current metrics values
    fn clone(&self) -> Self {
        Self {
            lines_written: AtomicU64::new(self.lines_written()),
            flash_written: AtomicU64::new(self.flash_written()),
            flash_dropped: AtomicU64::new(self.flash_dropped()),
            file_errors: AtomicU64::new(self.file_errors()),
            export_errors: AtomicU64::new(self.export_errors()),
            cleanup_errors: AtomicU64::new(self.cleanup_errors()),
        }
    }
}
