//! Counter-driven progress bars

use super::transfer::TransferState;
use std::sync::Arc;

/// Progress bar advanced by hand instead of by a reader
///
/// Shown on the status line like a transfer, without a rate and without a
/// completion summary.
#[derive(Debug)]
pub struct ProgressBar {
    state: Arc<TransferState>,
    done: bool,
}

impl ProgressBar {
    pub(crate) fn new(state: Arc<TransferState>) -> Self {
        Self { state, done: false }
    }

    /// Advance by `n`
    pub fn add(&self, n: u64) {
        self.state.record(usize::try_from(n).unwrap_or(usize::MAX));
    }

    /// Jump to `n`
    pub fn set(&self, n: u64) {
        self.state.reposition(i64::try_from(n).unwrap_or(i64::MAX));
    }

    pub fn position(&self) -> i64 {
        self.state.transferred()
    }

    pub fn percent(&self) -> u8 {
        self.state.percent()
    }

    /// Remove the bar from the status line
    pub fn done(&mut self) {
        if !self.done {
            self.done = true;
            self.state.mark_closed();
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl Drop for ProgressBar {
    fn drop(&mut self) {
        self.done();
    }
}
