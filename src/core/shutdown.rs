//! Shutdown state machine, cleanup stack and in-flight counter
//!
//! The coordinator moves out of [`ShutdownState::Running`] exactly once, via
//! a compare-and-swap, no matter how many fatal calls, exit requests or
//! signal deliveries race for it. Cleanup actions live on a stack and are
//! handed to the drain in LIFO order; protected operations hold the drain
//! back until the in-flight counter reaches zero.

use super::error::{CleanupResult, OutputError, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Conventional signal numbers
pub mod signal {
    pub const SIGHUP: i32 = 1;
    pub const SIGINT: i32 = 2;
    pub const SIGKILL: i32 = 9;
    pub const SIGTERM: i32 = 15;

    /// Signals subscribed to when none are configured
    pub const DEFAULT_SET: [i32; 4] = [SIGINT, SIGTERM, SIGHUP, SIGKILL];
}

/// Exit code conventionally used after `sig`
///
/// ```
/// use rust_output_system::core::shutdown::{signal, signal_exit_code};
///
/// assert_eq!(signal_exit_code(signal::SIGINT), 130);
/// assert_eq!(signal_exit_code(signal::SIGKILL), 0);
/// ```
pub fn signal_exit_code(sig: i32) -> i32 {
    match sig {
        signal::SIGINT => 130,
        signal::SIGHUP => 129,
        signal::SIGTERM => 143,
        _ => 0,
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running = 0,
    FatalTriggered = 1,
    ExitRequested = 2,
}

impl ShutdownState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ShutdownState::FatalTriggered,
            2 => ShutdownState::ExitRequested,
            _ => ShutdownState::Running,
        }
    }
}

/// What started a shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    Fatal,
    Exit(i32),
    Signal(i32),
}

impl ShutdownTrigger {
    pub fn exit_code(self) -> i32 {
        match self {
            ShutdownTrigger::Fatal => 1,
            ShutdownTrigger::Exit(code) => code,
            ShutdownTrigger::Signal(sig) => signal_exit_code(sig),
        }
    }

    pub fn state(self) -> ShutdownState {
        match self {
            ShutdownTrigger::Fatal => ShutdownState::FatalTriggered,
            ShutdownTrigger::Exit(_) | ShutdownTrigger::Signal(_) => ShutdownState::ExitRequested,
        }
    }
}

pub type CleanupAction = Box<dyn FnOnce() -> CleanupResult + Send>;

/// Per-signal hook; returning `false` vetoes the delivery
pub type SignalCallback = Arc<dyn Fn() -> bool + Send + Sync>;

pub struct ShutdownCoordinator {
    state: AtomicU8,
    exit_code: Mutex<Option<i32>>,
    next_id: AtomicU64,
    cleanups: Mutex<Vec<(u64, CleanupAction)>>,
    in_flight: Mutex<usize>,
    idle: Condvar,
    callbacks: Mutex<HashMap<i32, SignalCallback>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ShutdownState::Running as u8),
            exit_code: Mutex::new(None),
            next_id: AtomicU64::new(1),
            cleanups: Mutex::new(Vec::new()),
            in_flight: Mutex::new(0),
            idle: Condvar::new(),
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state() != ShutdownState::Running
    }

    /// Exit code of the shutdown in progress, if any
    pub fn requested_code(&self) -> Option<i32> {
        *self.exit_code.lock()
    }

    /// Claim the single transition out of `Running`
    ///
    /// Every caller but the first gets [`OutputError::ShuttingDown`].
    pub fn try_begin(&self, trigger: ShutdownTrigger) -> Result<()> {
        match self.state.compare_exchange(
            ShutdownState::Running as u8,
            trigger.state() as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                *self.exit_code.lock() = Some(trigger.exit_code());
                Ok(())
            }
            Err(_) => Err(OutputError::ShuttingDown),
        }
    }

    /// Push `action` onto the cleanup stack
    pub fn register_cleanup<F>(self: &Arc<Self>, action: F) -> CleanupHandle
    where
        F: FnOnce() -> CleanupResult + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.cleanups.lock().push((id, Box::new(action)));
        CleanupHandle {
            id,
            owner: Arc::downgrade(self),
        }
    }

    /// Register an infallible cleanup action
    pub fn on_shutdown<F>(self: &Arc<Self>, action: F) -> CleanupHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.register_cleanup(move || {
            action();
            Ok(())
        })
    }

    fn remove_cleanup(&self, id: u64) -> Option<CleanupAction> {
        let mut cleanups = self.cleanups.lock();
        let position = cleanups.iter().position(|(entry, _)| *entry == id)?;
        Some(cleanups.remove(position).1)
    }

    /// Take every registered action, most recent first
    pub fn take_cleanups(&self) -> Vec<CleanupAction> {
        let stack = std::mem::take(&mut *self.cleanups.lock());
        stack.into_iter().rev().map(|(_, action)| action).collect()
    }

    pub fn pending_cleanups(&self) -> usize {
        self.cleanups.lock().len()
    }

    /// Mark one protected operation as started
    pub fn block(&self) {
        *self.in_flight.lock() += 1;
    }

    /// Mark one protected operation as finished. Extra calls are ignored.
    pub fn unblock(&self) {
        let mut count = self.in_flight.lock();
        if *count > 0 {
            *count -= 1;
            if *count == 0 {
                self.idle.notify_all();
            }
        }
    }

    /// RAII form of [`block`](Self::block) / [`unblock`](Self::unblock)
    pub fn guard(self: &Arc<Self>) -> ShutdownGuard {
        self.block();
        ShutdownGuard {
            owner: Arc::clone(self),
        }
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock()
    }

    /// Block until no protected operation is running
    pub fn wait_idle(&self) {
        let mut count = self.in_flight.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }

    /// Like [`wait_idle`](Self::wait_idle) but gives up after `timeout`;
    /// returns whether the counter reached zero.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.in_flight.lock();
        while *count > 0 {
            if self.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }

    pub fn set_signal_callback(&self, sig: i32, callback: SignalCallback) {
        self.callbacks.lock().insert(sig, callback);
    }

    pub fn clear_signal_callback(&self, sig: i32) {
        self.callbacks.lock().remove(&sig);
    }

    /// Ask the callback registered for `sig` whether to shut down.
    /// Signals without a callback are approved.
    pub fn approve_signal(&self, sig: i32) -> bool {
        let callback = self.callbacks.lock().get(&sig).cloned();
        match callback {
            Some(callback) => callback(),
            None => true,
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("state", &self.state())
            .field("pending_cleanups", &self.pending_cleanups())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Handle to one registered cleanup action
#[derive(Debug)]
pub struct CleanupHandle {
    id: u64,
    owner: Weak<ShutdownCoordinator>,
}

impl CleanupHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the action and run it now
    ///
    /// If the drain already took the action this does nothing and returns
    /// `Ok(())`; an action never runs twice.
    pub fn run(self) -> CleanupResult {
        let action = self.owner.upgrade().and_then(|owner| owner.remove_cleanup(self.id));
        match action {
            Some(action) => action(),
            None => Ok(()),
        }
    }

    /// Remove the action without running it
    pub fn cancel(self) -> bool {
        self.owner
            .upgrade()
            .and_then(|owner| owner.remove_cleanup(self.id))
            .is_some()
    }
}

/// Keeps the drain waiting while alive
#[must_use = "the shutdown is only held back while the guard is alive"]
pub struct ShutdownGuard {
    owner: Arc<ShutdownCoordinator>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.owner.unblock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_single_transition() {
        let shutdown = ShutdownCoordinator::new();
        assert_eq!(shutdown.state(), ShutdownState::Running);
        assert_eq!(shutdown.requested_code(), None);

        shutdown.try_begin(ShutdownTrigger::Signal(signal::SIGTERM)).unwrap();
        assert_eq!(shutdown.state(), ShutdownState::ExitRequested);
        assert_eq!(shutdown.requested_code(), Some(143));

        let second = shutdown.try_begin(ShutdownTrigger::Fatal);
        assert!(matches!(second, Err(OutputError::ShuttingDown)));
        assert_eq!(shutdown.state(), ShutdownState::ExitRequested);
        assert_eq!(shutdown.requested_code(), Some(143));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ShutdownTrigger::Fatal.exit_code(), 1);
        assert_eq!(ShutdownTrigger::Exit(7).exit_code(), 7);
        assert_eq!(ShutdownTrigger::Signal(signal::SIGHUP).exit_code(), 129);
        assert_eq!(ShutdownTrigger::Signal(signal::SIGINT).exit_code(), 130);
        assert_eq!(ShutdownTrigger::Signal(10).exit_code(), 0);
    }

    #[test]
    fn test_cleanups_taken_lifo() {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["close-db", "flush-log", "release-lock"] {
            let order = Arc::clone(&order);
            shutdown.on_shutdown(move || order.lock().push(name));
        }

        for action in shutdown.take_cleanups() {
            action().unwrap();
        }

        assert_eq!(*order.lock(), vec!["release-lock", "flush-log", "close-db"]);
        assert_eq!(shutdown.pending_cleanups(), 0);
    }

    #[test]
    fn test_handle_runs_at_most_once() {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let runs = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&runs);
        let handle = shutdown.on_shutdown(move || *counter.lock() += 1);

        let taken = shutdown.take_cleanups();
        assert!(handle.run().is_ok());
        assert_eq!(*runs.lock(), 0);

        for action in taken {
            action().unwrap();
        }
        assert_eq!(*runs.lock(), 1);
    }

    #[test]
    fn test_handle_run_returns_action_error() {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let keep = shutdown.on_shutdown(|| {});
        let handle = shutdown.register_cleanup(|| Err("lock file missing".into()));

        let err = handle.run().unwrap_err();
        assert_eq!(err.to_string(), "lock file missing");
        assert_eq!(shutdown.pending_cleanups(), 1);
        assert!(keep.cancel());
        assert_eq!(shutdown.pending_cleanups(), 0);
    }

    #[test]
    fn test_unblock_never_goes_negative() {
        let shutdown = ShutdownCoordinator::new();
        shutdown.unblock();
        assert_eq!(shutdown.in_flight(), 0);
        shutdown.block();
        shutdown.block();
        shutdown.unblock();
        assert_eq!(shutdown.in_flight(), 1);
        assert!(!shutdown.wait_idle_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_wait_idle_waits_for_guard() {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let guard = shutdown.guard();
        let waiter = {
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                let start = Instant::now();
                shutdown.wait_idle();
                start.elapsed()
            })
        };

        thread::sleep(Duration::from_millis(50));
        drop(guard);
        let waited = waiter.join().unwrap();
        assert!(waited >= Duration::from_millis(40), "waited {:?}", waited);
    }

    #[test]
    fn test_signal_callback_veto() {
        let shutdown = ShutdownCoordinator::new();
        assert!(shutdown.approve_signal(signal::SIGINT));

        shutdown.set_signal_callback(signal::SIGINT, Arc::new(|| false));
        assert!(!shutdown.approve_signal(signal::SIGINT));
        assert!(shutdown.approve_signal(signal::SIGTERM));

        shutdown.clear_signal_callback(signal::SIGINT);
        assert!(shutdown.approve_signal(signal::SIGINT));
    }
}
