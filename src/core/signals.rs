//! OS signal subscription
//!
//! A dedicated thread blocks on a `signal_hook` iterator and hands each
//! delivery to a handler, which decides whether listening should stop.
//! Signals that cannot be caught (such as `SIGKILL`) are dropped from the
//! requested set before subscribing.

use super::error::Result;

#[cfg(all(unix, feature = "signals"))]
mod imp {
    use crate::core::error::{OutputError, Result};
    use signal_hook::consts::FORBIDDEN;
    use signal_hook::iterator::{Handle, Signals};
    use std::thread::{self, JoinHandle};

    pub struct SignalListener {
        handle: Handle,
        thread: Option<JoinHandle<()>>,
        subscribed: Vec<i32>,
    }

    impl SignalListener {
        pub fn spawn<F>(requested: &[i32], mut on_signal: F) -> Result<Self>
        where
            F: FnMut(i32) -> bool + Send + 'static,
        {
            let subscribed: Vec<i32> = requested
                .iter()
                .copied()
                .filter(|sig| !FORBIDDEN.contains(sig))
                .collect();

            let mut signals = Signals::new(&subscribed)
                .map_err(|e| OutputError::SignalError(e.to_string()))?;
            let handle = signals.handle();

            let thread = thread::Builder::new()
                .name("output-signals".to_string())
                .spawn(move || {
                    for sig in signals.forever() {
                        if on_signal(sig) {
                            break;
                        }
                    }
                })
                .map_err(|e| OutputError::io_operation("spawning", "signal thread", e))?;

            Ok(Self {
                handle,
                thread: Some(thread),
                subscribed,
            })
        }

        pub fn subscribed(&self) -> &[i32] {
            &self.subscribed
        }

        pub fn close(&mut self) {
            self.handle.close();
            if let Some(thread) = self.thread.take() {
                // The handler may itself close the listener.
                if thread.thread().id() != thread::current().id() {
                    if let Err(e) = thread.join() {
                        eprintln!("[OUTPUT ERROR] Signal thread panicked: {:?}", e);
                    }
                }
            }
        }
    }

    impl Drop for SignalListener {
        fn drop(&mut self) {
            self.close();
        }
    }
}

#[cfg(not(all(unix, feature = "signals")))]
mod imp {
    use crate::core::error::Result;

    /// Stand-in used where signals cannot be subscribed to
    pub struct SignalListener;

    impl SignalListener {
        pub fn spawn<F>(_requested: &[i32], _on_signal: F) -> Result<Self>
        where
            F: FnMut(i32) -> bool + Send + 'static,
        {
            Ok(SignalListener)
        }

        pub fn subscribed(&self) -> &[i32] {
            &[]
        }

        pub fn close(&mut self) {}
    }
}

pub use imp::SignalListener;

/// Start listening for `requested` signals
pub fn listen<F>(requested: &[i32], on_signal: F) -> Result<SignalListener>
where
    F: FnMut(i32) -> bool + Send + 'static,
{
    SignalListener::spawn(requested, on_signal)
}

impl std::fmt::Debug for SignalListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalListener")
            .field("subscribed", &self.subscribed())
            .finish()
    }
}

#[cfg(all(test, unix, feature = "signals"))]
mod tests {
    use super::*;
    use crate::core::shutdown::signal;

    #[test]
    fn test_uncatchable_signals_filtered() {
        let mut listener = listen(&signal::DEFAULT_SET, |_| false).unwrap();
        assert!(!listener.subscribed().contains(&signal::SIGKILL));
        assert!(listener.subscribed().contains(&signal::SIGINT));
        listener.close();
    }
}
