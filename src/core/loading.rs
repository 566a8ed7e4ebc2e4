//! Animated "please wait" indicator
//!
//! The animation runs on its own thread and flashes one frame every
//! [`FRAME_INTERVAL`] while shown. Frames are skipped whenever transfers are
//! being displayed, so the two animations never fight over the status line.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const FRAME_INTERVAL: Duration = Duration::from_millis(125);

/// Text and frames of the indicator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadingStyle {
    pub message: String,
    /// Shown before the message
    pub frames: Vec<String>,
    /// Shown after the message, one per frame; may be empty
    pub trailing: Vec<String>,
}

impl LoadingStyle {
    pub fn new(message: &str, frames: &[&str]) -> Self {
        Self {
            message: message.to_string(),
            frames: frames.iter().map(|f| f.to_string()).collect(),
            trailing: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_trailing(mut self, trailing: &[&str]) -> Self {
        self.trailing = trailing.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Frame number `index`, wrapping around
    pub fn frame(&self, index: usize) -> String {
        if self.frames.is_empty() {
            return self.message.clone();
        }
        let index = index % self.frames.len();
        match self.trailing.get(index) {
            Some(trailing) => format!("{} {} {}", self.frames[index], self.message, trailing),
            None => format!("{} {}", self.frames[index], self.message),
        }
    }
}

impl Default for LoadingStyle {
    fn default() -> Self {
        Self::new(
            "Please wait ...",
            &[
                "[>  ]", "[>> ]", "[>>>]", "[ >>]", "[  >]", "[  <]", "[ <<]", "[<<<]", "[<< ]",
                "[<  ]",
            ],
        )
    }
}

/// What the indicator draws on
pub trait LoadingOutput: Send + Sync {
    fn flash(&self, line: &str);

    /// Clear the status line
    fn clear(&self);

    /// True while transfers own the status line
    fn transfers_active(&self) -> bool;
}

struct Worker {
    cancel: Sender<()>,
    handle: JoinHandle<()>,
}

struct Shared {
    shown: AtomicBool,
    style: Mutex<LoadingStyle>,
}

pub struct LoadingIndicator {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl LoadingIndicator {
    pub fn new(style: LoadingStyle) -> Self {
        Self {
            shared: Arc::new(Shared {
                shown: AtomicBool::new(false),
                style: Mutex::new(style),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn is_shown(&self) -> bool {
        self.shared.shown.load(Ordering::Acquire)
    }

    /// Start animating on `output`
    pub fn show(&self, output: Weak<dyn LoadingOutput>) {
        self.shared.shown.store(true, Ordering::Release);
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }

        let (cancel, cancelled) = bounded(0);
        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("output-loading".to_string())
            .spawn(move || animate(shared, output, cancelled))
        {
            Ok(handle) => *worker = Some(Worker { cancel, handle }),
            Err(e) => eprintln!("[OUTPUT ERROR] Failed to start loading indicator: {}", e),
        }
    }

    /// Stop animating and clear the status line
    pub fn hide(&self, output: Option<&dyn LoadingOutput>) {
        self.shared.shown.store(false, Ordering::Release);
        let worker = self.worker.lock().take();
        if let Some(Worker { cancel, handle }) = worker {
            drop(cancel);
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        if let Some(output) = output {
            output.clear();
        }
    }

    /// Current style, for restoring later
    pub fn style(&self) -> LoadingStyle {
        self.shared.style.lock().clone()
    }

    /// Replace the style; a running animation picks it up on its next frame
    pub fn set_style(&self, style: LoadingStyle) {
        *self.shared.style.lock() = style;
    }
}

impl Default for LoadingIndicator {
    fn default() -> Self {
        Self::new(LoadingStyle::default())
    }
}

impl Drop for LoadingIndicator {
    fn drop(&mut self) {
        self.hide(None);
    }
}

fn animate(shared: Arc<Shared>, output: Weak<dyn LoadingOutput>, cancelled: Receiver<()>) {
    let mut index = 0usize;
    loop {
        if shared.shown.load(Ordering::Acquire) {
            let Some(output) = output.upgrade() else {
                return;
            };
            if !output.transfers_active() {
                let frame = shared.style.lock().frame(index);
                output.flash(&frame);
            }
        }
        index = index.wrapping_add(1);

        match cancelled.recv_timeout(FRAME_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => return,
        }
    }
}
