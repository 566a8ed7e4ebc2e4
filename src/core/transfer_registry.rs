//! Registry of active transfers and the thread that animates them

use super::severity::Severity;
use super::transfer::TransferState;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Delay between two status-line frames
pub const FRAME_INTERVAL: Duration = Duration::from_millis(200);

/// Frames shown for one stream before moving on to the next
pub const FRAMES_PER_STREAM: usize = 10;

const SPINNER: [&str; 4] = ["\\", "|", "/", "-"];

/// Where transfers send their frames and summaries
pub trait StatusOutput: Send + Sync {
    /// Show a transient status line
    fn flash(&self, line: &str);

    /// Log a permanent line
    fn log(&self, severity: Severity, line: &str);

    /// Usable terminal width
    fn width(&self) -> usize;
}

#[derive(Debug, Default)]
struct Spinner {
    index: usize,
}

impl Spinner {
    fn next(&mut self) -> &'static str {
        self.index = (self.index + 1) % SPINNER.len();
        SPINNER[self.index]
    }
}

struct Worker {
    cancel: Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct RenderState {
    streams: Vec<Arc<TransferState>>,
    running: bool,
    worker: Option<Worker>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<RenderState>,
    active: AtomicBool,
}

#[derive(Default)]
pub struct TransferRegistry {
    shared: Arc<Shared>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether transfers are currently being displayed
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Arc<TransferState>> {
        self.shared.state.lock().streams.clone()
    }

    /// Add `stream` and start the render thread if it is not running
    pub fn register(&self, stream: Arc<TransferState>, output: Weak<dyn StatusOutput>) {
        let finished = {
            let mut state = self.shared.state.lock();
            state.streams.push(stream);
            self.shared.active.store(true, Ordering::Release);
            if state.running {
                return;
            }

            let (cancel, cancelled) = bounded(0);
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name("output-transfers".to_string())
                .spawn(move || render_loop(shared, output, cancelled));

            match spawned {
                Ok(handle) => {
                    state.running = true;
                    state.worker.replace(Worker { cancel, handle })
                }
                Err(e) => {
                    eprintln!("[OUTPUT ERROR] Failed to start transfer display: {}", e);
                    None
                }
            }
        };

        // A previous loop that already exited on its own
        if let Some(worker) = finished {
            let _ = worker.handle.join();
        }
    }

    /// Stop the render thread and wait for it
    pub fn stop(&self) {
        let worker = {
            let mut state = self.shared.state.lock();
            state.running = false;
            state.worker.take()
        };
        if let Some(Worker { cancel, handle }) = worker {
            drop(cancel);
            if handle.thread().id() != thread::current().id() {
                if let Err(e) = handle.join() {
                    eprintln!("[OUTPUT ERROR] Transfer display thread panicked: {:?}", e);
                }
            }
        }
        self.shared.active.store(false, Ordering::Release);
    }
}

impl Drop for TransferRegistry {
    fn drop(&mut self) {
        self.stop();
    }
}

fn render_loop(shared: Arc<Shared>, output: Weak<dyn StatusOutput>, cancelled: Receiver<()>) {
    let mut spinner = Spinner::default();
    loop {
        let streams = {
            let mut state = shared.state.lock();
            state.streams.retain(|stream| !stream.is_closed());
            if state.streams.is_empty() {
                state.running = false;
                shared.active.store(false, Ordering::Release);
                return;
            }
            state.streams.clone()
        };

        for stream in streams {
            for _ in 0..FRAMES_PER_STREAM {
                if stream.is_closed() || !stream.is_active() {
                    break;
                }
                match output.upgrade() {
                    Some(output) => {
                        let line = stream.status_line(output.width());
                        output.flash(&format!("[{}] {}", spinner.next(), line));
                    }
                    None => return,
                }
                match cancelled.recv_timeout(FRAME_INTERVAL) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => return,
                }
            }
        }
    }
}
