//! The output and shutdown coordinator
//!
//! [`Coordinator`] owns one of each component: the severity registry, the
//! transfer registry, the loading indicator and the shutdown state machine.
//! It is cheap to clone; every clone drives the same instance.

use super::config::OutputConfig;
use super::destination::{Destination, Streams};
use super::error::{CleanupResult, OutputError, Result};
use super::export::ExportSink;
use super::loading::{LoadingIndicator, LoadingOutput, LoadingStyle};
use super::metrics::OutputMetrics;
use super::progress::ProgressBar;
use super::registry::{SeverityRegistry, WriterConfig};
use super::renderer::TerminalState;
use super::severity::{Channel, Severity};
use super::shutdown::{
    CleanupHandle, ShutdownCoordinator, ShutdownGuard, ShutdownState, ShutdownTrigger,
};
use super::signals::{self, SignalListener};
use super::timestamp::Timezone;
use super::transfer::{TransferFlag, TransferState, TransferStream};
use super::transfer_registry::{StatusOutput, TransferRegistry};
use crate::sinks::{RotatingFile, RotationPolicy};
use enumflags2::BitFlags;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

/// Called with the exit code once the drain is complete
pub type Terminator = Arc<dyn Fn(i32) + Send + Sync>;

static GLOBAL: Lazy<Coordinator> =
    Lazy::new(|| Coordinator::builder().handle_signals(true).build());

/// Process-wide coordinator writing to the real stdout and stderr and
/// listening for the default signals.
pub fn global() -> &'static Coordinator {
    &GLOBAL
}

/// Comma-join `values` into one message
///
/// ```
/// use rust_output_system::stringer;
///
/// assert_eq!(stringer(&[&"copied", &3, &"files"]), "copied, 3, files");
/// ```
pub fn stringer(values: &[&dyn fmt::Display]) -> String {
    values
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

fn exit_process(code: i32) {
    std::process::exit(code)
}

fn park_forever() -> ! {
    loop {
        thread::park();
    }
}

struct Inner {
    me: Weak<Inner>,
    registry: SeverityRegistry,
    transfers: TransferRegistry,
    shutdown: Arc<ShutdownCoordinator>,
    loading: LoadingIndicator,
    metrics: Arc<OutputMetrics>,
    fatal_on_file_error: AtomicBool,
    fatal_on_export_error: AtomicBool,
    animations: AtomicBool,
    terminator: Terminator,
    signals: Mutex<Option<SignalListener>>,
}

impl Inner {
    /// Ordinary lines stop once a fatal shutdown has begun, so the fatal
    /// message stays last.
    fn emit(&self, channel: Channel, message: &[u8]) {
        if channel == Channel::Flash {
            self.show_flash(&String::from_utf8_lossy(message));
            return;
        }
        if self.shutdown.state() == ShutdownState::FatalTriggered {
            return;
        }
        self.emit_bypass(channel, message);
    }

    /// Write even during a fatal shutdown
    fn emit_bypass(&self, channel: Channel, message: &[u8]) {
        let outcome = self.registry.dispatch(channel, message);
        if let Some(err) = outcome.file_error {
            if self.fatal_on_file_error.load(Ordering::Acquire) {
                self.escalate(err);
            }
        }
        if let Some(err) = outcome.export_error {
            if self.fatal_on_export_error.load(Ordering::Acquire) {
                self.escalate(err);
            }
        }
    }

    /// Turn an output failure into a fatal shutdown on a fresh thread
    fn escalate(&self, err: OutputError) {
        if self.shutdown.is_shutting_down() {
            return;
        }
        let Some(inner) = self.me.upgrade() else {
            return;
        };
        let message = err.to_string();
        let spawned = thread::Builder::new()
            .name("output-fatal".to_string())
            .spawn(move || {
                let _ = inner.trigger_fatal(&message);
            });
        if let Err(e) = spawned {
            eprintln!("[OUTPUT ERROR] Failed to escalate '{}': {}", err, e);
        }
    }

    fn show_flash(&self, line: &str) {
        if !self.animations.load(Ordering::Acquire) || self.shutdown.is_shutting_down() {
            return;
        }
        self.registry.flash(line);
    }

    fn trigger_fatal(&self, message: &str) -> Result<()> {
        self.shutdown.try_begin(ShutdownTrigger::Fatal)?;
        self.emit_bypass(Severity::Fatal.into(), message.as_bytes());
        self.drain(ShutdownTrigger::Fatal.exit_code());
        Ok(())
    }

    fn request_exit(&self, code: i32) -> Result<()> {
        self.shutdown.try_begin(ShutdownTrigger::Exit(code))?;
        self.drain(code);
        Ok(())
    }

    /// Returns true once listening for signals can stop
    fn deliver_signal(&self, sig: i32) -> bool {
        if self.shutdown.is_shutting_down() {
            return true;
        }
        if !self.shutdown.approve_signal(sig) {
            return false;
        }
        let trigger = ShutdownTrigger::Signal(sig);
        if self.shutdown.try_begin(trigger).is_ok() {
            self.drain(trigger.exit_code());
        }
        true
    }

    fn drain(&self, code: i32) {
        for action in self.shutdown.take_cleanups() {
            let failure = match panic::catch_unwind(AssertUnwindSafe(action)) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(payload) => format!("Cleanup panicked: {}", panic_message(payload.as_ref())),
            };
            self.metrics.record_cleanup_error();
            self.emit_bypass(Severity::Error.into(), failure.as_bytes());
        }

        self.shutdown.wait_idle();
        self.loading.hide(None);
        self.transfers.stop();
        self.registry.clear_flash();
        (self.terminator)(code);
    }

    fn status_output(&self) -> Weak<dyn StatusOutput> {
        self.me.clone()
    }

    fn loading_output(&self) -> Weak<dyn LoadingOutput> {
        self.me.clone()
    }
}

impl StatusOutput for Inner {
    fn flash(&self, line: &str) {
        self.show_flash(line);
    }

    fn log(&self, severity: Severity, line: &str) {
        self.emit(severity.into(), line.as_bytes());
    }

    fn width(&self) -> usize {
        self.registry.width()
    }
}

impl LoadingOutput for Inner {
    fn flash(&self, line: &str) {
        self.show_flash(line);
    }

    fn clear(&self) {
        self.registry.clear_flash();
    }

    fn transfers_active(&self) -> bool {
        self.transfers.is_active()
    }
}

/// Handle to the output and shutdown coordinator
///
/// # Example
///
/// ```
/// use rust_output_system::prelude::*;
/// use rust_output_system::sinks::MemoryWriter;
///
/// let stdout = MemoryWriter::new();
/// let output = Coordinator::builder()
///     .stdout(stdout.clone())
///     .terminator(|_code| {})
///     .build();
///
/// output.info("starting");
/// output.warn(format!("{} files skipped", 2));
/// assert_eq!(stdout.contents(), "starting\n[WARN] 2 files skipped\n");
/// ```
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    #[must_use]
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::new()
    }

    pub fn metrics(&self) -> &OutputMetrics {
        &self.inner.metrics
    }

    pub fn terminal(&self) -> TerminalState {
        self.inner.registry.terminal()
    }

    // ---- logging ----

    /// Log `message` at `severity`
    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        self.inner.emit(severity.into(), message.into().as_bytes());
    }

    /// Pass raw bytes through unchanged
    pub fn log_bytes(&self, channel: Channel, bytes: &[u8]) {
        self.inner.emit(channel, bytes);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Severity::Info, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Severity::Error, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(Severity::Warn, message);
    }

    pub fn notice(&self, message: impl Into<String>) {
        self.log(Severity::Notice, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Severity::Debug, message);
    }

    pub fn trace(&self, message: impl Into<String>) {
        self.log(Severity::Trace, message);
    }

    pub fn aux(&self, message: impl Into<String>) {
        self.log(Severity::Aux, message);
    }

    pub fn aux2(&self, message: impl Into<String>) {
        self.log(Severity::Aux2, message);
    }

    pub fn aux3(&self, message: impl Into<String>) {
        self.log(Severity::Aux3, message);
    }

    pub fn aux4(&self, message: impl Into<String>) {
        self.log(Severity::Aux4, message);
    }

    /// Plain line to stdout: no prefix, no timestamp, no file copy
    pub fn stdout(&self, message: impl Into<String>) {
        self.inner.emit(Channel::Print, message.into().as_bytes());
    }

    /// Plain line to stderr: no prefix, no timestamp, no file copy
    pub fn stderr(&self, message: impl Into<String>) {
        self.inner.emit(Channel::Stderr, message.into().as_bytes());
    }

    /// Show a transient status line on a terminal
    pub fn flash(&self, message: impl Into<String>) {
        self.inner.show_flash(&message.into());
    }

    pub fn clear_flash(&self) {
        self.inner.registry.clear_flash();
    }

    // ---- routing ----

    pub fn set_output(&self, levels: impl Into<BitFlags<Severity>>, destination: Destination) {
        self.inner.registry.set_output(levels, destination);
    }

    pub fn set_file(&self, levels: impl Into<BitFlags<Severity>>, destination: Destination) {
        self.inner.registry.set_file(levels, destination);
    }

    pub fn set_prefix(&self, levels: impl Into<BitFlags<Severity>>, prefix: &str) {
        self.inner.registry.set_prefix(levels, prefix);
    }

    pub fn show_timestamps(&self, levels: impl Into<BitFlags<Severity>>) {
        self.inner.registry.show_timestamps(levels);
    }

    pub fn hide_timestamps(&self, levels: impl Into<BitFlags<Severity>>) {
        self.inner.registry.hide_timestamps(levels);
    }

    pub fn configure(&self, levels: impl Into<BitFlags<Severity>>, config: WriterConfig) {
        self.inner.registry.configure(levels, config);
    }

    pub fn writer_config(&self, severity: Severity) -> WriterConfig {
        self.inner.registry.writer_config(severity)
    }

    pub fn enable_export(&self, levels: impl Into<BitFlags<Severity>>) {
        self.inner.registry.enable_export(levels);
    }

    pub fn disable_export(&self, levels: impl Into<BitFlags<Severity>>) {
        self.inner.registry.disable_export(levels);
    }

    pub fn hook_export(&self, sink: Arc<dyn ExportSink>) {
        self.inner.registry.hook_export(sink);
    }

    pub fn unhook_export(&self) {
        self.inner.registry.unhook_export();
    }

    /// Set the timestamp zone by name; an invalid name keeps the current zone
    pub fn set_timezone(&self, name: &str) -> Result<()> {
        let timezone = Timezone::parse(name)?;
        self.inner.registry.set_timezone(timezone);
        Ok(())
    }

    pub fn timezone(&self) -> Timezone {
        self.inner.registry.timezone()
    }

    pub fn set_colors(&self, enabled: bool) {
        self.inner.registry.set_colors(enabled);
    }

    pub fn set_animations(&self, enabled: bool) {
        self.inner.animations.store(enabled, Ordering::Release);
        if !enabled {
            self.inner.loading.hide(Some(&*self.inner));
        }
    }

    pub fn set_fatal_on_file_error(&self, enabled: bool) {
        self.inner.fatal_on_file_error.store(enabled, Ordering::Release);
    }

    pub fn set_fatal_on_export_error(&self, enabled: bool) {
        self.inner
            .fatal_on_export_error
            .store(enabled, Ordering::Release);
    }

    /// Apply every setting in `config`
    ///
    /// A setting that cannot be applied keeps its previous value; the
    /// first such failure is returned after the rest have been applied.
    pub fn apply_config(&self, config: &OutputConfig) -> Result<()> {
        let registry = &self.inner.registry;
        let mut first_error = None;

        match config.parsed_timezone() {
            Ok(timezone) => registry.set_timezone(timezone),
            Err(e) => first_error = Some(e),
        }
        registry.hide_timestamps(Severity::all());
        registry.show_timestamps(config.timestamp_levels());
        registry.disable_export(Severity::all());
        registry.enable_export(config.export_levels());
        for (severity, prefix) in &config.prefixes {
            registry.set_prefix(*severity, prefix);
        }
        registry.set_colors(config.colors);

        self.set_fatal_on_file_error(config.fatal_on_file_error);
        self.set_fatal_on_export_error(config.fatal_on_export_error);
        self.set_animations(config.animations);

        if config.handle_signals {
            if let Err(e) = self.set_signals(&config.signals) {
                first_error.get_or_insert(e);
            }
        } else {
            self.stop_signals();
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Open a size-rotated log file for use with [`set_file`](Self::set_file)
    ///
    /// The file is flushed by a cleanup action when the process shuts down.
    pub fn log_file<P: AsRef<Path>>(
        &self,
        path: P,
        max_mb: u64,
        max_rotation: usize,
    ) -> Result<Destination> {
        let file = RotatingFile::open(path, RotationPolicy::megabytes(max_mb, max_rotation))?;
        let shared = Arc::new(Mutex::new(file));
        let flushed = Arc::clone(&shared);
        self.register_cleanup(move || {
            flushed.lock().flush()?;
            Ok(())
        });
        Ok(Destination::shared(shared))
    }

    // ---- transfers ----

    /// Track reads from `source` as a transfer of `total_size` bytes
    /// (`-1` when unknown).
    pub fn transfer<R: Read>(
        &self,
        name: &str,
        total_size: i64,
        flags: impl Into<BitFlags<TransferFlag>>,
        source: R,
    ) -> TransferStream<R> {
        self.transfer_with_prefix(name, total_size, flags, source, "")
    }

    /// Like [`transfer`](Self::transfer); `prefix` leads the summary line
    pub fn transfer_with_prefix<R: Read>(
        &self,
        name: &str,
        total_size: i64,
        flags: impl Into<BitFlags<TransferFlag>>,
        source: R,
        prefix: &str,
    ) -> TransferStream<R> {
        let state = Arc::new(TransferState::new(name, total_size, flags, prefix));
        self.display_transfer(&state);
        TransferStream::new(source, state, self.inner.status_output())
    }

    /// Hand-driven progress bar counting up to `max`
    pub fn progress_bar(&self, name: &str, max: u64) -> ProgressBar {
        let total = i64::try_from(max).unwrap_or(i64::MAX);
        let state = Arc::new(TransferState::internal(name, total));
        self.display_transfer(&state);
        ProgressBar::new(state)
    }

    fn display_transfer(&self, state: &Arc<TransferState>) {
        if self.inner.animations.load(Ordering::Acquire) && !self.is_shutting_down() {
            self.inner
                .transfers
                .register(Arc::clone(state), self.inner.status_output());
        }
    }

    pub fn transfers_active(&self) -> bool {
        self.inner.transfers.is_active()
    }

    // ---- loading indicator ----

    pub fn show_loading(&self) {
        if self.inner.animations.load(Ordering::Acquire) {
            self.inner.loading.show(self.inner.loading_output());
        }
    }

    pub fn hide_loading(&self) {
        self.inner.loading.hide(Some(&*self.inner));
    }

    pub fn loading_style(&self) -> LoadingStyle {
        self.inner.loading.style()
    }

    pub fn set_loading_style(&self, style: LoadingStyle) {
        self.inner.loading.set_style(style);
    }

    // ---- shutdown ----

    pub fn state(&self) -> ShutdownState {
        self.inner.shutdown.state()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_shutting_down()
    }

    pub fn shutdown_requested_code(&self) -> Option<i32> {
        self.inner.shutdown.requested_code()
    }

    /// Run `action` during shutdown; the handle runs it early instead
    pub fn register_cleanup<F>(&self, action: F) -> CleanupHandle
    where
        F: FnOnce() -> CleanupResult + Send + 'static,
    {
        self.inner.shutdown.register_cleanup(action)
    }

    pub fn on_shutdown<F>(&self, action: F) -> CleanupHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.shutdown.on_shutdown(action)
    }

    pub fn block_shutdown(&self) {
        self.inner.shutdown.block();
    }

    pub fn unblock_shutdown(&self) {
        self.inner.shutdown.unblock();
    }

    /// Hold the shutdown back until the guard is dropped
    pub fn shutdown_guard(&self) -> ShutdownGuard {
        self.inner.shutdown.guard()
    }

    /// Log `message` at Fatal and shut down with code 1
    ///
    /// Returns [`OutputError::ShuttingDown`] if a shutdown already started.
    pub fn trigger_fatal(&self, message: &str) -> Result<()> {
        self.inner.trigger_fatal(message)
    }

    /// Shut down with `code`
    ///
    /// Returns [`OutputError::ShuttingDown`] if a shutdown already started.
    pub fn request_exit(&self, code: i32) -> Result<()> {
        self.inner.request_exit(code)
    }

    /// Log `message` at Fatal and terminate the process
    ///
    /// Never returns. A caller that loses the race to another shutdown
    /// parks until the process exits.
    pub fn fatal(&self, message: impl Into<String>) -> ! {
        let _ = self.inner.trigger_fatal(&message.into());
        park_forever()
    }

    /// Terminate the process with `code`, see [`fatal`](Self::fatal)
    pub fn exit(&self, code: i32) -> ! {
        let _ = self.inner.request_exit(code);
        park_forever()
    }

    /// Deliver `sig` as if the OS had sent it; returns whether it was
    /// accepted rather than vetoed.
    pub fn raise(&self, sig: i32) -> bool {
        self.inner.deliver_signal(sig)
    }

    /// Hook consulted before `sig` shuts the process down; returning
    /// `false` ignores that delivery.
    pub fn signal_callback<F>(&self, sig: i32, callback: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.inner.shutdown.set_signal_callback(sig, Arc::new(callback));
    }

    pub fn clear_signal_callback(&self, sig: i32) {
        self.inner.shutdown.clear_signal_callback(sig);
    }

    /// Replace the set of signals that trigger a shutdown
    pub fn set_signals(&self, requested: &[i32]) -> Result<()> {
        let mut slot = self.inner.signals.lock();
        if let Some(mut previous) = slot.take() {
            previous.close();
        }
        let weak = self.inner.me.clone();
        let listener = signals::listen(requested, move |sig| match weak.upgrade() {
            Some(inner) => inner.deliver_signal(sig),
            None => true,
        })?;
        *slot = Some(listener);
        Ok(())
    }

    pub fn stop_signals(&self) {
        if let Some(mut listener) = self.inner.signals.lock().take() {
            listener.close();
        }
    }

    /// Run `main` and shut down with its exit code
    ///
    /// A panic inside `main` is logged at Fatal with its message and
    /// backtrace and ends in a fatal shutdown.
    pub fn try_run<F>(&self, main: F) -> Result<()>
    where
        F: FnOnce() -> i32,
    {
        let backtrace = Arc::new(Mutex::new(None::<String>));
        let slot = Arc::clone(&backtrace);
        let main_thread = thread::current().id();

        // Panics on other threads still reach the hook installed before us
        let previous = Arc::new(panic::take_hook());
        let chained = Arc::clone(&previous);
        panic::set_hook(Box::new(move |info| {
            if thread::current().id() == main_thread {
                *slot.lock() = Some(std::backtrace::Backtrace::force_capture().to_string());
            } else {
                (**chained)(info);
            }
        }));
        let outcome = panic::catch_unwind(AssertUnwindSafe(main));
        drop(panic::take_hook());
        match Arc::try_unwrap(previous) {
            Ok(hook) => panic::set_hook(hook),
            Err(shared) => panic::set_hook(Box::new(move |info| (**shared)(info))),
        }

        match outcome {
            Ok(code) => self.inner.request_exit(code),
            Err(payload) => {
                let mut message = format!("panic: {}", panic_message(payload.as_ref()));
                if let Some(trace) = backtrace.lock().take() {
                    message.push('\n');
                    message.push_str(trace.trim_end());
                }
                self.inner.trigger_fatal(&message)
            }
        }
    }

    /// Process entry point: run `main`, then terminate
    ///
    /// ```no_run
    /// use rust_output_system::global;
    ///
    /// fn main() {
    ///     global().run(|| {
    ///         global().info("working");
    ///         0
    ///     })
    /// }
    /// ```
    pub fn run<F>(&self, main: F) -> !
    where
        F: FnOnce() -> i32,
    {
        let _ = self.try_run(main);
        park_forever()
    }

    /// Stop background threads and clear the status line
    ///
    /// Does not run cleanup actions or terminate.
    pub fn close(&self) {
        self.stop_signals();
        self.inner.loading.hide(None);
        self.inner.transfers.stop();
        self.inner.registry.clear_flash();
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("state", &self.state())
            .field("terminal", &self.terminal())
            .field("shutdown", &self.inner.shutdown)
            .finish()
    }
}

/// Builder for [`Coordinator`]
///
/// Signal handling is opt-in here, so coordinators built in tests never
/// capture the process's signals.
///
/// # Example
///
/// ```
/// use rust_output_system::prelude::*;
/// use rust_output_system::sinks::MemoryWriter;
///
/// let output = Coordinator::builder()
///     .stdout(MemoryWriter::new())
///     .stderr(MemoryWriter::new())
///     .terminal(TerminalState::piped())
///     .width(100)
///     .fatal_on_file_error(false)
///     .terminator(|code| println!("would exit with {}", code))
///     .build();
/// assert_eq!(output.state(), ShutdownState::Running);
/// ```
pub struct CoordinatorBuilder {
    stdout: Option<Destination>,
    stderr: Option<Destination>,
    terminal: Option<TerminalState>,
    width: Option<usize>,
    terminator: Option<Terminator>,
    config: OutputConfig,
}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        Self {
            stdout: None,
            stderr: None,
            terminal: None,
            width: None,
            terminator: None,
            config: OutputConfig {
                handle_signals: false,
                ..OutputConfig::default()
            },
        }
    }

    /// Write what would go to stdout into `writer`
    #[must_use = "builder methods return a new value"]
    pub fn stdout<W: Write + Send + 'static>(mut self, writer: W) -> Self {
        self.stdout = Some(Destination::writer(writer));
        self
    }

    /// Write what would go to stderr into `writer`
    #[must_use = "builder methods return a new value"]
    pub fn stderr<W: Write + Send + 'static>(mut self, writer: W) -> Self {
        self.stderr = Some(Destination::writer(writer));
        self
    }

    /// Override terminal detection
    #[must_use = "builder methods return a new value"]
    pub fn terminal(mut self, terminal: TerminalState) -> Self {
        self.terminal = Some(terminal);
        self
    }

    /// Fixed terminal width instead of querying the terminal
    #[must_use = "builder methods return a new value"]
    pub fn width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    /// Replace `std::process::exit` as the final step of a shutdown
    #[must_use = "builder methods return a new value"]
    pub fn terminator<F>(mut self, terminator: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.terminator = Some(Arc::new(terminator));
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.config.handle_signals = enabled;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn fatal_on_file_error(mut self, enabled: bool) -> Self {
        self.config.fatal_on_file_error = enabled;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn fatal_on_export_error(mut self, enabled: bool) -> Self {
        self.config.fatal_on_export_error = enabled;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn animations(mut self, enabled: bool) -> Self {
        self.config.animations = enabled;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn colors(mut self, enabled: bool) -> Self {
        self.config.colors = enabled;
        self
    }

    /// Replace every configurable setting at once
    #[must_use = "builder methods return a new value"]
    pub fn config(mut self, config: OutputConfig) -> Self {
        self.config = config;
        self
    }

    fn assemble(self) -> (Coordinator, OutputConfig) {
        let mut streams = Streams::process();
        if let Some(Destination::Writer(writer)) = self.stdout {
            streams.stdout = writer;
        }
        if let Some(Destination::Writer(writer)) = self.stderr {
            streams.stderr = writer;
        }
        let terminal = self.terminal.unwrap_or_else(TerminalState::detect);
        let metrics = Arc::new(OutputMetrics::new());
        let terminator: Terminator = match self.terminator {
            Some(terminator) => terminator,
            None => Arc::new(exit_process),
        };

        let inner = Arc::new_cyclic(|me| Inner {
            me: me.clone(),
            registry: SeverityRegistry::new(streams, terminal, self.width, Arc::clone(&metrics)),
            transfers: TransferRegistry::new(),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            loading: LoadingIndicator::default(),
            metrics,
            fatal_on_file_error: AtomicBool::new(true),
            fatal_on_export_error: AtomicBool::new(true),
            animations: AtomicBool::new(true),
            terminator,
            signals: Mutex::new(None),
        });

        (Coordinator { inner }, self.config)
    }

    /// Build the coordinator, failing on invalid configuration or when
    /// signals cannot be subscribed to
    pub fn try_build(self) -> Result<Coordinator> {
        let (coordinator, config) = self.assemble();
        coordinator.apply_config(&config)?;
        Ok(coordinator)
    }

    /// Build the coordinator; configuration problems are reported on
    /// stderr and the affected setting keeps its default.
    pub fn build(self) -> Coordinator {
        let (coordinator, config) = self.assemble();
        if let Err(e) = coordinator.apply_config(&config) {
            eprintln!("[OUTPUT ERROR] {}", e);
        }
        coordinator
    }
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shutdown::signal;
    use crate::sinks::MemoryWriter;
    use std::io;
    use std::sync::atomic::AtomicI32;
    use std::time::Duration;

    struct Harness {
        output: Coordinator,
        stdout: MemoryWriter,
        stderr: MemoryWriter,
        exit_code: Arc<AtomicI32>,
        exits: Arc<Mutex<usize>>,
    }

    fn harness() -> Harness {
        let stdout = MemoryWriter::new();
        let stderr = MemoryWriter::new();
        let exit_code = Arc::new(AtomicI32::new(-1));
        let exits = Arc::new(Mutex::new(0));
        let (code, count) = (Arc::clone(&exit_code), Arc::clone(&exits));
        let output = Coordinator::builder()
            .stdout(stdout.clone())
            .stderr(stderr.clone())
            .terminal(TerminalState::piped())
            .width(79)
            .terminator(move |c| {
                code.store(c, Ordering::SeqCst);
                *count.lock() += 1;
            })
            .build();
        Harness {
            output,
            stdout,
            stderr,
            exit_code,
            exits,
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "no space left"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_leveled_helpers() {
        let h = harness();
        h.output.info("a");
        h.output.error("b");
        h.output.notice("c");
        h.output.debug("hidden");
        h.output.aux3("d");
        h.output.stderr("e");
        assert_eq!(h.stdout.contents(), "a\n[ERROR] b\n[NOTICE] c\nd\n");
        assert_eq!(h.stderr.contents(), "e\n");
    }

    #[test]
    fn test_fatal_logs_and_terminates_once() {
        let h = harness();
        h.output.trigger_fatal("database unreachable").unwrap();

        assert_eq!(h.exit_code.load(Ordering::SeqCst), 1);
        assert_eq!(h.output.state(), ShutdownState::FatalTriggered);
        assert!(h.stdout.contents().contains("[FATAL] database unreachable\n"));

        assert!(matches!(
            h.output.trigger_fatal("again"),
            Err(OutputError::ShuttingDown)
        ));
        assert!(matches!(h.output.request_exit(0), Err(OutputError::ShuttingDown)));
        assert_eq!(*h.exits.lock(), 1);
    }

    #[test]
    fn test_logs_suppressed_after_fatal() {
        let h = harness();
        h.output.trigger_fatal("stop").unwrap();
        h.output.info("too late");
        assert_eq!(h.stdout.contents(), "[FATAL] stop\n");
        assert_eq!(h.output.shutdown_requested_code(), Some(1));
    }

    #[test]
    fn test_logs_kept_during_exit() {
        let h = harness();
        let output = h.output.clone();
        h.output.on_shutdown(move || output.info("closing"));
        h.output.request_exit(3).unwrap();
        h.output.info("after");
        assert_eq!(h.stdout.contents(), "closing\nafter\n");
        assert_eq!(h.output.shutdown_requested_code(), Some(3));
    }

    #[test]
    fn test_raw_flash_bytes_follow_flash_rules() {
        let stderr = MemoryWriter::new();
        let output = Coordinator::builder()
            .stdout(MemoryWriter::new())
            .stderr(stderr.clone())
            .terminal(TerminalState::interactive())
            .width(60)
            .animations(false)
            .terminator(|_| {})
            .build();

        output.log_bytes(Channel::Flash, b"hidden frame");
        assert!(stderr.is_empty());
        assert_eq!(output.metrics().flash_written(), 0);

        output.set_animations(true);
        output.log_bytes(Channel::Flash, b"frame");
        assert_eq!(stderr.contents(), "frame");

        output.request_exit(0).unwrap();
        let before = stderr.contents();
        output.log_bytes(Channel::Flash, b"after shutdown");
        assert_eq!(stderr.contents(), before);
        assert_eq!(output.metrics().flash_written(), 1);
    }

    #[test]
    fn test_cleanup_errors_logged_and_drain_continues() {
        let h = harness();
        let ran = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&ran);
        h.output.on_shutdown(move || first.lock().push("first"));
        h.output.register_cleanup(|| Err("flush failed".into()));
        h.output.register_cleanup(|| panic!("boom"));

        h.output.request_exit(0).unwrap();

        assert_eq!(*ran.lock(), vec!["first"]);
        let out = h.stdout.contents();
        assert!(out.contains("[ERROR] flush failed\n"), "{}", out);
        assert!(out.contains("[ERROR] Cleanup panicked: boom\n"), "{}", out);
        assert_eq!(h.output.metrics().cleanup_errors(), 2);
    }

    #[test]
    fn test_signal_veto_and_exit_codes() {
        let h = harness();
        let vetoes = Arc::new(AtomicI32::new(0));
        let counter = Arc::clone(&vetoes);
        h.output.signal_callback(signal::SIGINT, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        });

        assert!(!h.output.raise(signal::SIGINT));
        assert_eq!(vetoes.load(Ordering::SeqCst), 1);
        assert!(!h.output.is_shutting_down());

        assert!(h.output.raise(signal::SIGTERM));
        assert_eq!(h.exit_code.load(Ordering::SeqCst), 143);
    }

    #[test]
    fn test_file_error_escalates_to_fatal() {
        let h = harness();
        h.output.set_file(Severity::Info, Destination::writer(FailingWriter));
        h.output.info("write me");

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while *h.exits.lock() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(*h.exits.lock(), 1);
        assert_eq!(h.output.state(), ShutdownState::FatalTriggered);
        assert!(h.stdout.contents().contains("[FATAL] File write failed"));
    }

    #[test]
    fn test_file_error_ignored_when_policy_off() {
        let h = harness();
        h.output.set_fatal_on_file_error(false);
        h.output.set_file(Severity::Info, Destination::writer(FailingWriter));
        h.output.info("write me");
        thread::sleep(Duration::from_millis(50));
        assert_eq!(h.output.state(), ShutdownState::Running);
        assert_eq!(h.output.metrics().file_errors(), 1);
    }

    #[test]
    fn test_try_run_exit_code_and_panic() {
        let h = harness();
        h.output.try_run(|| 4).unwrap();
        assert_eq!(h.exit_code.load(Ordering::SeqCst), 4);

        let h = harness();
        h.output.try_run(|| panic!("worker crashed")).unwrap();
        assert_eq!(h.exit_code.load(Ordering::SeqCst), 1);
        assert!(h.stdout.contents().contains("[FATAL] panic: worker crashed"));
    }

    #[test]
    fn test_invalid_timezone_keeps_previous() {
        let h = harness();
        h.output.set_timezone("utc").unwrap();
        assert!(h.output.set_timezone("Moon/Base").is_err());
        assert_eq!(h.output.timezone(), Timezone::Utc);
    }

    #[test]
    fn test_stringer() {
        assert_eq!(stringer(&[]), "");
        assert_eq!(stringer(&[&1.5, &"x"]), "1.5, x");
    }
}
