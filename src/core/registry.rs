//! Severity registry: per-channel routing and dispatch
//!
//! Holds one [`WriterConfig`] per [`Channel`] in a fixed lookup table,
//! together with the export mask, the timestamp zone, the optional export
//! sink and the [`LineRenderer`]. All of it sits behind a single lock so a
//! dispatch observes one consistent configuration and never interleaves with
//! a status-line frame.

use super::destination::{Destination, Streams};
use super::error::OutputError;
use super::export::ExportSink;
use super::metrics::OutputMetrics;
use super::renderer::{LineRenderer, TerminalState};
use super::severity::{Channel, Severity, CHANNEL_COUNT};
use super::timestamp::Timezone;
use colored::Colorize;
use enumflags2::BitFlags;
use parking_lot::Mutex;
use std::sync::Arc;

/// Routing for one channel
#[derive(Debug, Clone, Default)]
pub struct WriterConfig {
    pub prefix: String,
    /// Display destination
    pub text: Destination,
    /// Persistent copy; always timestamped
    pub file: Destination,
    pub show_timestamp: bool,
}

impl WriterConfig {
    fn for_severity(severity: Severity) -> Self {
        let text = match severity {
            Severity::Debug | Severity::Trace => Destination::Discard,
            _ => Destination::Stdout,
        };
        Self {
            prefix: severity.default_prefix().to_string(),
            text,
            file: Destination::Discard,
            show_timestamp: false,
        }
    }

    fn plain(text: Destination) -> Self {
        Self {
            text,
            ..Self::default()
        }
    }
}

/// Failures observed while dispatching one message
///
/// The registry only reports them; escalation to a fatal shutdown is the
/// coordinator's decision.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub file_error: Option<OutputError>,
    pub export_error: Option<OutputError>,
}

impl DispatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.file_error.is_none() && self.export_error.is_none()
    }
}

struct RegistryState {
    table: Vec<WriterConfig>,
    export_mask: BitFlags<Severity>,
    timezone: Timezone,
    sink: Option<Arc<dyn ExportSink>>,
    renderer: LineRenderer,
    colors: bool,
}

pub struct SeverityRegistry {
    state: Mutex<RegistryState>,
    streams: Streams,
    metrics: Arc<OutputMetrics>,
}

impl SeverityRegistry {
    pub fn new(
        streams: Streams,
        terminal: TerminalState,
        width: Option<usize>,
        metrics: Arc<OutputMetrics>,
    ) -> Self {
        let mut table = vec![WriterConfig::default(); CHANNEL_COUNT];
        for severity in Severity::all().iter() {
            table[severity.index()] = WriterConfig::for_severity(severity);
        }
        table[Channel::Print.index()] = WriterConfig::plain(Destination::Stdout);
        table[Channel::Stderr.index()] = WriterConfig::plain(Destination::Stderr);
        table[Channel::Flash.index()] = WriterConfig::plain(Destination::Stderr);

        Self {
            state: Mutex::new(RegistryState {
                table,
                export_mask: Severity::standard(),
                timezone: Timezone::Local,
                sink: None,
                renderer: LineRenderer::new(terminal, width),
                colors: false,
            }),
            streams,
            metrics,
        }
    }

    fn update(&self, levels: BitFlags<Severity>, mut apply: impl FnMut(&mut WriterConfig)) {
        let mut state = self.state.lock();
        for severity in levels.iter() {
            apply(&mut state.table[severity.index()]);
        }
    }

    /// Route the display text of `levels` to `destination`
    pub fn set_output(&self, levels: impl Into<BitFlags<Severity>>, destination: Destination) {
        self.update(levels.into(), |config| config.text = destination.clone());
    }

    /// Route the persistent copy of `levels` to `destination`
    pub fn set_file(&self, levels: impl Into<BitFlags<Severity>>, destination: Destination) {
        self.update(levels.into(), |config| config.file = destination.clone());
    }

    pub fn set_prefix(&self, levels: impl Into<BitFlags<Severity>>, prefix: &str) {
        self.update(levels.into(), |config| config.prefix = prefix.to_string());
    }

    pub fn show_timestamps(&self, levels: impl Into<BitFlags<Severity>>) {
        self.update(levels.into(), |config| config.show_timestamp = true);
    }

    pub fn hide_timestamps(&self, levels: impl Into<BitFlags<Severity>>) {
        self.update(levels.into(), |config| config.show_timestamp = false);
    }

    /// Replace the whole routing of `levels`
    pub fn configure(&self, levels: impl Into<BitFlags<Severity>>, config: WriterConfig) {
        self.update(levels.into(), |entry| *entry = config.clone());
    }

    pub fn writer_config(&self, severity: Severity) -> WriterConfig {
        self.state.lock().table[severity.index()].clone()
    }

    pub fn enable_export(&self, levels: impl Into<BitFlags<Severity>>) {
        let mut state = self.state.lock();
        state.export_mask |= levels.into();
    }

    pub fn disable_export(&self, levels: impl Into<BitFlags<Severity>>) {
        let mut state = self.state.lock();
        state.export_mask &= !levels.into();
    }

    pub fn export_mask(&self) -> BitFlags<Severity> {
        self.state.lock().export_mask
    }

    pub fn hook_export(&self, sink: Arc<dyn ExportSink>) {
        self.state.lock().sink = Some(sink);
    }

    pub fn unhook_export(&self) {
        self.state.lock().sink = None;
    }

    pub fn set_timezone(&self, timezone: Timezone) {
        self.state.lock().timezone = timezone;
    }

    pub fn timezone(&self) -> Timezone {
        self.state.lock().timezone
    }

    pub fn set_colors(&self, enabled: bool) {
        self.state.lock().colors = enabled;
    }

    pub fn terminal(&self) -> TerminalState {
        self.state.lock().renderer.terminal()
    }

    pub fn width(&self) -> usize {
        self.state.lock().renderer.width()
    }

    pub fn flash_pending(&self) -> bool {
        self.state.lock().renderer.erase_pending()
    }

    /// Format `message` for `channel` and write it to every configured
    /// destination.
    ///
    /// Flash frames go through [`flash`](Self::flash) and never wait on
    /// the lock.
    pub fn dispatch(&self, channel: Channel, message: &[u8]) -> DispatchOutcome {
        if channel == Channel::Flash {
            self.flash(&String::from_utf8_lossy(message));
            return DispatchOutcome::default();
        }
        let mut state = self.state.lock();
        self.dispatch_locked(&mut state, channel, message)
    }

    fn dispatch_locked(
        &self,
        state: &mut RegistryState,
        channel: Channel,
        message: &[u8],
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let RegistryState {
            table,
            export_mask,
            timezone,
            sink,
            renderer,
            colors,
        } = state;
        let config = &table[channel.index()];
        let no_log = channel.is_no_log();

        let stamp = if !no_log && (config.show_timestamp || !config.file.is_discard()) {
            timezone.now()
        } else {
            String::new()
        };

        let mut line = Vec::with_capacity(stamp.len() + config.prefix.len() + message.len() + 1);
        if !no_log {
            if config.show_timestamp {
                line.extend_from_slice(stamp.as_bytes());
            }
            line.extend_from_slice(config.prefix.as_bytes());
        }
        line.extend_from_slice(message);
        if !line.ends_with(b"\n") {
            line.push(b'\n');
        }

        if let Some(erase) = renderer.take_erase(&config.text) {
            self.streams.write_stderr_lossy(&erase);
        }

        let colored_line = match channel.severity() {
            Some(severity)
                if *colors && !config.prefix.is_empty() && renderer.is_attached(&config.text) =>
            {
                Some(self.colorize(&line, &config.prefix, config.show_timestamp, &stamp, severity))
            }
            _ => None,
        };
        let display = colored_line.as_deref().unwrap_or(&line);

        if !config.text.is_discard() && self.streams.write(&config.text, display).is_ok() {
            self.metrics.record_line();
        }

        let severity = match channel.severity() {
            Some(severity) => severity,
            None => return outcome,
        };

        if !config.file.is_discard() {
            let result = if config.show_timestamp {
                self.streams.write(&config.file, &line)
            } else {
                let mut stamped = Vec::with_capacity(stamp.len() + line.len());
                stamped.extend_from_slice(stamp.as_bytes());
                stamped.extend_from_slice(&line);
                self.streams.write(&config.file, &stamped)
            };
            if let Err(e) = result {
                self.metrics.record_file_error();
                outcome.file_error = Some(OutputError::file_write(
                    format!("{} file", severity),
                    e.to_string(),
                ));
            }
        }

        if let Some(sink) = sink.as_ref() {
            if export_mask.contains(severity) {
                let text = String::from_utf8_lossy(message);
                if let Err(e) = sink.export(severity.export_class(), &text) {
                    self.metrics.record_export_error();
                    outcome.export_error = Some(e);
                }
            }
        }

        outcome
    }

    fn colorize(
        &self,
        line: &[u8],
        prefix: &str,
        stamped: bool,
        stamp: &str,
        severity: Severity,
    ) -> Vec<u8> {
        let skip = if stamped { stamp.len() } else { 0 } + prefix.len();
        let mut out = Vec::with_capacity(line.len() + 16);
        if stamped {
            out.extend_from_slice(stamp.as_bytes());
        }
        out.extend_from_slice(
            prefix
                .color(severity.color_code())
                .to_string()
                .as_bytes(),
        );
        out.extend_from_slice(&line[skip..]);
        out
    }

    /// Show `line` on the status line. Never waits: when the registry is
    /// busy the frame is dropped.
    pub fn flash(&self, line: &str) -> bool {
        match self.state.try_lock() {
            Some(mut state) => self.flash_locked(&mut state, line.as_bytes()),
            None => {
                self.metrics.record_flash_dropped();
                false
            }
        }
    }

    fn flash_locked(&self, state: &mut RegistryState, line: &[u8]) -> bool {
        if let Some(erase) = state.renderer.take_erase(&Destination::Stderr) {
            self.streams.write_stderr_lossy(&erase);
        }
        let text = String::from_utf8_lossy(line);
        match state.renderer.compose_flash(&text) {
            Some(bytes) => {
                self.streams.write_stderr_lossy(&bytes);
                self.metrics.record_flash();
                true
            }
            None => false,
        }
    }

    /// Erase the status line, waiting for the lock
    pub fn clear_flash(&self) {
        let mut state = self.state.lock();
        if state.renderer.erase_pending() {
            let erase = state.renderer.erase_sequence();
            self.streams.write_stderr_lossy(&erase);
        }
    }
}
