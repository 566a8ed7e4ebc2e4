//! Transfer progress streams
//!
//! A [`TransferStream`] wraps any reader and counts the bytes that pass
//! through it. The shared [`TransferState`] is read concurrently by the
//! rendering thread, so every counter is atomic and the rendering side never
//! needs a lock.

use super::severity::Severity;
use super::transfer_registry::StatusOutput;
use enumflags2::{bitflags, BitFlags};
use once_cell::sync::OnceCell;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Display options for one transfer
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferFlag {
    /// Fill the bar from the left (default)
    LeftToRight = 1 << 0,
    RightToLeft = 1 << 1,
    /// Hide the rate and sizes
    NoRate = 1 << 2,
    /// Use the full terminal width instead of capping the bar
    MaxWidth = 1 << 3,
    /// Keep the bar in the completion summary
    ProgressBarSummary = 1 << 4,
    /// Log nothing when the transfer closes
    NoSummary = 1 << 5,
}

/// Size of an unknown-length transfer
pub const UNKNOWN_SIZE: i64 = -1;

const MIN_ELAPSED: Duration = Duration::from_millis(100);
const MAX_BAR: i64 = 100;
const NAME_WIDTH: usize = 25;
const NAME_WIDTH_NO_RATE: usize = 40;

const ACTIVE: u8 = 1 << 0;
const CLOSED: u8 = 1 << 1;
const COMPLETE: u8 = 1 << 2;
const ERRORED: u8 = 1 << 3;

/// Render a bit rate with base-1000 units
///
/// ```
/// use rust_output_system::core::transfer::format_rate;
///
/// assert_eq!(format_rate(0.0), "0.0bps");
/// assert_eq!(format_rate(1500.0), "1.5kbps");
/// assert_eq!(format_rate(8_000_000.0), "8.0mbps");
/// ```
pub fn format_rate(bits_per_second: f64) -> String {
    const UNITS: [&str; 4] = ["bps", "kbps", "mbps", "gbps"];
    let mut value = if bits_per_second.is_finite() {
        bits_per_second.max(0.0)
    } else {
        0.0
    };
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.1}{}", value, UNITS[unit])
}

/// Render a byte count with base-1024 units
///
/// ```
/// use rust_output_system::core::transfer::human_size;
///
/// assert_eq!(human_size(512), "512B");
/// assert_eq!(human_size(1536), "1.5KB");
/// assert_eq!(human_size(3 * 1024 * 1024), "3.0MB");
/// ```
pub fn human_size(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let bytes = bytes.max(0);
    if bytes < 1024 {
        return format!("{}B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}", value, UNITS[unit])
}

/// Shared progress of one transfer
#[derive(Debug)]
pub struct TransferState {
    name: String,
    short_name: String,
    prefix: String,
    total_size: i64,
    transferred: AtomicI64,
    offset: AtomicI64,
    flags: BitFlags<TransferFlag>,
    status: AtomicU8,
    started: Instant,
    completed_at: OnceCell<Instant>,
}

impl TransferState {
    pub fn new(
        name: &str,
        total_size: i64,
        flags: impl Into<BitFlags<TransferFlag>>,
        prefix: &str,
    ) -> Self {
        Self::build(name, total_size, flags.into(), prefix, false)
    }

    /// Progress-bar style state: no rate, no summary, no name padding
    pub fn internal(name: &str, total_size: i64) -> Self {
        Self::build(name, total_size, BitFlags::empty(), "", true)
    }

    fn build(
        name: &str,
        total_size: i64,
        mut flags: BitFlags<TransferFlag>,
        prefix: &str,
        internal: bool,
    ) -> Self {
        if !flags.contains(TransferFlag::RightToLeft) {
            flags |= TransferFlag::LeftToRight;
        }
        if internal {
            flags |= TransferFlag::NoRate | TransferFlag::NoSummary;
        }

        let target = if flags.contains(TransferFlag::NoRate) {
            NAME_WIDTH_NO_RATE
        } else {
            NAME_WIDTH
        };
        let mut short_name: String = name.chars().take(target).collect();
        if name.chars().count() > target {
            short_name.push_str("..");
        } else if !internal && !flags.contains(TransferFlag::ProgressBarSummary) {
            short_name = format!("{:>width$}", short_name, width = target + 2);
        }

        // Nothing to move: complete from the start
        let started = Instant::now();
        let (status, completed_at) = if total_size == 0 {
            (ACTIVE | COMPLETE, OnceCell::with_value(started))
        } else {
            (ACTIVE, OnceCell::new())
        };

        Self {
            name: name.to_string(),
            short_name,
            prefix: prefix.to_string(),
            total_size,
            transferred: AtomicI64::new(0),
            offset: AtomicI64::new(0),
            flags,
            status: AtomicU8::new(status),
            started,
            completed_at,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name as shown on the status line: truncated, right-aligned
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn total_size(&self) -> i64 {
        self.total_size
    }

    pub fn flags(&self) -> BitFlags<TransferFlag> {
        self.flags
    }

    pub fn transferred(&self) -> i64 {
        self.transferred.load(Ordering::Acquire)
    }

    pub fn offset(&self) -> i64 {
        self.offset.load(Ordering::Acquire)
    }

    fn has(&self, bit: u8) -> bool {
        self.status.load(Ordering::Acquire) & bit != 0
    }

    pub fn is_active(&self) -> bool {
        self.has(ACTIVE)
    }

    pub fn is_closed(&self) -> bool {
        self.has(CLOSED)
    }

    pub fn is_complete(&self) -> bool {
        self.has(COMPLETE)
    }

    pub fn is_errored(&self) -> bool {
        self.has(ERRORED)
    }

    /// Count `bytes` more as transferred
    pub fn record(&self, bytes: usize) {
        let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        let now = self.transferred.fetch_add(bytes, Ordering::AcqRel) + bytes;
        self.check_complete(now);
    }

    /// Move the position to `position` after a seek
    pub fn reposition(&self, position: i64) {
        self.offset.store(position, Ordering::Release);
        self.transferred.store(position, Ordering::Release);
        self.check_complete(position);
    }

    fn check_complete(&self, transferred: i64) {
        if self.total_size >= 0 && transferred == self.total_size {
            let previous = self.status.fetch_or(COMPLETE, Ordering::AcqRel);
            if previous & COMPLETE == 0 {
                let _ = self.completed_at.set(Instant::now());
            }
        }
    }

    /// Returns true for the call that actually closed the transfer
    pub fn mark_closed(&self) -> bool {
        self.status.fetch_or(CLOSED, Ordering::AcqRel) & CLOSED == 0
    }

    pub fn mark_errored(&self) {
        self.status.fetch_or(ERRORED | CLOSED, Ordering::AcqRel);
    }

    fn deactivate(&self) {
        self.status.fetch_and(!ACTIVE, Ordering::AcqRel);
    }

    /// Whole percent done; zero-size transfers are always complete
    pub fn percent(&self) -> u8 {
        match self.total_size {
            0 => 100,
            total if total < 0 => 0,
            total => {
                let done = self.transferred().clamp(0, total) as i128;
                (done * 100 / total as i128) as u8
            }
        }
    }

    /// Time counted towards the rate, stopping at completion
    pub fn elapsed(&self) -> Duration {
        let end = self.completed_at.get().copied().unwrap_or_else(Instant::now);
        end.saturating_duration_since(self.started).max(MIN_ELAPSED)
    }

    /// Bits per second since the last seek
    pub fn rate_bps(&self) -> f64 {
        let moved = (self.transferred() - self.offset()).max(0) as f64;
        moved * 8.0 / self.elapsed().as_secs_f64()
    }

    pub fn rate(&self) -> String {
        format_rate(self.rate_bps())
    }

    /// One status-line frame, without the spinner
    pub fn status_line(&self, width: usize) -> String {
        self.render(&self.short_name, width)
    }

    /// Final line for the log; also clears the active flag
    pub fn summary_line(&self, width: usize) -> String {
        self.deactivate();
        let line = self.render(&self.name, width);
        format!("{}{}", self.prefix, line.trim_start())
    }

    fn render(&self, name: &str, width: usize) -> String {
        if self.total_size < 0 {
            return format!(
                "{}: {} ({})",
                name,
                self.rate(),
                human_size(self.transferred())
            );
        }
        self.progress_bar(name, width)
    }

    fn progress_bar(&self, name: &str, width: usize) -> String {
        let percent = i64::from(self.percent());
        let mut size = width as i64 - 3;
        if !self.flags.contains(TransferFlag::MaxWidth) && size > MAX_BAR {
            size = MAX_BAR;
        }

        let no_rate = self.flags.contains(TransferFlag::NoRate);
        let (first, second) = if no_rate {
            (format!("{}:", name), String::new())
        } else {
            (
                format!("{}: {}", name, self.rate()),
                format!(
                    "({}/{})",
                    human_size(self.transferred()),
                    human_size(self.total_size)
                ),
            )
        };

        size -= (first.chars().count() + second.chars().count()) as i64 + 15;
        let collapsed = self.is_closed()
            && !self.flags.contains(TransferFlag::ProgressBarSummary)
            && !self.flags.contains(TransferFlag::NoSummary);

        let head = if second.is_empty() {
            first
        } else {
            format!("{} {}", first, second)
        };

        if collapsed || size <= 10 {
            return format!("{} {}%", head, percent);
        }
        let bar = self.bar(percent, size as usize);
        format!("{} [{}] {}%", head, bar, percent)
    }

    fn bar(&self, percent: i64, size: usize) -> String {
        let (done, head_right, head_left, blank) = if self.flags.contains(TransferFlag::NoRate) {
            ('#', '#', '#', '.')
        } else {
            ('=', '>', '<', ' ')
        };
        let filled = (percent.clamp(0, 100) as usize) * size / 100;

        if self.flags.contains(TransferFlag::RightToLeft) {
            (0..size)
                .map(|n| {
                    let from_right = size - 1 - n;
                    if from_right + 1 < filled {
                        done
                    } else if from_right < filled {
                        head_left
                    } else {
                        blank
                    }
                })
                .collect()
        } else {
            (0..size)
                .map(|n| {
                    if n + 1 < filled {
                        done
                    } else if n < filled {
                        head_right
                    } else {
                        blank
                    }
                })
                .collect()
        }
    }
}

/// Reader that reports its progress to the transfer registry
///
/// Errors from the wrapped source are returned unchanged; they only mark
/// the transfer as errored and never trigger a shutdown.
pub struct TransferStream<R> {
    source: R,
    state: Arc<TransferState>,
    output: Weak<dyn StatusOutput>,
    finished: bool,
}

impl<R> TransferStream<R> {
    pub(crate) fn new(source: R, state: Arc<TransferState>, output: Weak<dyn StatusOutput>) -> Self {
        Self {
            source,
            state,
            output,
            finished: false,
        }
    }

    pub fn state(&self) -> &Arc<TransferState> {
        &self.state
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    pub fn transferred(&self) -> i64 {
        self.state.transferred()
    }

    pub fn percent(&self) -> u8 {
        self.state.percent()
    }

    /// Close the transfer and log its summary
    ///
    /// The summary is skipped with `NoSummary`, and when nothing was
    /// transferred unless the transfer is zero-sized.
    pub fn close(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.state.mark_closed();

        let state = &self.state;
        let show = (state.transferred() > 0 || state.total_size() == 0)
            && !state.flags().contains(TransferFlag::NoSummary);
        match self.output.upgrade() {
            Some(output) if show => {
                let line = state.summary_line(output.width());
                output.log(Severity::Info, &line);
            }
            _ => state.deactivate(),
        }
    }
}

impl<R: Read> Read for TransferStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.source.read(buf) {
            Ok(0) if !buf.is_empty() => {
                if self.state.transferred() == 0 && self.state.total_size() != 0 {
                    self.state.mark_errored();
                } else {
                    self.state.mark_closed();
                }
                Ok(0)
            }
            Ok(n) => {
                self.state.record(n);
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                self.state.mark_errored();
                Err(e)
            }
        }
    }
}

impl<R: Seek> Seek for TransferStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let position = self.source.seek(pos)?;
        self.state
            .reposition(i64::try_from(position).unwrap_or(i64::MAX));
        Ok(position)
    }
}

impl<R> Drop for TransferStream<R> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reader calling `counter` with the size of every successful read
pub struct CountingReader<R, F> {
    inner: R,
    counter: F,
}

impl<R, F: FnMut(usize)> CountingReader<R, F> {
    pub fn new(inner: R, counter: F) -> Self {
        Self { inner, counter }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read, F: FnMut(usize)> Read for CountingReader<R, F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        (self.counter)(n);
        Ok(n)
    }
}

impl<R: Seek, F> Seek for CountingReader<R, F> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}
