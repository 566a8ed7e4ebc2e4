//! Integration tests for the output system
//!
//! These tests verify:
//! - Severity routing to display, file and export destinations
//! - Rotated log files opened through the coordinator
//! - Cleanup ordering and error reporting during shutdown
//! - Fatal, exit and signal triggers
//! - Transfer summaries

use parking_lot::Mutex;
use rust_output_system::core::shutdown::signal;
use rust_output_system::prelude::*;
use rust_output_system::sinks::MemoryWriter;
use std::fs;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct Captured {
    output: Coordinator,
    stdout: MemoryWriter,
    stderr: MemoryWriter,
    exit_code: Arc<AtomicI32>,
    exits: Arc<AtomicUsize>,
}

fn captured() -> Captured {
    let stdout = MemoryWriter::new();
    let stderr = MemoryWriter::new();
    let exit_code = Arc::new(AtomicI32::new(-1));
    let exits = Arc::new(AtomicUsize::new(0));
    let (code, count) = (Arc::clone(&exit_code), Arc::clone(&exits));

    let output = Coordinator::builder()
        .stdout(stdout.clone())
        .stderr(stderr.clone())
        .terminal(TerminalState::piped())
        .width(79)
        .terminator(move |c| {
            code.store(c, Ordering::SeqCst);
            count.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    Captured {
        output,
        stdout,
        stderr,
        exit_code,
        exits,
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Export sink recording every call
#[derive(Default)]
struct RecordingSink {
    calls: Mutex<Vec<(ExportClass, String)>>,
    fail: bool,
}

impl ExportSink for RecordingSink {
    fn info(&self, msg: &str) -> Result<()> {
        self.record(ExportClass::Info, msg)
    }
    fn notice(&self, msg: &str) -> Result<()> {
        self.record(ExportClass::Notice, msg)
    }
    fn warning(&self, msg: &str) -> Result<()> {
        self.record(ExportClass::Warning, msg)
    }
    fn error(&self, msg: &str) -> Result<()> {
        self.record(ExportClass::Error, msg)
    }
    fn emergency(&self, msg: &str) -> Result<()> {
        self.record(ExportClass::Emergency, msg)
    }
    fn debug(&self, msg: &str) -> Result<()> {
        self.record(ExportClass::Debug, msg)
    }
}

impl RecordingSink {
    fn record(&self, class: ExportClass, msg: &str) -> Result<()> {
        self.calls.lock().push((class, msg.to_string()));
        if self.fail {
            Err(OutputError::export(class.to_str(), "collector rejected message"))
        } else {
            Ok(())
        }
    }
}

#[test]
fn test_default_routing() {
    let c = captured();
    c.output.info("hello");
    c.output.warn("careful");
    c.output.debug("invisible");
    c.output.stderr("to stderr");
    c.output.stdout("plain");

    assert_eq!(c.stdout.contents(), "hello\n[WARN] careful\nplain\n");
    assert_eq!(c.stderr.contents(), "to stderr\n");
}

#[test]
fn test_comma_joined_message() {
    let c = captured();
    c.output.info(stringer(&[&"copied", &42, &"files"]));
    assert_eq!(c.stdout.contents(), "copied, 42, files\n");
}

#[test]
fn test_raw_bytes_pass_through() {
    let c = captured();
    c.output.log_bytes(Channel::Print, b"raw line\n");
    c.output.log_bytes(Severity::Error.into(), b"no newline");
    assert_eq!(c.stdout.contents(), "raw line\n[ERROR] no newline\n");
}

#[test]
fn test_file_copy_is_timestamped() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("app.log");

    let c = captured();
    let file = c.output.log_file(&path, 1, 2).expect("Failed to open log file");
    c.output.set_file(Severity::Info | Severity::Error, file);
    c.output.info("first");
    c.output.error("second");
    c.output.notice("not in file");

    let content = fs::read_to_string(&path).expect("Failed to read log file");
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with('['));
    assert!(lines[0].ends_with("] first"), "{}", lines[0]);
    assert!(lines[1].ends_with("] [ERROR] second"), "{}", lines[1]);

    // Display copy stays unstamped
    assert!(c.stdout.contents().starts_with("first\n"));
}

#[test]
fn test_utc_timestamps_on_display() {
    let c = captured();
    c.output.set_timezone("UTC").unwrap();
    c.output.show_timestamps(Severity::Notice);
    c.output.notice("stamped");

    let out = c.stdout.contents();
    assert!(out.starts_with('['));
    assert!(out.contains(" UTC] [NOTICE] stamped\n"), "{}", out);
}

#[test]
fn test_export_receives_raw_message() {
    let c = captured();
    let sink = Arc::new(RecordingSink::default());
    c.output.hook_export(sink.clone());
    c.output.set_prefix(Severity::Info, "[app] ");

    c.output.info("started");
    c.output.warn("slow disk");
    c.output.aux("side channel");
    c.output.debug("not exported by default");

    let calls = sink.calls.lock().clone();
    assert_eq!(
        calls,
        vec![
            (ExportClass::Info, "started".to_string()),
            (ExportClass::Warning, "slow disk".to_string()),
        ]
    );

    c.output.enable_export(Severity::Aux);
    c.output.aux("now exported");
    assert_eq!(sink.calls.lock().len(), 3);
}

#[test]
fn test_export_failure_escalates() {
    let c = captured();
    c.output.hook_export(Arc::new(RecordingSink {
        fail: true,
        ..RecordingSink::default()
    }));
    c.output.error("cannot reach backend");

    assert!(wait_for(|| c.exits.load(Ordering::SeqCst) == 1));
    assert_eq!(c.exit_code.load(Ordering::SeqCst), 1);
    assert_eq!(c.output.state(), ShutdownState::FatalTriggered);
    assert!(c.stdout.contents().contains("[FATAL] Export to error failed"));
}

#[test]
fn test_export_failure_tolerated_when_disabled() {
    let c = captured();
    c.output.set_fatal_on_export_error(false);
    c.output.hook_export(Arc::new(RecordingSink {
        fail: true,
        ..RecordingSink::default()
    }));
    c.output.error("cannot reach backend");

    thread::sleep(Duration::from_millis(50));
    assert_eq!(c.output.state(), ShutdownState::Running);
    assert_eq!(c.output.metrics().export_errors(), 1);
}

#[test]
fn test_cleanups_run_in_reverse_order() {
    let c = captured();
    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["close-db", "flush-log", "release-lock"] {
        let order = Arc::clone(&order);
        c.output.on_shutdown(move || order.lock().push(name));
    }

    c.output.request_exit(0).unwrap();
    assert_eq!(*order.lock(), vec!["release-lock", "flush-log", "close-db"]);
    assert_eq!(c.exit_code.load(Ordering::SeqCst), 0);
}

#[test]
fn test_cancelled_and_early_cleanups_skip_drain() {
    let c = captured();
    let runs = Arc::new(AtomicUsize::new(0));

    let early = {
        let runs = Arc::clone(&runs);
        c.output.on_shutdown(move || {
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };
    let cancelled = {
        let runs = Arc::clone(&runs);
        c.output.on_shutdown(move || {
            runs.fetch_add(100, Ordering::SeqCst);
        })
    };

    early.run().unwrap();
    assert!(cancelled.cancel());
    c.output.request_exit(0).unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_fatal_runs_cleanups_and_exits_once() {
    let c = captured();
    let flushed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&flushed);
    c.output.register_cleanup(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    c.output.trigger_fatal("config missing").unwrap();
    assert!(matches!(
        c.output.trigger_fatal("second"),
        Err(OutputError::ShuttingDown)
    ));

    assert_eq!(flushed.load(Ordering::SeqCst), 1);
    assert_eq!(c.exits.load(Ordering::SeqCst), 1);
    assert_eq!(c.exit_code.load(Ordering::SeqCst), 1);
    assert_eq!(c.stdout.contents().matches("[FATAL]").count(), 1);
}

#[test]
fn test_cleanup_failure_is_logged() {
    let c = captured();
    c.output.register_cleanup(|| Err("lock file already removed".into()));
    c.output.request_exit(2).unwrap();

    assert!(c
        .stdout
        .contents()
        .contains("[ERROR] lock file already removed\n"));
    assert_eq!(c.exit_code.load(Ordering::SeqCst), 2);
}

#[test]
fn test_blocking_section_delays_termination() {
    let c = captured();
    let guard = c.output.shutdown_guard();

    let output = c.output.clone();
    let trigger = thread::spawn(move || output.request_exit(5));

    thread::sleep(Duration::from_millis(50));
    assert!(c.output.is_shutting_down());
    assert_eq!(c.exits.load(Ordering::SeqCst), 0);

    drop(guard);
    trigger.join().unwrap().unwrap();
    assert_eq!(c.exit_code.load(Ordering::SeqCst), 5);
}

#[test]
fn test_signal_exit_codes() {
    for (sig, code) in [
        (signal::SIGINT, 130),
        (signal::SIGHUP, 129),
        (signal::SIGTERM, 143),
    ] {
        let c = captured();
        assert!(c.output.raise(sig));
        assert_eq!(c.exit_code.load(Ordering::SeqCst), code);
        assert_eq!(c.output.shutdown_requested_code(), Some(code));
    }
}

#[test]
fn test_signal_callback_veto_then_accept() {
    let c = captured();
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);
    c.output.signal_callback(signal::SIGINT, move || {
        seen.fetch_add(1, Ordering::SeqCst) >= 1
    });

    assert!(!c.output.raise(signal::SIGINT));
    assert_eq!(c.output.state(), ShutdownState::Running);

    assert!(c.output.raise(signal::SIGINT));
    assert_eq!(c.exit_code.load(Ordering::SeqCst), 130);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_try_run_panic_logs_backtrace() {
    let c = captured();
    c.output
        .try_run(|| panic!("index out of range"))
        .unwrap();

    let out = c.stdout.contents();
    assert!(out.contains("[FATAL] panic: index out of range"), "{}", out);
    assert_eq!(c.exit_code.load(Ordering::SeqCst), 1);
}

#[test]
fn test_try_run_returns_code() {
    let c = captured();
    c.output.try_run(|| 7).unwrap();
    assert_eq!(c.output.state(), ShutdownState::ExitRequested);
    assert_eq!(c.exit_code.load(Ordering::SeqCst), 7);
}

#[test]
fn test_transfer_summary_after_quarter_reads() {
    let c = captured();
    let data = vec![7u8; 1000];
    let mut stream = c.output.transfer(
        "archive.tar",
        1000,
        TransferFlag::NoRate,
        Cursor::new(data),
    );

    let mut buf = [0u8; 250];
    let mut percents = Vec::new();
    for _ in 0..4 {
        assert_eq!(stream.read(&mut buf).unwrap(), 250);
        percents.push(stream.percent());
    }
    assert_eq!(percents, vec![25, 50, 75, 100]);
    assert_eq!(stream.read(&mut buf).unwrap(), 0);
    drop(stream);

    let out = c.stdout.contents();
    assert_eq!(out.lines().count(), 1, "{}", out);
    assert!(out.starts_with("archive.tar:"), "{}", out);
    assert!(out.trim_end().ends_with("100%"), "{}", out);
    assert!(wait_for(|| !c.output.transfers_active()));
}

#[test]
fn test_transfer_summary_prefix() {
    let c = captured();
    let mut stream = c.output.transfer_with_prefix(
        "db.dump",
        4,
        TransferFlag::NoRate,
        Cursor::new(vec![0u8; 4]),
        "Downloaded ",
    );
    let mut sink = Vec::new();
    stream.read_to_end(&mut sink).unwrap();
    stream.close();

    assert!(c.stdout.contents().starts_with("Downloaded db.dump:"));
}

#[test]
fn test_empty_source_is_errored_without_summary() {
    let c = captured();
    let mut stream = c
        .output
        .transfer("missing.bin", 10, TransferFlag::NoRate, Cursor::new(Vec::new()));
    let mut buf = [0u8; 8];
    assert_eq!(stream.read(&mut buf).unwrap(), 0);
    assert!(stream.state().is_errored());
    drop(stream);
    assert!(c.stdout.is_empty());
}

#[test]
fn test_zero_size_transfer_is_complete() {
    let c = captured();
    let mut stream = c
        .output
        .transfer("empty", 0, TransferFlag::LeftToRight, Cursor::new(Vec::new()));
    assert!(stream.state().is_complete());
    assert_eq!(stream.percent(), 100);

    let mut buf = [0u8; 8];
    assert_eq!(stream.read(&mut buf).unwrap(), 0);
    assert!(stream.state().is_complete());
    assert!(!stream.state().is_errored());

    stream.close();
    assert!(stream.state().is_complete());
    assert!(c.stdout.contents().starts_with("empty:"), "{}", c.stdout.contents());
    assert!(c.stdout.contents().trim_end().ends_with("100%"));
}

#[test]
fn test_progress_bar_counts_to_completion() {
    let c = captured();
    let mut bar = c.output.progress_bar("indexing", 200);
    bar.add(50);
    assert_eq!(bar.percent(), 25);
    bar.set(200);
    assert_eq!(bar.percent(), 100);
    bar.done();
    assert!(bar.is_done());
    assert!(wait_for(|| !c.output.transfers_active()));
}

#[test]
fn test_fatal_message_is_last_line() {
    let c = captured();
    let output = c.output.clone();
    c.output.on_shutdown(move || output.info("from cleanup"));
    c.output.trigger_fatal("disk full").unwrap();
    c.output.info("after fatal");
    assert_eq!(c.stdout.contents(), "[FATAL] disk full\n");
}

#[test]
fn test_cleanup_lines_logged_on_exit() {
    let c = captured();
    let output = c.output.clone();
    c.output.on_shutdown(move || output.info("flushed 3 writes"));
    c.output.request_exit(0).unwrap();
    assert_eq!(c.stdout.contents(), "flushed 3 writes\n");
}

#[test]
fn test_apply_config_from_json() {
    let c = captured();
    let config = OutputConfig::from_json(
        r#"{
            "timezone": "UTC",
            "timestamps": ["Warn"],
            "prefixes": { "Info": "[sync] " },
            "handle_signals": false
        }"#,
    )
    .unwrap();
    c.output.apply_config(&config).unwrap();

    c.output.info("pulled");
    c.output.warn("late");
    let out = c.stdout.contents();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "[sync] pulled");
    assert!(lines[1].ends_with(" UTC] [WARN] late"), "{}", lines[1]);
    assert_eq!(c.output.timezone(), Timezone::Utc);
}

#[test]
fn test_disabled_animations_skip_flash() {
    let c = captured();
    c.output.set_animations(false);
    c.output.flash("working...");
    assert!(c.stderr.is_empty());
    assert_eq!(c.output.metrics().flash_written(), 0);
}
