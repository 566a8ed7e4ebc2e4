//! Graceful shutdown example
//!
//! Registers cleanups, holds a blocking section and lets the first Ctrl-C
//! through only after a confirmation prompt. Finishes on its own after a
//! few seconds if no signal arrives.
//!
//! Run with: cargo run --example graceful_shutdown

use rust_output_system::core::shutdown::signal;
use rust_output_system::{global, info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
    let output = global();

    output.run(|| {
        let db = Arc::new(AtomicUsize::new(0));

        output.on_shutdown(|| global().info("Released lock file"));
        let writes = Arc::clone(&db);
        output.register_cleanup(move || {
            global().info(format!("Flushed {} pending writes", writes.load(Ordering::SeqCst)));
            Ok(())
        });
        output.on_shutdown(|| global().info("Closed database"));

        let presses = AtomicUsize::new(0);
        output.signal_callback(signal::SIGINT, move || {
            if presses.fetch_add(1, Ordering::SeqCst) == 0 {
                global().warn("Press Ctrl-C again to quit");
                false
            } else {
                true
            }
        });

        for batch in 0..5 {
            // Shutdown waits for the batch to finish
            let _guard = output.shutdown_guard();
            info!(output, "Writing batch {}", batch);
            thread::sleep(Duration::from_millis(600));
            db.fetch_add(10, Ordering::SeqCst);
        }

        warn!(output, "No signal received, exiting normally");
        0
    })
}
