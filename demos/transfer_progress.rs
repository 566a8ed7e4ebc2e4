//! Transfer progress example
//!
//! Copies a generated buffer through a tracked reader, drives a manual
//! progress bar and shows the loading indicator.
//!
//! Run with: cargo run --example transfer_progress

use rust_output_system::prelude::*;
use rust_output_system::{info, notice};
use std::io::{self, Read};
use std::thread;
use std::time::Duration;

/// Reader that trickles out its data to make the animation visible
struct SlowSource {
    remaining: usize,
}

impl Read for SlowSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        thread::sleep(Duration::from_millis(20));
        let n = buf.len().min(self.remaining).min(16 * 1024);
        buf[..n].fill(0xAB);
        self.remaining -= n;
        Ok(n)
    }
}

fn main() -> Result<()> {
    let output = Coordinator::builder().colors(true).build();
    output.set_prefix(Severity::Aux, "[copy] ");

    notice!(output, "Terminal: {:?}", output.terminal());

    // 1. Tracked reader with a summary line
    let total = 2 * 1024 * 1024;
    let mut stream = output.transfer_with_prefix(
        "dataset-2024.tar",
        total as i64,
        TransferFlag::LeftToRight,
        SlowSource { remaining: total },
        "Downloaded ",
    );
    let copied = io::copy(&mut stream, &mut io::sink())?;
    stream.close();
    output.aux(format!("{} bytes copied", copied));

    // 2. Manual progress bar
    let mut bar = output.progress_bar("indexing", 50);
    for _ in 0..50 {
        thread::sleep(Duration::from_millis(15));
        bar.add(1);
    }
    bar.done();
    info!(output, "Indexed {} entries", 50);

    // 3. Loading indicator
    output.set_loading_style(LoadingStyle::new("Verifying checksums", &["◐", "◓", "◑", "◒"]));
    output.show_loading();
    thread::sleep(Duration::from_millis(800));
    output.hide_loading();

    output.info(stringer(&[&"done", &copied, &"bytes"]));
    output.close();
    Ok(())
}
