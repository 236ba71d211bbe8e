//! Download progress reporting

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use tracing::{debug, info};

/// Receives byte counts while an archive streams to disk.
///
/// `total` is the advertised content length, or 0 when the server sent none.
pub trait ProgressReporter: Send + Sync {
    fn start(&self, name: &str, total: u64);
    fn advance(&self, bytes: u64);
    fn finish(&self, name: &str);
}

/// Reports through `tracing` only
#[derive(Debug, Default)]
pub struct LogProgress {
    state: Mutex<(u64, u64)>,
}

impl ProgressReporter for LogProgress {
    fn start(&self, name: &str, total: u64) {
        if let Ok(mut state) = self.state.lock() {
            *state = (0, total);
        }
        debug!("Downloading {} ({} bytes advertised)", name, total);
    }

    fn advance(&self, bytes: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.0 += bytes;
        }
    }

    fn finish(&self, name: &str) {
        let (downloaded, total) = self.state.lock().map(|s| *s).unwrap_or_default();
        info!("ZIP file saved: {} ({}/{} bytes)", name, downloaded, total);
    }
}

/// Terminal progress bar, one bar per archive
#[derive(Debug, Default)]
pub struct BarProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressReporter for BarProgress {
    fn start(&self, name: &str, total: u64) {
        let bar = if total > 0 {
            let bar = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
            ) {
                bar.set_style(style.progress_chars("=>-"));
            }
            bar
        } else {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{msg} {spinner} {bytes}") {
                bar.set_style(style);
            }
            bar
        };
        bar.set_message(name.to_string());

        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn advance(&self, bytes: u64) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.inc(bytes);
            }
        }
    }

    fn finish(&self, _name: &str) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish();
            }
        }
    }
}
