//! Progress reporting for running transfers.

use std::path::Path;
use std::sync::Mutex;

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

/// Receives transfer progress.
pub trait ProgressReporter: Send + Sync {
    /// A transfer into `path` is starting.
    fn start(&self, path: &Path);

    /// `downloaded` of `total` bytes are on disk, arriving at `rate` bytes/s.
    fn progress(&self, total: Option<u64>, downloaded: u64, rate: u64);

    /// The current transfer ended, successfully or not.
    fn finish(&self);
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressReporter for NullProgress {
    fn start(&self, _path: &Path) {}

    fn progress(&self, _total: Option<u64>, _downloaded: u64, _rate: u64) {}

    fn finish(&self) {}
}

/// Terminal progress bar on stderr.
#[derive(Debug, Default)]
pub struct TerminalProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalProgress {
    /// Creates a reporter with no active bar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_bar(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        let mut bar = self
            .bar
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut bar);
    }
}

impl ProgressReporter for TerminalProgress {
    fn start(&self, path: &Path) {
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        self.with_bar(|bar| {
            let progress = ProgressBar::new(0);
            progress.set_style(
                ProgressStyle::with_template(
                    "{msg} {bytes}/{total_bytes} {prefix} {wide_bar}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            progress.set_message(name);
            *bar = Some(progress);
        });
    }

    fn progress(&self, total: Option<u64>, downloaded: u64, rate: u64) {
        self.with_bar(|bar| {
            if let Some(progress) = bar.as_ref() {
                if let Some(total) = total {
                    progress.set_length(total);
                }
                progress.set_position(downloaded);
                progress.set_prefix(format!("{}/s", HumanBytes(rate)));
            }
        });
    }

    fn finish(&self) {
        self.with_bar(|bar| {
            if let Some(progress) = bar.take() {
                progress.finish_and_clear();
            }
        });
    }
}
