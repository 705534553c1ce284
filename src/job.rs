//! Sequential batch orchestration for the command line.
//!
//! A [`BatchJob`] downloads a list of URLs one after another into a single
//! directory. Each URL gets its own [`FileDestination`] named from the last
//! path segment of the URL; files that already exist are skipped without a
//! request. Control conditions raised by configured actions end the batch:
//! `abort` and `terminate` stop it, `restart` runs it again from the first
//! URL, and `exit` stops it with an exit code.

use std::path::PathBuf;

use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};

use crate::actions::{ControlError, FlagKind, JobContext};
use crate::download::filename::name_ext_from_url;
use crate::download::{
    Destination, DownloadError, FileDestination, HttpDownloader, TaskOverrides, TransferOutcome,
};

/// Fallback file stem for URLs without a usable last path segment.
const DEFAULT_STEM: &str = "file";

/// Per-batch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    succeeded: usize,
    skipped: usize,
    failed: usize,
}

impl JobStats {
    /// Returns the number of files downloaded in this batch.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Returns the number of files skipped (already present or outside size limits).
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Returns the number of failed downloads.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Returns the number of URLs processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// Result of running a batch.
#[derive(Debug)]
pub struct JobReport {
    /// Counters of the last run (a restart resets them).
    pub stats: JobStats,
    /// Status bitmask accumulated by `status` actions.
    pub status: u32,
    /// Control condition that ended the batch early, if any.
    pub stopped_by: Option<ControlError>,
}

impl JobReport {
    /// Process exit code for this report.
    ///
    /// An `exit` action wins, then a non-zero job status, then 1 when any
    /// download failed or an unknown condition was raised.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match &self.stopped_by {
            Some(ControlError::Exit(code)) => *code,
            _ if self.status != 0 => i32::try_from(self.status).unwrap_or(i32::MAX),
            Some(ControlError::Raised { .. }) => 1,
            _ if self.stats.failed > 0 => 1,
            _ => 0,
        }
    }
}

/// Downloads a list of URLs into one directory.
#[derive(Debug)]
pub struct BatchJob {
    downloader: HttpDownloader,
    directory: PathBuf,
    template: String,
    context: JobContext,
}

impl BatchJob {
    /// Creates a batch writing into `directory` with file names from `template`.
    #[must_use]
    pub fn new(
        downloader: HttpDownloader,
        directory: impl Into<PathBuf>,
        template: impl Into<String>,
        context: JobContext,
    ) -> Self {
        Self {
            downloader,
            directory: directory.into(),
            template: template.into(),
            context,
        }
    }

    /// Downloads every URL in order.
    ///
    /// Individual failures never end the batch; they are counted in the
    /// report. Only control conditions stop it early.
    #[instrument(skip(self, urls), fields(urls = urls.len(), directory = %self.directory.display()))]
    pub async fn run(&mut self, urls: &[String]) -> JobReport {
        loop {
            let (stats, stopped_by) = self.run_once(urls).await;
            if matches!(stopped_by, Some(ControlError::Restart)) {
                info!("restarting batch");
                continue;
            }
            info!(
                succeeded = stats.succeeded,
                skipped = stats.skipped,
                failed = stats.failed,
                total = stats.total(),
                "batch complete"
            );
            return JobReport {
                stats,
                status: self.context.status,
                stopped_by,
            };
        }
    }

    async fn run_once(&mut self, urls: &[String]) -> (JobStats, Option<ControlError>) {
        let mut stats = JobStats::default();
        for url in urls {
            if let Err(control) = self.context.flags.process(FlagKind::File) {
                info!(%control, "file flag set; stopping batch");
                return (stats, Some(control));
            }

            match self.download_one(url).await {
                Ok(Fetched::Downloaded) => stats.succeeded += 1,
                Ok(Fetched::Present | Fetched::Excluded) => stats.skipped += 1,
                Ok(Fetched::Failed) => stats.failed += 1,
                Err(error) => {
                    if let DownloadError::Control { source } = error {
                        if source.is_stop() {
                            stats.failed += 1;
                        }
                        warn!(url = %url, control = %source, "batch interrupted");
                        return (stats, Some(source));
                    }
                    error!(url = %url, %error, "download error");
                    stats.failed += 1;
                }
            }
        }
        (stats, None)
    }

    async fn download_one(&mut self, url: &str) -> Result<Fetched, DownloadError> {
        let mut dest = self.destination_for(url);
        if dest.exists().await {
            info!(path = %dest.path().display(), "file already exists; skipping");
            return Ok(Fetched::Present);
        }

        let outcome = self
            .downloader
            .download(url, &mut dest, &TaskOverrides::default(), &mut self.context)
            .await?;
        match outcome {
            TransferOutcome::Success => {
                dest.finalize().await?;
                info!(path = %dest.path().display(), "download completed");
                Ok(Fetched::Downloaded)
            }
            TransferOutcome::Skipped => Ok(Fetched::Excluded),
            TransferOutcome::Failed => Ok(Fetched::Failed),
        }
    }

    fn destination_for(&self, url: &str) -> FileDestination {
        let (stem, extension) = name_ext_from_url(url);
        let stem = if stem.is_empty() {
            DEFAULT_STEM.to_string()
        } else {
            stem
        };
        let mut metadata = Map::new();
        metadata.insert("filename".into(), Value::String(stem));
        metadata.insert("extension".into(), Value::String(extension));
        metadata.insert("url".into(), Value::String(url.to_string()));
        FileDestination::new(&self.directory, &self.template, metadata)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fetched {
    Downloaded,
    Present,
    Excluded,
    Failed,
}
