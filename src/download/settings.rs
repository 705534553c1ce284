//! Validated runtime settings for the HTTP downloader.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::units::{DurationSpec, RateSpec};

use super::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_PROGRESS_INTERVAL, DEFAULT_RETRIES, DEFAULT_SLEEP_429_SECS,
    READ_TIMEOUT_SECS,
};

/// Settings shared by every download run by one [`HttpDownloader`](super::HttpDownloader).
///
/// Built from the `downloader.http` configuration object by
/// [`HttpOptions::resolve`](crate::config::HttpOptions::resolve); the defaults
/// match an empty configuration.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Correct the filename extension when the file signature disagrees.
    pub adjust_extensions: bool,
    /// Bytes written per chunk.
    pub chunk_size: usize,
    /// Header overrides applied after the per-task headers.
    pub headers: Vec<(String, String)>,
    /// Files whose declared size is below this are skipped.
    pub min_size: Option<u64>,
    /// Files whose declared size is above this are skipped.
    pub max_size: Option<u64>,
    /// Retries after the first attempt; `None` retries forever.
    pub retries: Option<u32>,
    /// Extra status codes that trigger a retry besides 5xx.
    pub retry_codes: Vec<u16>,
    /// Per-request read timeout.
    pub timeout: Duration,
    /// Verify TLS certificates.
    pub verify: bool,
    /// Propagate `Last-Modified` to the file's mtime.
    pub mtime: bool,
    /// Bandwidth cap.
    pub rate: Option<RateSpec>,
    /// Interval between progress reports; `None` disables them.
    pub progress: Option<Duration>,
    /// Run the per-task response validator. Signature checks run regardless.
    pub validate: bool,
    /// Reject HTML bodies when media was expected.
    pub validate_html: bool,
    /// Sleep after a 429 response; linear backoff when unset.
    pub sleep_429: Option<DurationSpec>,
    /// Write to a side `.part` file until the download completes.
    pub part: bool,
    /// Directory for `.part` files instead of the output directory.
    pub part_directory: Option<PathBuf>,
    /// Drain rejected responses so the connection can be reused.
    pub consume_content: bool,
    /// Proxy URL for every request.
    pub proxy: Option<String>,
    /// Metadata key that receives response headers.
    pub http_metadata: Option<String>,
}

impl Default for HttpSettings {
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            adjust_extensions: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            headers: Vec::new(),
            min_size: None,
            max_size: None,
            retries: Some(DEFAULT_RETRIES as u32),
            retry_codes: Vec::new(),
            timeout: Duration::from_secs_f64(READ_TIMEOUT_SECS),
            verify: true,
            mtime: true,
            rate: None,
            progress: Some(Duration::from_secs_f64(DEFAULT_PROGRESS_INTERVAL)),
            validate: true,
            validate_html: true,
            sleep_429: Some(DurationSpec::fixed(DEFAULT_SLEEP_429_SECS)),
            part: true,
            part_directory: None,
            consume_content: false,
            proxy: None,
            http_metadata: None,
        }
    }
}

impl HttpSettings {
    /// Returns true when `tries` has used up the retry budget.
    #[must_use]
    pub fn retries_exhausted(&self, tries: u32) -> bool {
        self.retries.is_some_and(|retries| tries > retries)
    }

    /// Total attempts allowed, or `None` when unbounded; used in log messages.
    #[must_use]
    pub fn total_attempts(&self) -> Option<u32> {
        self.retries.map(|retries| retries.saturating_add(1))
    }

    /// Returns true when the rate-aware receiver is needed.
    #[must_use]
    pub fn tracks_rate(&self) -> bool {
        self.rate.is_some() || self.progress.is_some()
    }

    /// Returns true when `status` is retried regardless of task callbacks.
    #[must_use]
    pub fn is_retry_status(&self, status: u16) -> bool {
        (500..600).contains(&status) || self.retry_codes.contains(&status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_empty_config() {
        let settings = HttpSettings::default();
        assert_eq!(settings.chunk_size, 32_768);
        assert_eq!(settings.retries, Some(4));
        assert_eq!(settings.total_attempts(), Some(5));
        assert!(settings.part);
        assert!(settings.tracks_rate());
    }

    #[test]
    fn test_retry_budget() {
        let settings = HttpSettings {
            retries: Some(2),
            ..HttpSettings::default()
        };
        assert!(!settings.retries_exhausted(2));
        assert!(settings.retries_exhausted(3));

        let unbounded = HttpSettings {
            retries: None,
            ..HttpSettings::default()
        };
        assert!(!unbounded.retries_exhausted(u32::MAX));
        assert_eq!(unbounded.total_attempts(), None);
    }

    #[test]
    fn test_retry_status_covers_5xx_and_configured_codes() {
        let settings = HttpSettings {
            retry_codes: vec![404],
            ..HttpSettings::default()
        };
        assert!(settings.is_retry_status(500));
        assert!(settings.is_retry_status(599));
        assert!(settings.is_retry_status(404));
        assert!(!settings.is_retry_status(403));
        assert!(!settings.is_retry_status(429));
    }
}
