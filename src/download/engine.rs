//! The single-resource download state machine.
//!
//! [`HttpDownloader::download`] drives one URL into one [`Destination`]:
//!
//! 1. request the resource, with a `Range` header when a `.part` file holds
//!    bytes from an earlier attempt
//! 2. classify the status as full content, partial content, already
//!    complete, or rejected (retried when configured or on any 5xx)
//! 3. validate the response head: task validator, HTML guard, size bounds
//! 4. settle the file name, reading the first bytes of fresh downloads to
//!    correct the extension from its signature
//! 5. stream the body to the temp file, throttled and reported when
//!    configured, polling the cooperative download flag per chunk
//!
//! Connection failures, timeouts, retryable statuses, and short bodies go
//! back to step 1 after a linear backoff until the retry budget runs out.
//!
//! # Example
//!
//! ```no_run
//! use mediafetch_core::actions::JobContext;
//! use mediafetch_core::download::{
//!     DEFAULT_TEMPLATE, FileDestination, HttpDownloader, HttpSettings, TaskOverrides,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = HttpDownloader::from_settings(HttpSettings::default())?;
//! let mut metadata = serde_json::Map::new();
//! metadata.insert("filename".into(), "cover".into());
//! let mut dest = FileDestination::new("./downloads", DEFAULT_TEMPLATE, metadata);
//! let mut job = JobContext::default();
//!
//! let outcome = downloader
//!     .download("https://example.com/cover", &mut dest, &TaskOverrides::default(), &mut job)
//!     .await?;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue, LAST_MODIFIED, RANGE};
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};
use url::Url;

use super::body::ReadAheadBody;
use super::constants::SIGNATURE_HEADER_LEN;
use super::destination::{Destination, OpenMode};
use super::error::DownloadError;
use super::mime::{FALLBACK_EXTENSION, extension_for_content_type};
use super::progress::{NullProgress, ProgressReporter};
use super::receiver::{ReceiveError, Receiver};
use super::session::{HttpRequest, HttpResponse, HttpSession, ReqwestSession};
use super::settings::HttpSettings;
use super::signature;
use super::task::{SignatureVerdict, TaskOverrides, TransferOutcome, Validation};
use super::validate::{
    SizeVerdict, StatusClass, check_size, classify_status, detect_challenge, extract_headers,
    is_unexpected_html,
};
use crate::actions::{JobContext, JobLogger};

/// Mutable state of one `download` call.
#[derive(Debug, Default)]
struct AttemptState {
    tries: u32,
    message: String,
    code: u16,
    skip_wait: bool,
    metadata_pending: bool,
    downloading: bool,
}

/// Downloads single resources over HTTP(S) with resume and retry.
///
/// One downloader is meant to be shared by every download of a job; the
/// session behind it pools connections.
pub struct HttpDownloader {
    session: Arc<dyn HttpSession>,
    settings: HttpSettings,
    receiver: Receiver,
    logger: JobLogger,
    reporter: Arc<dyn ProgressReporter>,
}

impl fmt::Debug for HttpDownloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpDownloader")
            .field("settings", &self.settings)
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}

impl HttpDownloader {
    /// Creates a downloader issuing requests through `session`.
    #[must_use]
    pub fn new(session: Arc<dyn HttpSession>, settings: HttpSettings) -> Self {
        Self {
            session,
            receiver: Receiver::new(&settings),
            settings,
            logger: JobLogger::default(),
            reporter: Arc::new(NullProgress),
        }
    }

    /// Creates a downloader with a pooled reqwest session built from `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] when the HTTP client cannot be built.
    pub fn from_settings(settings: HttpSettings) -> Result<Self, DownloadError> {
        let session = ReqwestSession::new(&settings)?;
        Ok(Self::new(Arc::new(session), settings))
    }

    /// Routes log events through `logger` and its configured actions.
    #[must_use]
    pub fn with_logger(mut self, logger: JobLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Reports transfer progress to `reporter`.
    #[must_use]
    pub fn with_progress(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// The settings this downloader was built with.
    #[must_use]
    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    /// Downloads `url` into `dest`.
    ///
    /// On [`TransferOutcome::Success`] the bytes sit in `dest`'s temp path
    /// and the caller finalizes the destination. On `Failed` or `Skipped`
    /// the temp file has been removed.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] when `url` does not parse,
    /// [`DownloadError::Io`] when the temp file cannot be written, and
    /// [`DownloadError::Control`] when a configured action aborts the job.
    /// A `.part` file is kept on errors so a later run can resume it.
    #[instrument(skip(self, dest, task, job), fields(url = %url))]
    pub async fn download(
        &self,
        url: &str,
        dest: &mut dyn Destination,
        task: &TaskOverrides,
        job: &mut JobContext,
    ) -> Result<TransferOutcome, DownloadError> {
        let mut state = AttemptState::default();
        let result = self.run(url, dest, task, job, &mut state).await;

        let discard = match &result {
            Ok(outcome) => !outcome.is_success(),
            Err(_) => state.downloading && dest.temp_path() == dest.path(),
        };
        if discard && let Err(error) = dest.discard().await {
            warn!(%error, "failed to remove incomplete file");
        }
        result
    }

    #[allow(clippy::too_many_lines)]
    async fn run(
        &self,
        url: &str,
        dest: &mut dyn Destination,
        task: &TaskOverrides,
        job: &mut JobContext,
        state: &mut AttemptState,
    ) -> Result<TransferOutcome, DownloadError> {
        if Url::parse(url).is_err() {
            return Err(DownloadError::invalid_url(url));
        }
        let mut url = url.to_string();
        let metadata_key = task
            .http_metadata
            .clone()
            .or_else(|| self.settings.http_metadata.clone());
        let adjust_extension = task
            .adjust_extensions
            .unwrap_or(self.settings.adjust_extensions);
        let part_directory = self.settings.part_directory.as_deref();

        state.metadata_pending = metadata_key.is_some();
        if self.settings.part && !state.metadata_pending {
            dest.enable_part(part_directory);
        }

        let last_modified = loop {
            if state.tries > 0 && !state.skip_wait {
                let total = self
                    .settings
                    .total_attempts()
                    .map_or_else(|| "inf".to_string(), |total| total.to_string());
                let message = format!("{} ({}/{total})", state.message, state.tries);
                self.warning(job, &message).await?;
                if self.settings.retries_exhausted(state.tries) {
                    return Ok(TransferOutcome::Failed);
                }
                tokio::time::sleep(self.backoff(state)).await;
                state.code = 0;
            }
            state.skip_wait = false;
            state.tries += 1;

            // REQUEST
            let part_size = dest.part_size().await;
            let request = self.build_request(&url, task, part_size);
            let response = match self.session.send(request).await {
                Ok(response) => response,
                Err(error) if error.is_retryable() => {
                    state.message = error.to_string();
                    continue;
                }
                Err(error) => {
                    self.warning(job, &error.to_string()).await?;
                    return Ok(TransferOutcome::Failed);
                }
            };
            state.code = response.status;

            // VALIDATE_STATUS
            let (offset, size) = match classify_status(&response, &task.expected_status, part_size)
            {
                StatusClass::Full { size } => (0, size),
                StatusClass::Partial { size } => (part_size, size),
                StatusClass::AlreadyComplete => {
                    debug!(part_size, "requested range is past the end; file is complete");
                    let last_modified = response.header(LAST_MODIFIED.as_str()).map(str::to_string);
                    self.release(response).await;
                    break last_modified;
                }
                StatusClass::Rejected => {
                    state.message =
                        format!("'{} {}' for '{}'", response.status, response.reason, url);
                    if let Some(challenge) = detect_challenge(&response) {
                        self.info(job, &format!("{challenge} challenge")).await?;
                    }
                    let retry = self.settings.is_retry_status(response.status)
                        || task.retry.as_ref().is_some_and(|retry| retry(&response));
                    self.release(response).await;
                    if retry {
                        continue;
                    }
                    self.warning(job, &state.message).await?;
                    return Ok(TransferOutcome::Failed);
                }
            };

            // VALIDATE_BODY
            if self.settings.validate
                && let Some(validator) = &task.validate
            {
                match validator(&response) {
                    Validation::Accept => {}
                    Validation::Reject(reason) => {
                        self.release(response).await;
                        self.warning(job, reason.as_deref().unwrap_or("Invalid response"))
                            .await?;
                        return Ok(TransferOutcome::Failed);
                    }
                    Validation::Retry(next) => {
                        self.release(response).await;
                        self.debug(job, &format!("Retrying download from '{next}'"))
                            .await?;
                        url = next;
                        state.tries = state.tries.saturating_sub(1);
                        state.skip_wait = true;
                        continue;
                    }
                }
            }

            if self.settings.validate_html && is_unexpected_html(&response, dest.extension()) {
                let message = if response.redirected {
                    format!("HTTP redirect to '{}'", response.url)
                } else {
                    "HTML response".to_string()
                };
                self.release(response).await;
                self.warning(job, &message).await?;
                return Ok(TransferOutcome::Failed);
            }

            if let Some(size) = size {
                let message = match check_size(size, self.settings.min_size, self.settings.max_size)
                {
                    SizeVerdict::Allowed => None,
                    SizeVerdict::TooSmall { size, min } => Some(format!(
                        "File size smaller than allowed minimum ({size} < {min})"
                    )),
                    SizeVerdict::TooLarge { size, max } => Some(format!(
                        "File size larger than allowed maximum ({size} > {max})"
                    )),
                };
                if let Some(message) = message {
                    self.release(response).await;
                    self.warning(job, &message).await?;
                    return Ok(TransferOutcome::Skipped);
                }
            }

            // OPEN_FILE
            let mut rebuild = false;
            if dest.extension().is_empty() {
                let extension = match extension_for_content_type(response.content_type()) {
                    Ok(extension) => extension,
                    Err(mtype) => {
                        self.warning(job, &format!("Unknown MIME type '{mtype}'"))
                            .await?;
                        FALLBACK_EXTENSION
                    }
                };
                dest.set_extension(extension);
                rebuild = true;
            }
            if state.metadata_pending
                && let Some(key) = &metadata_key
            {
                dest.metadata_mut()
                    .insert(key.clone(), Value::Object(extract_headers(&response)));
                state.metadata_pending = false;
                rebuild = true;
            }
            if rebuild {
                dest.build_path();
                if dest.exists().await {
                    drop(response);
                    dest.discard().await?;
                    debug!(path = %dest.path().display(), "file already exists");
                    return Ok(TransferOutcome::Success);
                }
            }
            if self.settings.part {
                dest.enable_part(part_directory);
            }

            let response_last_modified =
                response.header(LAST_MODIFIED.as_str()).map(str::to_string);
            let validate_extension = adjust_extension && signature::is_known(dest.extension());
            let mut body = ReadAheadBody::new(response.into_body(), self.settings.chunk_size);

            let mut header: Option<Bytes> = None;
            if offset == 0 && (validate_extension || task.signature.is_some()) {
                let leading = match body.read_header(SIGNATURE_HEADER_LEN).await {
                    Ok(leading) => leading,
                    Err(error) => {
                        state.message = error.to_string();
                        continue;
                    }
                };

                if let Some(check) = &task.signature
                    && let SignatureVerdict::Fail(reason) = check(&leading)
                {
                    self.release_body(body).await;
                    self.warning(
                        job,
                        reason.as_deref().unwrap_or("Invalid file signature bytes"),
                    )
                    .await?;
                    return Ok(TransferOutcome::Failed);
                }

                if validate_extension && adjust_file_extension(dest, &leading) && dest.exists().await
                {
                    drop(body);
                    dest.discard().await?;
                    debug!(path = %dest.path().display(), "file already exists");
                    return Ok(TransferOutcome::Success);
                }
                header = Some(leading);
            }

            // STREAM
            if offset == 0 {
                if part_size > 0 {
                    self.debug(job, "Unable to resume partial download").await?;
                }
            } else {
                self.debug(job, &format!("Resuming download at byte {offset}"))
                    .await?;
            }

            let mode = if offset > 0 {
                OpenMode::Resume
            } else {
                OpenMode::Truncate
            };
            let Some(mut file) = dest.open(mode).await? else {
                state.message = format!(
                    "Partial file '{}' disappeared",
                    dest.temp_path().display()
                );
                continue;
            };
            state.downloading = true;
            let temp = dest.temp_path().to_path_buf();

            let mut offset = offset;
            if header.is_none() && offset > 0 {
                if validate_extension {
                    let head = read_prefix(&mut file, SIGNATURE_HEADER_LEN)
                        .await
                        .map_err(|e| DownloadError::io(&temp, e))?;
                    adjust_file_extension(dest, &head);
                }
                file.seek(SeekFrom::Start(offset))
                    .await
                    .map_err(|e| DownloadError::io(&temp, e))?;
            }

            let mut writer = BufWriter::new(file);
            if let Some(header) = header.take() {
                writer
                    .write_all(&header)
                    .await
                    .map_err(|e| DownloadError::io(&temp, e))?;
                offset += header.len() as u64;
            }

            self.reporter.start(dest.path());
            let received = self
                .receiver
                .receive(
                    &mut writer,
                    &mut body,
                    size,
                    offset,
                    &job.flags,
                    self.reporter.as_ref(),
                )
                .await;
            let flushed = writer.flush().await;
            self.reporter.finish();
            flushed.map_err(|e| DownloadError::io(&temp, e))?;

            let written = match received {
                Ok(received) => offset + received,
                // Any read error once the body started keeps the flushed bytes for a resume.
                Err(ReceiveError::Transport(error)) => {
                    state.message = error.to_string();
                    continue;
                }
                Err(ReceiveError::Io(error)) => return Err(DownloadError::io(&temp, error)),
                Err(ReceiveError::Control(control)) if control.is_stop() => {
                    drop(body);
                    self.warning(job, "Download interrupted").await?;
                    return Ok(TransferOutcome::Failed);
                }
                Err(ReceiveError::Control(control)) => {
                    return Err(DownloadError::control(control));
                }
            };

            if let Some(size) = size
                && written < size
            {
                state.message = format!("file size mismatch ({written} < {size})");
                continue;
            }
            break response_last_modified;
        };

        let mtime = if self.settings.mtime {
            task.last_modified.clone().or(last_modified)
        } else {
            None
        };
        dest.set_mtime(mtime);
        debug!(path = %dest.path().display(), tries = state.tries, "download finished");
        Ok(TransferOutcome::Success)
    }

    fn build_request(&self, url: &str, task: &TaskOverrides, part_size: u64) -> HttpRequest {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        for (name, value) in task.headers.iter().chain(&self.settings.headers) {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "ignoring invalid request header"),
            }
        }
        if part_size > 0
            && let Ok(range) = HeaderValue::from_str(&format!("bytes={part_size}-"))
        {
            headers.insert(RANGE, range);
        }

        HttpRequest {
            method: task.method.clone().unwrap_or(Method::GET),
            url: url.to_string(),
            headers,
            body: task.body.clone(),
        }
    }

    fn backoff(&self, state: &AttemptState) -> Duration {
        let linear = Duration::from_secs(u64::from(state.tries));
        match &self.settings.sleep_429 {
            Some(spec) if state.code == 429 => spec.sample().max(linear),
            _ => linear,
        }
    }

    async fn release(&self, response: HttpResponse) {
        response.release(self.settings.consume_content).await;
    }

    async fn release_body(&self, body: ReadAheadBody) {
        if self.settings.consume_content {
            body.drain().await;
        }
    }

    async fn debug(&self, job: &mut JobContext, message: &str) -> Result<(), DownloadError> {
        self.logger
            .debug(job, message)
            .await
            .map_err(DownloadError::control)
    }

    async fn info(&self, job: &mut JobContext, message: &str) -> Result<(), DownloadError> {
        self.logger
            .info(job, message)
            .await
            .map_err(DownloadError::control)
    }

    async fn warning(&self, job: &mut JobContext, message: &str) -> Result<(), DownloadError> {
        self.logger
            .warning(job, message)
            .await
            .map_err(DownloadError::control)
    }
}

/// Replaces the extension of `dest` when `header` contradicts it.
///
/// Returns true when the extension changed.
fn adjust_file_extension(dest: &mut dyn Destination, header: &[u8]) -> bool {
    if signature::matches(dest.extension(), header) {
        return false;
    }
    match signature::detect_extension(header) {
        Some(extension) => {
            debug!(
                from = dest.extension(),
                to = extension,
                "correcting file extension from signature"
            );
            dest.set_extension(extension);
            true
        }
        None => false,
    }
}

async fn read_prefix(file: &mut File, len: usize) -> std::io::Result<Vec<u8>> {
    let mut buffer = vec![0_u8; len];
    let mut filled = 0;
    while filled < len {
        let read = file.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    buffer.truncate(filled);
    Ok(buffer)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::units::DurationSpec;
    use crate::download::error::TransportError;
    use crate::download::destination::{DEFAULT_TEMPLATE, FileDestination};
    use async_trait::async_trait;
    use serde_json::json;

    struct Unreachable;

    #[async_trait]
    impl HttpSession for Unreachable {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::other("unsupported URL scheme"))
        }
    }

    fn downloader(settings: HttpSettings) -> HttpDownloader {
        HttpDownloader::new(Arc::new(Unreachable), settings)
    }

    #[test]
    fn test_build_request_header_precedence() {
        let settings = HttpSettings {
            headers: vec![
                ("Referer".into(), "https://configured.example/".into()),
                ("Accept".into(), "image/*".into()),
            ],
            ..HttpSettings::default()
        };
        let task = TaskOverrides {
            headers: vec![
                ("Referer".into(), "https://task.example/".into()),
                ("X-Token".into(), "abc".into()),
                ("bad header".into(), "ignored".into()),
            ],
            ..TaskOverrides::default()
        };

        let request = downloader(settings).build_request("https://example.com/a", &task, 0);
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.headers["accept"], "image/*");
        assert_eq!(request.headers["referer"], "https://configured.example/");
        assert_eq!(request.headers["x-token"], "abc");
        assert!(request.headers.get(RANGE).is_none());
        assert_eq!(request.headers.len(), 3);
    }

    #[test]
    fn test_build_request_adds_range_for_part_file() {
        let request = downloader(HttpSettings::default()).build_request(
            "https://example.com/a",
            &TaskOverrides {
                method: Some(Method::POST),
                body: Some(Bytes::from_static(b"q=1")),
                ..TaskOverrides::default()
            },
            1000,
        );
        assert_eq!(request.headers[RANGE], "bytes=1000-");
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.body.as_deref(), Some(&b"q=1"[..]));
    }

    #[test]
    fn test_backoff_is_linear_unless_rate_limited() {
        let downloader = downloader(HttpSettings {
            sleep_429: Some(DurationSpec::fixed(30.0)),
            ..HttpSettings::default()
        });
        let mut state = AttemptState {
            tries: 2,
            code: 503,
            ..AttemptState::default()
        };
        assert_eq!(downloader.backoff(&state), Duration::from_secs(2));

        state.code = 429;
        assert_eq!(downloader.backoff(&state), Duration::from_secs(30));

        state.tries = 45;
        assert_eq!(downloader.backoff(&state), Duration::from_secs(45));
    }

    #[test]
    fn test_backoff_without_sleep_429_ignores_status() {
        let downloader = downloader(HttpSettings {
            sleep_429: None,
            ..HttpSettings::default()
        });
        let state = AttemptState {
            tries: 3,
            code: 429,
            ..AttemptState::default()
        };
        assert_eq!(downloader.backoff(&state), Duration::from_secs(3));
    }

    #[test]
    fn test_adjust_extension_adopts_first_match() {
        let mut dest = FileDestination::new(
            "/out",
            DEFAULT_TEMPLATE,
            json!({"filename": "a", "extension": "jpg"})
                .as_object()
                .unwrap()
                .clone(),
        );
        let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        assert!(adjust_file_extension(&mut dest, png));
        assert_eq!(dest.extension(), "png");
        assert_eq!(dest.path(), std::path::Path::new("/out/a.png"));

        assert!(!adjust_file_extension(&mut dest, png));
        assert!(!adjust_file_extension(&mut dest, b"no known magic"));
        assert_eq!(dest.extension(), "png");
    }

    #[tokio::test]
    async fn test_non_retryable_transport_error_fails_immediately() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut dest = FileDestination::new(
            temp.path(),
            DEFAULT_TEMPLATE,
            json!({"filename": "a", "extension": "bin"})
                .as_object()
                .unwrap()
                .clone(),
        );
        let outcome = downloader(HttpSettings::default())
            .download(
                "gopher://example.com/a",
                &mut dest,
                &TaskOverrides::default(),
                &mut JobContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, TransferOutcome::Failed);
        assert!(!dest.path().exists());
    }
}
