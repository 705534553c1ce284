//! Destination handles: where a download is written and how it is finalized.
//!
//! A destination knows two paths. The final path is rendered from a filename
//! template and a metadata map, so it changes when the extension or the
//! metadata changes. The temp path is where bytes are written; it equals the
//! final path unless a `.part` file was enabled, and once set it stays put so
//! that a later extension correction does not orphan the bytes already
//! written.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use filetime::FileTime;
use regex::Regex;
use serde_json::{Map, Value};
use tokio::fs::{self, File, OpenOptions};
use tracing::{debug, warn};

use super::constants::PART_SUFFIX;
use super::error::DownloadError;
use super::filename::sanitize_filename;

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([^{}]+)\}").expect("placeholder regex is valid") // Static pattern, safe to panic
});

/// Default filename template.
pub const DEFAULT_TEMPLATE: &str = "{filename}.{extension}";

/// How the temp file is opened for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create or truncate.
    Truncate,
    /// Open an existing file for reading and writing.
    Resume,
}

/// Where one download goes.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Current filename extension, without the dot; empty when unknown.
    fn extension(&self) -> &str;

    /// Changes the extension and rebuilds the final path.
    fn set_extension(&mut self, extension: &str);

    /// Metadata the final path is rendered from.
    fn metadata_mut(&mut self) -> &mut Map<String, Value>;

    /// Re-renders the final path from the current metadata.
    fn build_path(&mut self);

    /// Final path.
    fn path(&self) -> &Path;

    /// Path bytes are written to.
    fn temp_path(&self) -> &Path;

    /// Switches writing to a side `.part` file, if not already done.
    fn enable_part(&mut self, part_directory: Option<&Path>);

    /// Records the `Last-Modified` value to apply on finalize.
    fn set_mtime(&mut self, value: Option<String>);

    /// Bytes already in the `.part` file; zero without one.
    async fn part_size(&self) -> u64;

    /// Returns true when the final file already exists.
    async fn exists(&self) -> bool;

    /// Opens the temp file; `None` when resuming and the file is gone.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] when the file cannot be opened.
    async fn open(&mut self, mode: OpenMode) -> Result<Option<File>, DownloadError>;

    /// Removes what this download wrote.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] when an existing file cannot be removed.
    async fn discard(&mut self) -> Result<(), DownloadError>;

    /// Moves the temp file into place and applies the recorded mtime.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] when the rename fails.
    async fn finalize(&mut self) -> Result<(), DownloadError>;
}

/// A destination on the local file system.
#[derive(Debug, Clone)]
pub struct FileDestination {
    directory: PathBuf,
    template: String,
    metadata: Map<String, Value>,
    path: PathBuf,
    temp_path: Option<PathBuf>,
    wrote_final: bool,
    mtime: Option<String>,
}

impl FileDestination {
    /// Creates a destination in `directory` named by `template`.
    #[must_use]
    pub fn new(
        directory: impl Into<PathBuf>,
        template: impl Into<String>,
        metadata: Map<String, Value>,
    ) -> Self {
        let mut destination = Self {
            directory: directory.into(),
            template: template.into(),
            metadata,
            path: PathBuf::new(),
            temp_path: None,
            wrote_final: false,
            mtime: None,
        };
        destination.build_path();
        destination
    }

    /// The recorded `Last-Modified` value.
    #[must_use]
    pub fn mtime(&self) -> Option<&str> {
        self.mtime.as_deref()
    }

    fn has_part(&self) -> bool {
        self.temp_path.as_ref().is_some_and(|temp| *temp != self.path)
    }

    fn render(&self) -> String {
        let rendered = PLACEHOLDER.replace_all(&self.template, |captures: &regex::Captures<'_>| {
            lookup(&self.metadata, &captures[1])
        });
        let rendered = rendered.trim_end_matches('.');
        sanitize_filename(rendered)
    }
}

fn lookup(metadata: &Map<String, Value>, key: &str) -> String {
    let mut parts = key.split('.');
    let mut current = parts.next().and_then(|first| metadata.get(first.trim()));
    for part in parts {
        current = current.and_then(|value| value.get(part.trim()));
    }
    match current {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[async_trait]
impl Destination for FileDestination {
    fn extension(&self) -> &str {
        self.metadata
            .get("extension")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    fn set_extension(&mut self, extension: &str) {
        self.metadata
            .insert("extension".into(), Value::String(extension.to_string()));
        self.build_path();
    }

    fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.metadata
    }

    fn build_path(&mut self) {
        self.path = self.directory.join(self.render());
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> &Path {
        self.temp_path.as_deref().unwrap_or(&self.path)
    }

    fn enable_part(&mut self, part_directory: Option<&Path>) {
        if self.temp_path.is_some() {
            return;
        }
        let name = self
            .path
            .file_name()
            .map_or_else(|| "download".into(), |n| n.to_string_lossy().into_owned());
        let part_name = format!("{name}{PART_SUFFIX}");
        let temp = match part_directory {
            Some(directory) => directory.join(part_name),
            None => self.path.with_file_name(part_name),
        };
        self.temp_path = Some(temp);
    }

    fn set_mtime(&mut self, value: Option<String>) {
        self.mtime = value;
    }

    async fn part_size(&self) -> u64 {
        if !self.has_part() {
            return 0;
        }
        fs::metadata(self.temp_path())
            .await
            .map(|meta| meta.len())
            .unwrap_or(0)
    }

    async fn exists(&self) -> bool {
        !self.extension().is_empty() && fs::try_exists(&self.path).await.unwrap_or(false)
    }

    async fn open(&mut self, mode: OpenMode) -> Result<Option<File>, DownloadError> {
        let temp = self.temp_path().to_path_buf();
        match mode {
            OpenMode::Resume => match OpenOptions::new().read(true).write(true).open(&temp).await {
                Ok(file) => Ok(Some(file)),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(error) => Err(DownloadError::io(temp, error)),
            },
            OpenMode::Truncate => {
                if let Some(parent) = temp.parent() {
                    fs::create_dir_all(parent)
                        .await
                        .map_err(|e| DownloadError::io(parent, e))?;
                }
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&temp)
                    .await
                    .map_err(|e| DownloadError::io(&temp, e))?;
                if !self.has_part() {
                    self.wrote_final = true;
                }
                Ok(Some(file))
            }
        }
    }

    async fn discard(&mut self) -> Result<(), DownloadError> {
        if !self.has_part() && !self.wrote_final {
            return Ok(());
        }
        let temp = self.temp_path().to_path_buf();
        match fs::remove_file(&temp).await {
            Ok(()) => debug!(path = %temp.display(), "removed incomplete file"),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => return Err(DownloadError::io(temp, error)),
        }
        self.temp_path = None;
        self.wrote_final = false;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), DownloadError> {
        if self.has_part() {
            let temp = self.temp_path().to_path_buf();
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DownloadError::io(parent, e))?;
            }
            fs::rename(&temp, &self.path)
                .await
                .map_err(|e| DownloadError::io(&temp, e))?;
            self.temp_path = None;
        }
        self.wrote_final = false;

        if let Some(value) = self.mtime.as_deref() {
            match httpdate::parse_http_date(value) {
                Ok(time) => {
                    let mtime = FileTime::from_system_time(time);
                    if let Err(error) = filetime::set_file_mtime(&self.path, mtime) {
                        warn!(path = %self.path.display(), %error, "failed to set file mtime");
                    }
                }
                Err(_) => debug!(value, "ignoring unparseable Last-Modified"),
            }
        }
        Ok(())
    }
}
