//! Configuration file loading and resolution into runtime settings.
//!
//! The configuration is a JSON object:
//!
//! ```json
//! {
//!     "downloader": { "http": { "retries": 2, "rate": "500k-1M" } },
//!     "output": {
//!         "actions": { "warning:HTTP 403": "abort" },
//!         "signals": { "SIGUSR1": "flag download=stop" }
//!     }
//! }
//! ```
//!
//! Every key is optional. [`HttpOptions::resolve`] turns the raw values into
//! [`HttpSettings`], falling back to defaults (with a warning) for sizes and
//! rates that do not parse.

pub mod units;

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::actions::{ActionRegistry, ActionSpecError, SignalBinding, signal_bindings};
use crate::download::HttpSettings;
use crate::download::constants::DEFAULT_CHUNK_SIZE;
use units::{DurationSpec, NumOrText, RateSpec, parse_bytes};

/// Directory name under the platform config root.
const CONFIG_DIR_NAME: &str = "mediafetch";

/// File name of the default configuration file.
const CONFIG_FILE_NAME: &str = "config.json";

/// Errors raised while loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("config file '{0}' does not exist")]
    Missing(PathBuf),

    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON or has the wrong shape.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// Path of the file.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A value parsed but is out of range or malformed.
    #[error("invalid value for `{key}`: '{value}'")]
    InvalidValue {
        /// Config key.
        key: &'static str,
        /// Offending value as written.
        value: String,
    },

    /// The `output.actions` or `output.signals` object is malformed.
    #[error("invalid action configuration: {0}")]
    Actions(#[source] ActionSpecError),
}

impl ConfigError {
    /// Creates an [`ConfigError::InvalidValue`].
    #[must_use]
    pub fn invalid_value(key: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            value: value.into(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Downloader sections.
    pub downloader: DownloaderSection,
    /// Output sections.
    pub output: OutputSection,
}

/// The `downloader` object.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DownloaderSection {
    /// Options of the HTTP downloader.
    pub http: HttpOptions,
}

/// The `output` object.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Log-event actions, `"<level>[:<regex>]" -> spec | [spec, ...]`.
    pub actions: serde_json::Map<String, Value>,
    /// Signal actions, `"<SIGNAME>" -> spec | [spec, ...]`.
    pub signals: serde_json::Map<String, Value>,
}

impl FileConfig {
    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] attributed to `origin`.
    pub fn from_json_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Builds the action registry from `output.actions`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Actions`] for malformed action specs.
    pub fn action_registry(&self) -> Result<ActionRegistry, ConfigError> {
        ActionRegistry::from_config(&self.output.actions).map_err(ConfigError::Actions)
    }

    /// Parses `output.signals` into per-signal action lists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Actions`] for malformed action specs.
    pub fn signal_bindings(&self) -> Result<Vec<SignalBinding>, ConfigError> {
        signal_bindings(&self.output.signals).map_err(ConfigError::Actions)
    }
}

/// Raw `downloader.http` options as written in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HttpOptions {
    pub adjust_extensions: Option<bool>,
    pub chunk_size: Option<NumOrText>,
    pub headers: Option<BTreeMap<String, String>>,
    pub filesize_min: Option<NumOrText>,
    pub filesize_max: Option<NumOrText>,
    pub retries: Option<i64>,
    pub retry_codes: Option<Vec<u16>>,
    pub timeout: Option<f64>,
    pub verify: Option<bool>,
    pub mtime: Option<bool>,
    pub rate: Option<NumOrText>,
    /// `Some(None)` when written as `null`, which disables progress output.
    #[serde(deserialize_with = "deserialize_present")]
    pub progress: Option<Option<f64>>,
    pub validate: Option<bool>,
    pub validate_html: Option<bool>,
    pub sleep_429: Option<NumOrText>,
    pub part: Option<bool>,
    pub part_directory: Option<PathBuf>,
    pub consume_content: Option<bool>,
    pub proxy: Option<String>,
    pub http_metadata: Option<String>,
}

fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl HttpOptions {
    /// Resolves raw options into validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a non-positive timeout, a
    /// timeout or progress interval too large for a [`Duration`], or a
    /// malformed `sleep-429`. Malformed sizes and rates only log a warning.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::too_many_lines
    )]
    pub fn resolve(&self) -> Result<HttpSettings, ConfigError> {
        let defaults = HttpSettings::default();

        let mut chunk_size = match &self.chunk_size {
            None => DEFAULT_CHUNK_SIZE,
            Some(value) => match parse_bytes(&value.as_text()) {
                Some(size) if size > 0 => usize::try_from(size).unwrap_or(DEFAULT_CHUNK_SIZE),
                _ => {
                    warn!("Invalid chunk size '{}'", value.as_text());
                    DEFAULT_CHUNK_SIZE
                }
            },
        };

        let min_size = self.filesize_min.as_ref().and_then(|value| {
            let parsed = parse_bytes(&value.as_text());
            if parsed.is_none() {
                warn!("Invalid minimum file size '{}'", value.as_text());
            }
            parsed
        });
        let max_size = self.filesize_max.as_ref().and_then(|value| {
            let parsed = parse_bytes(&value.as_text());
            if parsed.is_none() {
                warn!("Invalid maximum file size '{}'", value.as_text());
            }
            parsed
        });

        let rate = self.rate.as_ref().and_then(|value| {
            let parsed = RateSpec::parse(&value.as_text());
            if parsed.is_none() {
                warn!("Invalid rate limit '{}'", value.as_text());
            }
            parsed
        });
        if let Some(rate) = rate {
            let cap = usize::try_from(rate.max()).unwrap_or(usize::MAX);
            if cap < chunk_size {
                debug!(chunk_size, cap, "reducing chunk size to the rate limit");
                chunk_size = cap;
            }
        }

        let retries = match self.retries {
            None => defaults.retries,
            Some(value) if value < 0 => None,
            Some(value) => Some(u32::try_from(value).unwrap_or(u32::MAX)),
        };

        let timeout = match self.timeout {
            None => defaults.timeout,
            Some(secs) if secs > 0.0 => Duration::try_from_secs_f64(secs)
                .map_err(|_| ConfigError::invalid_value("timeout", secs.to_string()))?,
            Some(secs) => return Err(ConfigError::invalid_value("timeout", secs.to_string())),
        };

        // Negative intervals report after every chunk.
        let progress = match self.progress {
            None => defaults.progress,
            Some(None) => None,
            Some(Some(secs)) => Some(
                Duration::try_from_secs_f64(if secs < 0.0 { 0.0 } else { secs })
                    .map_err(|_| ConfigError::invalid_value("progress", secs.to_string()))?,
            ),
        };

        let sleep_429 = match &self.sleep_429 {
            None => defaults.sleep_429,
            Some(NumOrText::Number(secs)) if *secs <= 0.0 => None,
            Some(value) => Some(
                DurationSpec::parse(&value.as_text())
                    .ok_or_else(|| ConfigError::invalid_value("sleep-429", value.as_text()))?,
            ),
        };

        Ok(HttpSettings {
            adjust_extensions: self.adjust_extensions.unwrap_or(defaults.adjust_extensions),
            chunk_size,
            headers: self
                .headers
                .as_ref()
                .map(|headers| {
                    headers
                        .iter()
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            min_size,
            max_size,
            retries,
            retry_codes: self.retry_codes.clone().unwrap_or_default(),
            timeout,
            verify: self.verify.unwrap_or(defaults.verify),
            mtime: self.mtime.unwrap_or(defaults.mtime),
            rate,
            progress,
            validate: self.validate.unwrap_or(defaults.validate),
            validate_html: self.validate_html.unwrap_or(defaults.validate_html),
            sleep_429,
            part: self.part.unwrap_or(defaults.part),
            part_directory: self.part_directory.clone(),
            consume_content: self.consume_content.unwrap_or(defaults.consume_content),
            proxy: self.proxy.clone().filter(|proxy| !proxy.is_empty()),
            http_metadata: self.http_metadata.clone().filter(|key| !key.is_empty()),
        })
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Path the configuration was (or would have been) loaded from.
    pub path: Option<PathBuf>,
    /// Parsed configuration; the default configuration when no file exists.
    pub config: FileConfig,
    /// Indicates whether configuration was loaded from disk.
    pub loaded_from_file: bool,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/mediafetch/config.json`
/// 2. `$HOME/.config/mediafetch/config.json`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the configuration from `explicit`, or from the default path if present.
///
/// # Errors
///
/// An explicit path must exist; any existing file must be readable JSON.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: load_file_config(path)?,
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(path_ref) if path_ref.exists() => {
            let config = load_file_config(path_ref)?;
            Ok(LoadedConfig {
                path,
                config,
                loaded_from_file: true,
            })
        }
        _ => Ok(LoadedConfig {
            path,
            config: FileConfig::default(),
            loaded_from_file: false,
        }),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loading config file");
    FileConfig::from_json_str(&raw, path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(json: &str) -> HttpOptions {
        FileConfig::from_json_str(json, Path::new("test.json"))
            .unwrap()
            .downloader
            .http
    }

    #[test]
    fn test_empty_config_resolves_to_defaults() {
        let settings = HttpOptions::default().resolve().unwrap();
        assert_eq!(settings.chunk_size, 32_768);
        assert_eq!(settings.retries, Some(4));
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert_eq!(settings.progress, Some(Duration::from_secs(3)));
        assert!(settings.sleep_429.is_some());
        assert!(settings.part);
    }

    #[test]
    fn test_kebab_case_keys_and_size_strings() {
        let settings = options(
            r#"{"downloader": {"http": {
                "filesize-min": "1k", "filesize-max": 2048, "chunk-size": "64k",
                "retry-codes": [404, 429], "adjust-extensions": false, "validate-html": false
            }}}"#,
        )
        .resolve()
        .unwrap();
        assert_eq!(settings.min_size, Some(1024));
        assert_eq!(settings.max_size, Some(2048));
        assert_eq!(settings.chunk_size, 65_536);
        assert_eq!(settings.retry_codes, vec![404, 429]);
        assert!(!settings.adjust_extensions);
        assert!(!settings.validate_html);
    }

    #[test]
    fn test_invalid_sizes_are_ignored() {
        let settings = options(
            r#"{"downloader": {"http": {"filesize-min": "huge", "chunk-size": "lots"}}}"#,
        )
        .resolve()
        .unwrap();
        assert_eq!(settings.min_size, None);
        assert_eq!(settings.chunk_size, 32_768);
    }

    #[test]
    fn test_negative_retries_are_unbounded() {
        let settings = options(r#"{"downloader": {"http": {"retries": -1}}}"#)
            .resolve()
            .unwrap();
        assert_eq!(settings.retries, None);
    }

    #[test]
    fn test_rate_below_chunk_size_shrinks_chunks() {
        let settings = options(r#"{"downloader": {"http": {"rate": "8k"}}}"#)
            .resolve()
            .unwrap();
        assert_eq!(settings.chunk_size, 8192);
        assert_eq!(settings.rate.unwrap().max(), 8192);
    }

    #[test]
    fn test_invalid_rate_disables_cap() {
        let settings = options(r#"{"downloader": {"http": {"rate": "fast"}}}"#)
            .resolve()
            .unwrap();
        assert!(settings.rate.is_none());
    }

    #[test]
    fn test_null_progress_disables_reports() {
        let settings = options(r#"{"downloader": {"http": {"progress": null}}}"#)
            .resolve()
            .unwrap();
        assert_eq!(settings.progress, None);

        let clamped = options(r#"{"downloader": {"http": {"progress": -1.0}}}"#)
            .resolve()
            .unwrap();
        assert_eq!(clamped.progress, Some(Duration::ZERO));
    }

    #[test]
    fn test_sleep_429_zero_means_linear_backoff() {
        let settings = options(r#"{"downloader": {"http": {"sleep-429": 0}}}"#)
            .resolve()
            .unwrap();
        assert!(settings.sleep_429.is_none());

        let error = options(r#"{"downloader": {"http": {"sleep-429": "later"}}}"#)
            .resolve()
            .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { key: "sleep-429", .. }));
    }

    #[test]
    fn test_invalid_timeout_is_an_error() {
        let error = options(r#"{"downloader": {"http": {"timeout": 0}}}"#)
            .resolve()
            .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { key: "timeout", .. }));
    }

    #[test]
    fn test_out_of_range_durations_are_errors() {
        let error = options(r#"{"downloader": {"http": {"timeout": 1e300}}}"#)
            .resolve()
            .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { key: "timeout", .. }));

        let error = options(r#"{"downloader": {"http": {"progress": 1e300}}}"#)
            .resolve()
            .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { key: "progress", .. }));

        let error = options(r#"{"downloader": {"http": {"sleep-429": "1e300"}}}"#)
            .resolve()
            .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { key: "sleep-429", .. }));
    }

    #[test]
    fn test_non_finite_overrides_are_errors() {
        let options = HttpOptions {
            timeout: Some(f64::INFINITY),
            ..HttpOptions::default()
        };
        assert!(options.resolve().is_err());

        let options = HttpOptions {
            progress: Some(Some(f64::NAN)),
            ..HttpOptions::default()
        };
        assert!(matches!(
            options.resolve(),
            Err(ConfigError::InvalidValue { key: "progress", .. })
        ));
    }

    #[test]
    fn test_action_registry_from_output_section() {
        let config = FileConfig::from_json_str(
            r#"{"output": {"actions": {"warning": "explode"}}}"#,
            Path::new("test.json"),
        )
        .unwrap();
        assert!(matches!(
            config.action_registry(),
            Err(ConfigError::Actions(ActionSpecError::UnknownAction(_)))
        ));
    }

    #[test]
    fn test_signal_bindings_from_output_section() {
        let config = FileConfig::from_json_str(
            r#"{"output": {"signals": {"SIGUSR1": ["flag file=terminate", "print bye"]}}}"#,
            Path::new("test.json"),
        )
        .unwrap();
        let bindings = config.signal_bindings().unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].name, "SIGUSR1");
        assert_eq!(bindings[0].actions.len(), 2);

        let config = FileConfig::from_json_str(
            r#"{"output": {"signals": {"SIGUSR1": "explode"}}}"#,
            Path::new("test.json"),
        )
        .unwrap();
        assert!(matches!(
            config.signal_bindings(),
            Err(ConfigError::Actions(ActionSpecError::UnknownAction(_)))
        ));
    }

    #[test]
    fn test_load_explicit_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{"downloader": {"http": {"retries": 1}}}"#).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert!(loaded.loaded_from_file);
        assert_eq!(loaded.config.downloader.http.retries, Some(1));
    }

    #[test]
    fn test_load_missing_explicit_config_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent.json");
        assert!(matches!(
            load_config(Some(&path)),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_malformed_config_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        let error = load_config(Some(&path)).unwrap_err();
        assert!(error.to_string().contains("config.json"));
    }
}
