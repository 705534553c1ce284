//! Error types for the download module.
//!
//! Ordinary network conditions are not errors here: the state machine turns
//! them into [`TransferOutcome::Failed`](super::TransferOutcome::Failed) once
//! the retry budget is spent. [`DownloadError`] is reserved for local I/O
//! failures, invalid input, and control conditions that must reach the
//! orchestrator. [`TransportError`] classifies what a session reports.

use std::path::PathBuf;

use thiserror::Error;

use crate::actions::ControlError;

/// Errors that end a download invocation without an outcome.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// File system error while writing, renaming, or removing files.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// An action hook or cooperative flag interrupted the job.
    #[error("download interrupted: {source}")]
    Control {
        /// The control condition.
        #[source]
        source: ControlError,
    },
}

impl DownloadError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a client construction error.
    #[must_use]
    pub fn client(source: reqwest::Error) -> Self {
        Self::Client { source }
    }

    /// Wraps a control condition.
    #[must_use]
    pub fn control(source: ControlError) -> Self {
        Self::Control { source }
    }

    /// Returns the control condition carried by this error, if any.
    #[must_use]
    pub fn as_control(&self) -> Option<&ControlError> {
        match self {
            Self::Control { source } => Some(source),
            _ => None,
        }
    }
}

/// Transport-level failure reported by a session, before or during the body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection could not be established or was reset.
    #[error("{message}")]
    Connect {
        /// Diagnostic text.
        message: String,
    },

    /// The request or a body read timed out.
    #[error("{message}")]
    Timeout {
        /// Diagnostic text.
        message: String,
    },

    /// Anything else the transport refused to do (bad scheme, TLS setup, ...).
    #[error("{message}")]
    Other {
        /// Diagnostic text.
        message: String,
    },
}

impl TransportError {
    /// Creates a connection error.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates a transport error that is not retried when sending a request.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Classifies a reqwest error.
    #[must_use]
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        let message = error_chain_message(error);
        if error.is_timeout() {
            Self::timeout(message)
        } else if error.is_connect() || error.is_request() || error.is_body() {
            Self::connect(message)
        } else {
            Self::other(message)
        }
    }

    /// Returns true when sending a request that failed this way should be retried.
    ///
    /// Errors while reading a body that already started are always retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Timeout { .. })
    }
}

fn error_chain_message(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
