//! Per-download overrides, callbacks, and the transfer outcome.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::Method;

use super::session::HttpResponse;

/// Result of one download invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The file is complete (or was already present).
    Success,
    /// The declared size is outside the configured bounds.
    Skipped,
    /// Retries were exhausted or the response was rejected.
    Failed,
}

impl TransferOutcome {
    /// Returns true for [`TransferOutcome::Success`].
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Skipped => f.write_str("skipped"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Verdict of a response validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Continue with this response.
    Accept,
    /// Give up; the reason is logged, or "Invalid response" when absent.
    Reject(Option<String>),
    /// Request this URL instead without spending a retry.
    Retry(String),
}

/// Verdict of a signature validator on the first bytes of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureVerdict {
    /// The bytes are acceptable.
    Pass,
    /// The bytes are not; the reason is logged, or a generic message when absent.
    Fail(Option<String>),
}

/// Inspects a response head before the body is read.
pub type ResponseValidator = Arc<dyn Fn(&HttpResponse) -> Validation + Send + Sync>;

/// Decides whether a rejected status should be retried anyway.
pub type RetryPredicate = Arc<dyn Fn(&HttpResponse) -> bool + Send + Sync>;

/// Inspects the first bytes of a fresh download.
pub type SignatureValidator = Arc<dyn Fn(&[u8]) -> SignatureVerdict + Send + Sync>;

/// Overrides supplied with one resource by the caller.
#[derive(Clone, Default)]
pub struct TaskOverrides {
    /// Request method; GET when unset.
    pub method: Option<Method>,
    /// Extra request headers, applied before the configured headers.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Option<Bytes>,
    /// Status codes accepted as full content besides 200.
    pub expected_status: Vec<u16>,
    /// Overrides the configured `adjust-extensions`.
    pub adjust_extensions: Option<bool>,
    /// Response validator, run when validation is enabled.
    pub validate: Option<ResponseValidator>,
    /// Retry predicate for otherwise rejected statuses.
    pub retry: Option<RetryPredicate>,
    /// Signature validator for the first bytes of the body.
    pub signature: Option<SignatureValidator>,
    /// Overrides the configured `http-metadata` key.
    pub http_metadata: Option<String>,
    /// Last-Modified value to record instead of the response header.
    pub last_modified: Option<String>,
}

impl fmt::Debug for TaskOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOverrides")
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(Bytes::len))
            .field("expected_status", &self.expected_status)
            .field("adjust_extensions", &self.adjust_extensions)
            .field("validate", &self.validate.is_some())
            .field("retry", &self.retry.is_some())
            .field("signature", &self.signature.is_some())
            .field("http_metadata", &self.http_metadata)
            .field("last_modified", &self.last_modified)
            .finish()
    }
}
