//! Response classification and validation helpers.
//!
//! These are the pure decisions the state machine makes about a response
//! head: whether the status means full content, partial content, an already
//! complete file, or a rejection; what size the body declares; whether the
//! body is an HTML page where media was expected; and whether a rejection
//! looks like an anti-bot challenge.

use reqwest::header::{CONTENT_DISPOSITION, CONTENT_RANGE, LAST_MODIFIED, SERVER, SET_COOKIE};
use serde_json::{Map, Value};

use super::filename::{parse_content_disposition, split_name_ext};
use super::session::HttpResponse;

/// How a response status is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// The whole body follows; write from offset 0.
    Full {
        /// Size from `Content-Length`, when declared.
        size: Option<u64>,
    },
    /// The body continues an existing part file.
    Partial {
        /// Total size from `Content-Range`, when declared.
        size: Option<u64>,
    },
    /// The requested range starts at the end of the file.
    AlreadyComplete,
    /// Anything else.
    Rejected,
}

/// Classifies `response` given the task's extra accepted codes and the
/// number of bytes already on disk.
#[must_use]
pub fn classify_status(response: &HttpResponse, expected: &[u16], part_size: u64) -> StatusClass {
    match response.status {
        200 => StatusClass::Full {
            size: response.content_length(),
        },
        code if expected.contains(&code) => StatusClass::Full {
            size: response.content_length(),
        },
        206 => StatusClass::Partial {
            size: response
                .header(CONTENT_RANGE.as_str())
                .and_then(content_range_total),
        },
        416 if part_size > 0 => StatusClass::AlreadyComplete,
        _ => StatusClass::Rejected,
    }
}

/// Parses the complete length from a `Content-Range` value such as
/// `bytes 1000-1999/2000`; `None` when unknown (`*`) or malformed.
#[must_use]
pub fn content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// Verdict on a declared size against the configured bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeVerdict {
    /// Within bounds or no bounds configured.
    Allowed,
    /// Below the minimum.
    TooSmall {
        /// Declared size.
        size: u64,
        /// Configured minimum.
        min: u64,
    },
    /// Above the maximum.
    TooLarge {
        /// Declared size.
        size: u64,
        /// Configured maximum.
        max: u64,
    },
}

/// Checks `size` against `min` and `max`; a zero bound counts as unset.
#[must_use]
pub fn check_size(size: u64, min: Option<u64>, max: Option<u64>) -> SizeVerdict {
    if let Some(min) = min.filter(|min| *min > 0)
        && size < min
    {
        return SizeVerdict::TooSmall { size, min };
    }
    if let Some(max) = max.filter(|max| *max > 0)
        && size > max
    {
        return SizeVerdict::TooLarge { size, max };
    }
    SizeVerdict::Allowed
}

/// Returns true when the response is an HTML page but `extension` is not an
/// HTML variant.
#[must_use]
pub fn is_unexpected_html(response: &HttpResponse, extension: &str) -> bool {
    response
        .content_type()
        .is_some_and(|content_type| content_type.starts_with("text/html"))
        && !matches!(extension, "html" | "htm")
}

/// Names the anti-bot interstitial `response` appears to be, if any.
#[must_use]
pub fn detect_challenge(response: &HttpResponse) -> Option<&'static str> {
    let server = response.header(SERVER.as_str())?.to_ascii_lowercase();

    if server.starts_with("cloudflare") {
        if !matches!(response.status, 403 | 503) {
            return None;
        }
        let mitigated = response
            .header("cf-mitigated")
            .is_some_and(|value| value.eq_ignore_ascii_case("challenge"));
        let challenge_cookie = response
            .headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .any(|cookie| cookie.contains("cf_chl") || cookie.contains("cf-chl"));
        (mitigated || challenge_cookie).then_some("Cloudflare challenge")
    } else if server.starts_with("ddos-guard") {
        (response.status == 403).then_some("DDoS-Guard challenge")
    } else {
        None
    }
}

/// Collects response headers into a metadata object.
///
/// Every header appears under its lower-cased name. A `Content-Disposition`
/// filename adds `filename` (stem) and `extension`; a parseable
/// `Last-Modified` adds `date` as Unix seconds.
#[must_use]
pub fn extract_headers(response: &HttpResponse) -> Map<String, Value> {
    let mut data = Map::new();
    for (name, value) in &response.headers {
        if let Ok(value) = value.to_str() {
            data.insert(name.as_str().to_string(), Value::String(value.to_string()));
        }
    }

    if let Some(name) = response
        .header(CONTENT_DISPOSITION.as_str())
        .and_then(parse_content_disposition)
    {
        let (stem, extension) = split_name_ext(&name);
        data.insert("filename".into(), Value::String(stem));
        data.insert("extension".into(), Value::String(extension));
    }

    if let Some(seconds) = response
        .header(LAST_MODIFIED.as_str())
        .and_then(|value| httpdate::parse_http_date(value).ok())
        .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|since| since.as_secs())
    {
        data.insert("date".into(), Value::from(seconds));
    }

    data
}
