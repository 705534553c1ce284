//! Default User-Agent for download requests.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/mediafetch/mediafetch";

/// Default User-Agent for download requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("mediafetch/{version} (+{PROJECT_UA_URL})")
}
