//! Constants for the download module (timeouts, chunking, probing).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default per-request read timeout in seconds.
pub const READ_TIMEOUT_SECS: f64 = 30.0;

/// Default number of bytes handed to the file per write.
pub const DEFAULT_CHUNK_SIZE: usize = 32_768;

/// Default interval between progress reports, in seconds.
pub const DEFAULT_PROGRESS_INTERVAL: f64 = 3.0;

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: i64 = 4;

/// Default sleep after a 429 response, in seconds.
pub const DEFAULT_SLEEP_429_SECS: f64 = 60.0;

/// Number of leading bytes inspected for file signatures.
pub const SIGNATURE_HEADER_LEN: usize = 16;

/// Suffix appended to in-progress files.
pub const PART_SUFFIX: &str = ".part";
