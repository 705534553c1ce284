//! Resumable HTTP(S) downloads of single resources.
//!
//! This module provides the state machine that moves one URL into one
//! destination file, together with the collaborators it is built from.
//!
//! # Features
//!
//! - Streaming downloads into `.part` files, resumed with `Range` requests
//! - Linear backoff retries for connection errors and retryable statuses
//! - Size limits, HTML guards, and caller-supplied response validators
//! - File extension correction from magic-byte signatures
//! - Optional bandwidth cap and progress reporting
//!
//! # Example
//!
//! ```no_run
//! use mediafetch_core::download::{HttpDownloader, HttpSettings};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = HttpDownloader::from_settings(HttpSettings::default())?;
//! assert_eq!(downloader.settings().chunk_size, 32_768);
//! # Ok(())
//! # }
//! ```

mod body;
pub mod constants;
mod destination;
mod engine;
mod error;
pub mod filename;
pub mod mime;
mod progress;
mod receiver;
mod session;
mod settings;
pub mod signature;
mod task;
pub mod validate;

pub use body::ReadAheadBody;
pub use destination::{DEFAULT_TEMPLATE, Destination, FileDestination, OpenMode};
pub use engine::HttpDownloader;
pub use error::{DownloadError, TransportError};
pub use progress::{NullProgress, ProgressReporter, TerminalProgress};
pub use receiver::{ReceiveError, Receiver};
pub use session::{ByteStream, HttpRequest, HttpResponse, HttpSession, ReqwestSession};
pub use settings::HttpSettings;
pub use task::{
    ResponseValidator, RetryPredicate, SignatureValidator, SignatureVerdict, TaskOverrides,
    TransferOutcome, Validation,
};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
