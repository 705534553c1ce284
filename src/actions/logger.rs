//! The logging seam: leveled log calls routed through the action registry.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use super::registry::{ActionRegistry, CallContext};
use super::{ControlError, Flags};

/// Numeric log level, compatible with the usual 10/20/30/40 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Level(pub u32);

impl Level {
    pub const DEBUG: Self = Self(10);
    pub const INFO: Self = Self(20);
    pub const WARNING: Self = Self(30);
    pub const ERROR: Self = Self(40);

    /// Levels a wildcard selector expands to.
    pub const STANDARD: [Self; 4] = [Self::DEBUG, Self::INFO, Self::WARNING, Self::ERROR];

    /// Parses a level name (`debug`, `info`, `warning`/`warn`, `error`) or a number.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(number) = value.parse() {
            return Some(Self(number));
        }
        match value.to_ascii_lowercase().as_str() {
            "debug" => Some(Self::DEBUG),
            "info" => Some(Self::INFO),
            "warning" | "warn" => Some(Self::WARNING),
            "error" => Some(Self::ERROR),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::DEBUG => f.write_str("debug"),
            Self::INFO => f.write_str("info"),
            Self::WARNING => f.write_str("warning"),
            Self::ERROR => f.write_str("error"),
            Self(other) => write!(f, "level {other}"),
        }
    }
}

/// State owned by one job and mutated by "before" actions.
#[derive(Debug, Clone, Default)]
pub struct JobContext {
    /// Accumulated status bitmask, reported as the exit code by the CLI.
    pub status: u32,
    /// Cooperative flags shared by every job of the process.
    pub flags: Arc<Flags>,
}

impl JobContext {
    /// Creates a context sharing `flags`.
    #[must_use]
    pub fn new(flags: Arc<Flags>) -> Self {
        Self { status: 0, flags }
    }
}

/// Leveled logger that runs configured actions around every event.
///
/// Without registered actions every call reduces to a plain `tracing` event.
#[derive(Debug, Clone, Default)]
pub struct JobLogger {
    registry: Arc<ActionRegistry>,
}

impl JobLogger {
    /// Creates a logger dispatching through `registry`.
    #[must_use]
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self { registry }
    }

    /// Emits `message` at `level`.
    ///
    /// # Errors
    ///
    /// Returns the [`ControlError`] raised by a matching "after" action.
    pub async fn log(
        &self,
        job: &mut JobContext,
        level: Level,
        message: &str,
    ) -> Result<(), ControlError> {
        let mut call = CallContext { level, job };
        self.registry.apply_before(level, message, &mut call);
        emit(call.level, message);
        self.registry.apply_after(level, message).await
    }

    /// Emits `message` at debug level.
    ///
    /// # Errors
    ///
    /// See [`JobLogger::log`].
    pub async fn debug(&self, job: &mut JobContext, message: &str) -> Result<(), ControlError> {
        self.log(job, Level::DEBUG, message).await
    }

    /// Emits `message` at info level.
    ///
    /// # Errors
    ///
    /// See [`JobLogger::log`].
    pub async fn info(&self, job: &mut JobContext, message: &str) -> Result<(), ControlError> {
        self.log(job, Level::INFO, message).await
    }

    /// Emits `message` at warning level.
    ///
    /// # Errors
    ///
    /// See [`JobLogger::log`].
    pub async fn warning(&self, job: &mut JobContext, message: &str) -> Result<(), ControlError> {
        self.log(job, Level::WARNING, message).await
    }

    /// Emits `message` at error level.
    ///
    /// # Errors
    ///
    /// See [`JobLogger::log`].
    pub async fn error(&self, job: &mut JobContext, message: &str) -> Result<(), ControlError> {
        self.log(job, Level::ERROR, message).await
    }
}

fn emit(level: Level, message: &str) {
    if level < Level::DEBUG {
        trace!("{message}");
    } else if level < Level::INFO {
        debug!("{message}");
    } else if level < Level::WARNING {
        info!("{message}");
    } else if level < Level::ERROR {
        warn!("{message}");
    } else {
        error!("{message}");
    }
}
