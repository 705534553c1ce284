//! Control conditions raised by action hooks and cooperative flags.

use thiserror::Error;

/// A control condition that interrupts the running job.
///
/// [`ControlError::Stop`] only ends the current download; every other
/// variant is fatal to the whole job and must propagate to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    /// Stop the current resource.
    #[error("extraction stopped")]
    Stop,

    /// Terminate the whole job.
    #[error("extraction terminated")]
    Terminate,

    /// Restart the whole job from the beginning.
    #[error("extraction restart requested")]
    Restart,

    /// Exit the process with the given status code.
    #[error("exit requested with status {0}")]
    Exit(i32),

    /// A user-named condition raised by a `raise` action.
    #[error("{name}: {message}")]
    Raised {
        /// Name given in the action spec.
        name: String,
        /// Optional message given in the action spec.
        message: String,
    },
}

impl ControlError {
    /// Maps a condition name from a `raise` action to a control condition.
    #[must_use]
    pub fn from_name(name: &str, message: &str) -> Self {
        match name {
            "StopExtraction" | "AbortExtraction" => Self::Stop,
            "TerminateExtraction" => Self::Terminate,
            "RestartExtraction" => Self::Restart,
            _ => Self::Raised {
                name: name.to_string(),
                message: message.to_string(),
            },
        }
    }

    /// Returns true for the condition that only stops the current resource.
    #[must_use]
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_maps_known_conditions() {
        assert_eq!(ControlError::from_name("StopExtraction", ""), ControlError::Stop);
        assert_eq!(ControlError::from_name("AbortExtraction", ""), ControlError::Stop);
        assert_eq!(
            ControlError::from_name("TerminateExtraction", ""),
            ControlError::Terminate
        );
        assert_eq!(
            ControlError::from_name("RestartExtraction", ""),
            ControlError::Restart
        );
    }

    #[test]
    fn test_from_name_unknown_is_raised() {
        let error = ControlError::from_name("ValueError", "bad input");
        assert!(!error.is_stop());
        assert_eq!(error.to_string(), "ValueError: bad input");
    }
}
