//! Cooperative flags set by action hooks and polled by running jobs.

use std::str::FromStr;
use std::sync::Mutex;

use super::ControlError;

/// Which stage a flag interrupts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    /// Checked by the orchestrator before each file.
    File,
    /// Checked by the receiver once per chunk.
    Download,
}

impl FromStr for FlagKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "download" => Ok(Self::Download),
            other => Err(format!("unknown flag '{other}'")),
        }
    }
}

/// Process-wide flag set, shared between jobs through an `Arc`.
#[derive(Debug, Default)]
pub struct Flags {
    file: Mutex<Option<String>>,
    download: Mutex<Option<String>>,
}

impl Flags {
    /// Creates an empty flag set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: FlagKind) -> &Mutex<Option<String>> {
        match kind {
            FlagKind::File => &self.file,
            FlagKind::Download => &self.download,
        }
    }

    /// Sets `kind` to `value`.
    pub fn set(&self, kind: FlagKind, value: impl Into<String>) {
        let mut slot = self
            .slot(kind)
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = Some(value.into());
    }

    /// Returns true when `kind` is set.
    #[must_use]
    pub fn is_set(&self, kind: FlagKind) -> bool {
        self.slot(kind)
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some()
    }

    /// Clears `kind` and returns its previous value.
    pub fn take(&self, kind: FlagKind) -> Option<String> {
        self.slot(kind)
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }

    /// Consumes a set flag and converts it into the control condition it requests.
    ///
    /// Returns `Ok(())` when the flag is not set.
    ///
    /// # Errors
    ///
    /// `terminate` and `restart` map to their conditions; any other value stops
    /// the current resource.
    pub fn process(&self, kind: FlagKind) -> Result<(), ControlError> {
        match self.take(kind).as_deref() {
            None => Ok(()),
            Some("terminate") => Err(ControlError::Terminate),
            Some("restart") => Err(ControlError::Restart),
            Some(_) => Err(ControlError::Stop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_flag_processes_cleanly() {
        let flags = Flags::new();
        assert!(flags.process(FlagKind::Download).is_ok());
    }

    #[test]
    fn test_process_consumes_flag() {
        let flags = Flags::new();
        flags.set(FlagKind::Download, "stop");
        assert!(flags.is_set(FlagKind::Download));
        assert_eq!(flags.process(FlagKind::Download), Err(ControlError::Stop));
        assert!(!flags.is_set(FlagKind::Download));
        assert!(flags.process(FlagKind::Download).is_ok());
    }

    #[test]
    fn test_process_maps_terminate_and_restart() {
        let flags = Flags::new();
        flags.set(FlagKind::Download, "terminate");
        assert_eq!(flags.process(FlagKind::Download), Err(ControlError::Terminate));
        flags.set(FlagKind::Download, "restart");
        assert_eq!(flags.process(FlagKind::Download), Err(ControlError::Restart));
    }

    #[test]
    fn test_flags_are_independent() {
        let flags = Flags::new();
        flags.set(FlagKind::File, "stop");
        assert!(!flags.is_set(FlagKind::Download));
        assert!(flags.is_set(FlagKind::File));
    }

    #[test]
    fn test_flag_kind_parse() {
        assert_eq!("DOWNLOAD".parse::<FlagKind>(), Ok(FlagKind::Download));
        assert!("other".parse::<FlagKind>().is_err());
        assert!("post".parse::<FlagKind>().is_err());
    }
}
