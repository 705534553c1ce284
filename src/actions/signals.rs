//! Process signals bound to actions through `output.signals`.
//!
//! A signal arrives outside any log event and outside any job, so its actions
//! can only reach the shared [`Flags`]. `flag` actions set them directly;
//! `abort`, `terminate`, `restart` and `raise` set the download flag, which
//! the running download consumes at its next chunk. `level` and `status`
//! actions have nothing to act on and are skipped.

use tracing::debug;

use super::registry::{Action, run_after_action};
use super::{ControlError, FlagKind, Flags};

#[cfg(unix)]
pub use listener::SignalListener;

/// Runs the actions bound to a received signal against `flags`.
///
/// A control condition raised by an action ends the chain.
///
/// # Errors
///
/// Returns [`ControlError::Exit`] when an `exit` action asks for the process
/// to end; every other condition is turned into a download flag.
pub async fn dispatch(actions: &[Action], flags: &Flags) -> Result<(), ControlError> {
    for action in actions {
        match action {
            Action::Flag { kind, value } => flags.set(*kind, value.clone()),
            Action::SetLevel(_) | Action::Status { .. } => {
                debug!(?action, "action has no effect on a signal");
            }
            _ => match run_after_action(action).await {
                Ok(()) => {}
                Err(ControlError::Exit(code)) => return Err(ControlError::Exit(code)),
                Err(control) => {
                    debug!(%control, "signal action stops the running download");
                    flags.set(FlagKind::Download, flag_value(&control));
                    return Ok(());
                }
            },
        }
    }
    Ok(())
}

fn flag_value(control: &ControlError) -> &'static str {
    match control {
        ControlError::Terminate => "terminate",
        ControlError::Restart => "restart",
        _ => "stop",
    }
}

#[cfg(unix)]
mod listener {
    use std::sync::Arc;

    use tokio::signal::unix::{Signal, SignalKind, signal};
    use tracing::{debug, warn};

    use super::{ControlError, Flags, dispatch};
    use crate::actions::registry::SignalBinding;

    fn signal_kind(name: &str) -> Option<SignalKind> {
        let kind = match name {
            "SIGALRM" => SignalKind::alarm(),
            "SIGCHLD" => SignalKind::child(),
            "SIGHUP" => SignalKind::hangup(),
            "SIGINT" => SignalKind::interrupt(),
            "SIGIO" => SignalKind::io(),
            "SIGPIPE" => SignalKind::pipe(),
            "SIGQUIT" => SignalKind::quit(),
            "SIGTERM" => SignalKind::terminate(),
            "SIGUSR1" => SignalKind::user_defined1(),
            "SIGUSR2" => SignalKind::user_defined2(),
            "SIGWINCH" => SignalKind::window_change(),
            _ => return None,
        };
        Some(kind)
    }

    /// A signal handler installed for one [`SignalBinding`].
    #[derive(Debug)]
    pub struct SignalListener {
        binding: SignalBinding,
        stream: Signal,
    }

    impl SignalListener {
        /// Installs the handler for `binding`.
        ///
        /// Logs a warning and returns `None` for names that are not signals
        /// on this platform or when the handler cannot be registered.
        #[must_use]
        pub fn install(binding: SignalBinding) -> Option<Self> {
            let Some(kind) = signal_kind(&binding.name) else {
                warn!("signal '{}' is not defined", binding.name);
                return None;
            };
            match signal(kind) {
                Ok(stream) => Some(Self { binding, stream }),
                Err(error) => {
                    warn!(signal = %binding.name, %error, "failed to install signal handler");
                    None
                }
            }
        }

        /// Runs the bound actions for every delivery of the signal.
        ///
        /// Returns the exit code once an `exit` action fires, or `None` when
        /// the signal stream closes.
        pub async fn run(mut self, flags: Arc<Flags>) -> Option<i32> {
            while self.stream.recv().await.is_some() {
                debug!(signal = %self.binding.name, "signal received");
                if let Err(ControlError::Exit(code)) =
                    dispatch(&self.binding.actions, &flags).await
                {
                    return Some(code);
                }
            }
            None
        }
    }

}
