//! Action hooks attached to log events.
//!
//! Every log call made while downloading goes through a [`JobLogger`]. The
//! logger consults an [`ActionRegistry`] built from the `output.actions`
//! configuration, runs the matching "before" actions against an explicit
//! [`JobContext`], emits the event through `tracing`, and then runs the
//! matching "after" actions, which may raise a [`ControlError`].
//!
//! [`Flags`] carry cooperative stop requests from actions to running jobs.
//! Actions bound to process signals through `output.signals` reach running
//! jobs only through these flags.

mod error;
mod flags;
mod logger;
mod registry;
mod signals;

pub use error::ControlError;
pub use flags::{FlagKind, Flags};
pub use logger::{JobContext, JobLogger, Level};
pub use registry::{
    Action, ActionRegistry, ActionSpecError, CallContext, SignalBinding, StatusOp,
    signal_bindings,
};
#[cfg(unix)]
pub use signals::SignalListener;
pub use signals::dispatch as dispatch_signal;
