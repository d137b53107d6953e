//! Fault taxonomy and the process-wide exception channel.
//!
//! Every catch site in the runtime converts what it caught into a [`Fault`]
//! and hands it to a [`FaultReporter`]. State machines report to their own
//! fault actions first and then to the [`FaultChannel`] owned by the
//! application context.

mod channel;

pub use channel::{FaultChannel, FaultHandler};

use crate::builder::ModelError;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use thiserror::Error;

/// Which kind of user callback failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Guard,
    Action,
    Entry,
    Exit,
    TimerCallback,
    LimitAction,
    FaultHandler,
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Guard => "guard",
            Self::Action => "action",
            Self::Entry => "entry action",
            Self::Exit => "exit action",
            Self::TimerCallback => "timer callback",
            Self::LimitAction => "limit action",
            Self::FaultHandler => "fault handler",
        };
        f.write_str(name)
    }
}

/// Error returned by a fallible action.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Everything observable on the exception channel.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Fault {
    #[error("{kind} failed in '{origin}': {message}")]
    Callback {
        kind: CallbackKind,
        origin: String,
        message: String,
    },

    #[error("handler '{handler}' panicked while handling event '{event}': {message}")]
    Dispatch {
        handler: String,
        event: String,
        message: String,
    },

    #[error("state machine '{machine}' is ill-formed: {error}")]
    IllFormed { machine: String, error: ModelError },

    #[error("state machine '{machine}' reached its consecutive transition limit ({limit})")]
    LoopLimit { machine: String, limit: usize },

    #[error("state machine '{machine}' reached its queued event limit ({limit})")]
    EventLimit { machine: String, limit: usize },

    #[error("'{name}' failed to terminate within {timeout:?}")]
    TerminateTimeout { name: String, timeout: Duration },
}

impl Fault {
    /// Short machine-readable label, used as the trace tag.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Callback { .. } => "callback",
            Self::Dispatch { .. } => "dispatch",
            Self::IllFormed { .. } => "ill-formed",
            Self::LoopLimit { .. } => "loop-limit",
            Self::EventLimit { .. } => "event-limit",
            Self::TerminateTimeout { .. } => "terminate-timeout",
        }
    }
}

/// Anything that accepts faults.
pub trait FaultReporter: Send + Sync {
    fn report(&self, fault: Fault);
}

/// Run `f`, converting a panic into its message.
pub(crate) fn isolate<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
