//! Errors and Warnings
//!
//! The store distinguishes between two kinds of problems:
//!
//! - [`Error`]: returned to the caller. Computed getters and setters return
//!   `Result`, and their failures travel back unchanged to whoever triggered
//!   the evaluation.
//!
//! - [`Issue`]: non-fatal protocol problems (assigning to a getter, a computed
//!   that failed while refreshing). These are logged through `tracing` and the
//!   operation carries on.
//!
//! Every message names the model type and the key involved.

use thiserror::Error;

/// Errors surfaced by the reactive store.
#[derive(Debug, Error)]
pub enum Error {
    /// User code (a computed getter, a setter, an effect) reported a failure.
    #[error("{0}")]
    Failed(String),

    /// `expect_update` was called with an expectation that does not match
    /// the current batching state.
    #[error("{}", strict_update(.expected))]
    StrictUpdate { expected: bool },

    /// An effect callback returned a value which is neither nothing nor a
    /// cleanup function.
    #[error("effect callback returned a value which is not a cleanup function")]
    BadEffectCallback,

    /// The store was dropped before the awaited frame completed.
    #[error("store was dropped before the awaited frame completed")]
    FrameDropped,

    /// No class is registered under the requested name.
    #[error("no class named `{0}` is registered")]
    UnknownClass(String),

    /// A tokio scheduler was requested outside of a runtime.
    #[error("no tokio runtime is available to schedule frames on")]
    NoRuntime,
}

impl Error {
    /// Create a failure from any displayable message.
    pub fn failed(message: impl std::fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }
}

fn strict_update(expected: &bool) -> &'static str {
    if *expected {
        "expected a frame to be pending, but there is none"
    } else {
        "expected no frame to be pending, but there is one"
    }
}

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Non-fatal problems, reported as warnings.
#[derive(Debug, Error)]
pub(crate) enum Issue {
    #[error("an error was returned while {phase} computed {model}.{key}: {cause}")]
    ComputeFailed {
        model: String,
        key: String,
        phase: &'static str,
        cause: String,
    },

    #[error("note: computed {model}.{key} was evaluated early because a listener subscribed to it before first access")]
    ComputedEarly { model: String, key: String },

    #[error("cannot assign to {model}.{key}: it is a computed property without a setter")]
    AssignToGetter { model: String, key: String },
}

impl Issue {
    pub(crate) fn compute_failed(model: &str, key: &str, initial: bool, cause: &Error) -> Self {
        Self::ComputeFailed {
            model: model.to_owned(),
            key: key.to_owned(),
            phase: if initial { "initializing" } else { "refreshing" },
            cause: cause.to_string(),
        }
    }

    pub(crate) fn computed_early(model: &str, key: &str) -> Self {
        Self::ComputedEarly {
            model: model.to_owned(),
            key: key.to_owned(),
        }
    }

    pub(crate) fn assign_to_getter(model: &str, key: &str) -> Self {
        Self::AssignToGetter {
            model: model.to_owned(),
            key: key.to_owned(),
        }
    }

    /// Log this issue as a warning.
    pub(crate) fn warn(&self) {
        tracing::warn!("{}", self);
    }
}
