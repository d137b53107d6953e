//! Errors for state machine construction and ill-formed models.

use crate::core::{RegionId, StateId, TransitionId};
use thiserror::Error;

/// A structural defect in a state machine model.
///
/// Raised while building, while rerouting, or at evaluation time when a
/// pseudostate cannot be resolved.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Unknown state {0}")]
    UnknownState(StateId),

    #[error("Unknown region {0}")]
    UnknownRegion(RegionId),

    #[error("Unknown transition {0}")]
    UnknownTransition(TransitionId),

    #[error("State name '{0}' is already in use")]
    DuplicateStateName(String),

    #[error("'{state}' is a pseudostate and cannot own substates")]
    InvalidParent { state: String },

    #[error("Region '{region}' has more than one initial pseudostate")]
    MultipleInitialStates { region: String },

    #[error("Region '{region}' has {count} substates but no initial pseudostate")]
    MissingInitialState { region: String, count: usize },

    #[error("Region '{region}' has no substates")]
    EmptyRegion { region: String },

    #[error("Self transition on '{state}' has neither trigger nor guard")]
    InvalidSelfTransition { state: String },

    #[error("Transition target '{to}' is not '{from}' or one of its descendants")]
    InvalidLocalTarget { from: String, to: String },

    #[error("External transition '{transition}' cannot leave or enter the machine root")]
    RootTransition { transition: String },

    #[error("'{transition}' must link two fork-joins, marking a region of the target's owner")]
    InvalidForkJoinLink { transition: String },

    #[error("Outgoing transition '{transition}' of fork-join '{state}' has triggers")]
    TriggeredForkJoinOutgoing { state: String, transition: String },

    #[error("Outgoing transition '{transition}' of fork-join '{state}' has guards")]
    GuardedForkJoinOutgoing { state: String, transition: String },

    #[error("Fork-join '{state}' has no incoming transitions")]
    ForkJoinWithoutIncoming { state: String },

    #[error("Pseudostate '{state}' has no outgoing transition")]
    PseudostateWithoutTransition { state: String },

    #[error("Choice '{state}' has {count} else transitions")]
    MultipleElseTransitions { state: String, count: usize },

    #[error("No transition taken from choice '{state}'")]
    NoChoiceTransition { state: String },

    #[error("'{state}' has no parent region")]
    MissingParentRegion { state: String },

    #[error("State machine '{machine}' must be stopped to change its structure")]
    MachineRunning { machine: String },
}

/// Errors that can occur when building a state machine.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("State machine '{machine}' is ill-formed ({} errors): {}", .errors.len(), summary(.errors))]
    IllFormed {
        machine: String,
        errors: Vec<ModelError>,
    },

    #[error("Event thread '{0}' is not running")]
    ThreadTerminated(String),
}

fn summary(errors: &[ModelError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl BuildError {
    /// The model errors behind an ill-formed build, if any.
    pub fn model_errors(&self) -> &[ModelError] {
        match self {
            Self::IllFormed { errors, .. } => errors,
            Self::ThreadTerminated(_) => &[],
        }
    }
}
