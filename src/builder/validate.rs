//! Whole-model validation using Validation.
//!
//! Every structural rule is checked independently and ALL findings are
//! accumulated, so a broken model reports every defect at once instead of
//! one per build attempt.

use super::error::ModelError;
use crate::core::{Model, RegionNode, StateId, StateKind, StateNode};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

pub(crate) type ModelCheck = Validation<(), NonEmptyVec<ModelError>>;

fn check(result: Result<(), ModelError>) -> ModelCheck {
    match result {
        Ok(()) => Validation::success(()),
        Err(error) => Validation::fail(error),
    }
}

/// The state a region enters by default.
///
/// An explicit initial pseudostate wins; otherwise the region must hold
/// exactly one state.
pub(crate) fn resolve_initial(model: &Model, region: &RegionNode) -> Result<StateId, ModelError> {
    let substates: Vec<&StateNode> = region.substates.iter().map(|s| model.node(*s)).collect();
    let initials: Vec<&StateNode> = substates
        .iter()
        .copied()
        .filter(|s| s.kind == StateKind::Initial)
        .collect();
    match initials.as_slice() {
        [initial] => return Ok(initial.id),
        [] => {}
        _ => {
            return Err(ModelError::MultipleInitialStates {
                region: region.name.clone(),
            })
        }
    }
    let states: Vec<&StateNode> = substates
        .iter()
        .copied()
        .filter(|s| !s.kind.is_pseudostate())
        .collect();
    match states.as_slice() {
        [only] => Ok(only.id),
        [] => Err(ModelError::EmptyRegion {
            region: region.name.clone(),
        }),
        many => Err(ModelError::MissingInitialState {
            region: region.name.clone(),
            count: many.len(),
        }),
    }
}

fn check_pseudostate(model: &Model, state: &StateNode) -> Result<(), ModelError> {
    let missing_outgoing = || ModelError::PseudostateWithoutTransition {
        state: state.name.clone(),
    };
    match &state.kind {
        StateKind::Initial => {
            if state.outgoing.is_empty() {
                return Err(missing_outgoing());
            }
        }
        StateKind::Choice => {
            if state.outgoing.is_empty() {
                return Err(missing_outgoing());
            }
            let elses = state
                .outgoing
                .iter()
                .filter(|t| model.transition_node(**t).is_else())
                .count();
            if elses > 1 {
                return Err(ModelError::MultipleElseTransitions {
                    state: state.name.clone(),
                    count: elses,
                });
            }
        }
        StateKind::ShallowHistory | StateKind::DeepHistory => {
            if state.region.is_none() {
                return Err(ModelError::MissingParentRegion {
                    state: state.name.clone(),
                });
            }
        }
        StateKind::ForkJoin { .. } => {
            if state.incoming.is_empty() {
                return Err(ModelError::ForkJoinWithoutIncoming {
                    state: state.name.clone(),
                });
            }
            if state.outgoing.is_empty() {
                return Err(missing_outgoing());
            }
        }
        StateKind::Basic | StateKind::Composite { .. } => {}
    }
    Ok(())
}

/// Check every region and pseudostate, accumulating ALL failures.
pub(crate) fn validate_model(model: &Model) -> ModelCheck {
    let mut checks: Vec<ModelCheck> = Vec::new();

    for region in model.regions() {
        checks.push(check(resolve_initial(model, region).map(|_| ())));
    }

    for state in model.states() {
        checks.push(check(check_pseudostate(model, state)));
    }

    Validation::all_vec(checks).map(|_| ())
}

/// Successful validation, or every accumulated error in discovery order.
pub(crate) fn collect_errors(validation: ModelCheck) -> Result<(), Vec<ModelError>> {
    match validation {
        Validation::Success(_) => Ok(()),
        Validation::Failure(errors) => Err(errors.iter().cloned().collect()),
    }
}
