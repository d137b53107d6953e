//! Core state machine types.
//!
//! This module contains the static topology of a state machine and the
//! user callbacks attached to it:
//! - [`Model`]: an arena of states, regions and transitions addressed by id
//! - [`StateKind`] and [`TransitionKind`]: the closed set of state and
//!   transition variants, dispatched by pattern matching
//! - [`Guard`] and [`Action`] delegates held in [`DelegateList`]s
//!
//! The topology never changes while a machine runs; the runtime
//! configuration (active substates, history, fork-join arrivals) is kept
//! separately by the machine.

mod configuration;
mod guard;
mod model;
mod region;
mod state;
mod transition;

pub(crate) use configuration::Configuration;
pub use guard::{Action, ActionList, DelegateId, DelegateList, Guard, GuardList};
pub use model::Model;
pub use region::{RegionId, RegionNode};
pub use state::{StateId, StateKind, StateNode};
pub use transition::{TransitionId, TransitionKind, TransitionNode};
