//! Transition nodes and their firing disciplines.

use super::guard::{ActionList, GuardList};
use super::region::RegionId;
use super::state::StateId;
use crate::event::EventId;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionId(pub(crate) usize);

impl TransitionId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transition#{}", self.0)
    }
}

/// How a transition changes the configuration when it fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    /// Actions only; the source is neither exited nor re-entered.
    Internal,
    /// Exits and re-enters the source's regions, never the source itself.
    Local,
    /// Exits up to the least common ancestor, then enters the target.
    External,
    /// Fork-join to fork-join link, optionally marking a region of the
    /// target's owner as waiting on the target.
    ForkJoinLink { region: Option<RegionId> },
}

impl TransitionKind {
    /// Evaluation order on a state: internal, then local, then external.
    pub fn rank(self) -> u8 {
        match self {
            Self::Internal => 0,
            Self::Local => 1,
            Self::External | Self::ForkJoinLink { .. } => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Local => "local",
            Self::External => "external",
            Self::ForkJoinLink { .. } => "fork-join-link",
        }
    }
}

#[derive(Clone, Debug)]
pub struct TransitionNode {
    pub(crate) id: TransitionId,
    pub(crate) name: String,
    pub(crate) kind: TransitionKind,
    pub(crate) source: StateId,
    pub(crate) target: StateId,
    pub(crate) triggers: Vec<EventId>,
    pub(crate) guards: GuardList,
    pub(crate) actions: ActionList,
}

impl TransitionNode {
    pub fn id(&self) -> TransitionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TransitionKind {
        self.kind
    }

    pub fn source(&self) -> StateId {
        self.source
    }

    pub fn target(&self) -> StateId {
        self.target
    }

    pub fn triggers(&self) -> &[EventId] {
        &self.triggers
    }

    pub fn guards(&self) -> &GuardList {
        &self.guards
    }

    pub fn actions(&self) -> &ActionList {
        &self.actions
    }

    /// Evaluated for every event, including run-to-completion passes.
    pub fn is_completion(&self) -> bool {
        self.triggers.is_empty()
    }

    /// `true` if `event` is one of the triggers, or there are none.
    pub fn is_triggered_by(&self, event: EventId) -> bool {
        self.triggers.is_empty() || self.triggers.contains(&event)
    }

    /// An unguarded outgoing transition of a choice.
    pub fn is_else(&self) -> bool {
        self.guards.is_empty()
    }
}
