//! State topology nodes.

use super::guard::ActionList;
use super::region::RegionId;
use super::transition::TransitionId;
use std::fmt;

/// Index of a state in its machine's model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub(crate) usize);

impl StateId {
    /// The machine itself; every model has exactly one root.
    pub const ROOT: StateId = StateId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state#{}", self.0)
    }
}

/// What a state is, and the data only that kind of state needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateKind {
    Basic,
    /// Owns one or more regions. `machine` marks the root and nested
    /// state machines.
    Composite {
        regions: Vec<RegionId>,
        machine: bool,
    },
    Initial,
    Choice,
    ShallowHistory,
    DeepHistory,
    /// Synchronization barrier; `owner` is the composite whose regions it joins.
    ForkJoin {
        owner: StateId,
    },
}

impl StateKind {
    /// Transient states that are superseded as soon as they are entered.
    pub fn is_pseudostate(&self) -> bool {
        !matches!(self, Self::Basic | Self::Composite { .. })
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Composite { .. })
    }

    pub fn is_history(&self) -> bool {
        matches!(self, Self::ShallowHistory | Self::DeepHistory)
    }

    pub fn regions(&self) -> &[RegionId] {
        match self {
            Self::Composite { regions, .. } => regions,
            _ => &[],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Basic => "state",
            Self::Composite { machine: true, .. } => "machine",
            Self::Composite { .. } => "composite",
            Self::Initial => "initial",
            Self::Choice => "choice",
            Self::ShallowHistory => "shallow-history",
            Self::DeepHistory => "deep-history",
            Self::ForkJoin { .. } => "fork-join",
        }
    }
}

/// One state of the static topology.
///
/// Outgoing transitions are kept grouped by firing discipline (internal,
/// then local, then external), each group in declaration order.
#[derive(Clone, Debug)]
pub struct StateNode {
    pub(crate) id: StateId,
    pub(crate) name: String,
    pub(crate) region: Option<RegionId>,
    pub(crate) kind: StateKind,
    pub(crate) outgoing: Vec<TransitionId>,
    pub(crate) incoming: Vec<TransitionId>,
    pub(crate) entry: ActionList,
    pub(crate) exit: ActionList,
    pub(crate) log_entry: bool,
}

impl StateNode {
    pub(crate) fn new(id: StateId, name: String, region: Option<RegionId>, kind: StateKind) -> Self {
        Self {
            id,
            name,
            region,
            kind,
            outgoing: Vec::new(),
            incoming: Vec::new(),
            entry: ActionList::new(),
            exit: ActionList::new(),
            log_entry: false,
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning region; `None` for the root and for fork-joins.
    pub fn region(&self) -> Option<RegionId> {
        self.region
    }

    pub fn kind(&self) -> &StateKind {
        &self.kind
    }

    pub fn outgoing(&self) -> &[TransitionId] {
        &self.outgoing
    }

    pub fn incoming(&self) -> &[TransitionId] {
        &self.incoming
    }

    pub fn entry_actions(&self) -> &ActionList {
        &self.entry
    }

    pub fn exit_actions(&self) -> &ActionList {
        &self.exit
    }

    pub fn logs_entry(&self) -> bool {
        self.log_entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudostates_are_classified() {
        assert!(!StateKind::Basic.is_pseudostate());
        assert!(!StateKind::Composite {
            regions: Vec::new(),
            machine: false
        }
        .is_pseudostate());
        for kind in [
            StateKind::Initial,
            StateKind::Choice,
            StateKind::ShallowHistory,
            StateKind::DeepHistory,
            StateKind::ForkJoin { owner: StateId::ROOT },
        ] {
            assert!(kind.is_pseudostate(), "{}", kind.label());
        }
    }

    #[test]
    fn only_composites_have_regions() {
        let composite = StateKind::Composite {
            regions: vec![RegionId(0), RegionId(1)],
            machine: false,
        };
        assert_eq!(composite.regions().len(), 2);
        assert!(StateKind::Basic.regions().is_empty());
    }
}
