//! Regions: independently active sub-configurations of a composite state.

use super::state::StateId;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub(crate) usize);

impl RegionId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionNode {
    pub(crate) id: RegionId,
    pub(crate) name: String,
    pub(crate) owner: StateId,
    pub(crate) substates: Vec<StateId>,
    /// Resolved when the model is built.
    pub(crate) initial: Option<StateId>,
}

impl RegionNode {
    pub(crate) fn new(id: RegionId, name: String, owner: StateId) -> Self {
        Self {
            id,
            name,
            owner,
            substates: Vec::new(),
            initial: None,
        }
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> StateId {
        self.owner
    }

    pub fn substates(&self) -> &[StateId] {
        &self.substates
    }

    pub fn initial(&self) -> Option<StateId> {
        self.initial
    }
}
