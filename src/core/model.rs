//! The static topology of one state machine.

use super::region::{RegionId, RegionNode};
use super::state::{StateId, StateKind, StateNode};
use super::transition::{TransitionId, TransitionKind, TransitionNode};
use crate::builder::ModelError;

/// Arena of states, regions and transitions.
///
/// Nodes refer to each other by index. The root is always
/// [`StateId::ROOT`]; a node's parent is the owner of its region, or for a
/// fork-join the composite it joins.
#[derive(Clone, Debug)]
pub struct Model {
    pub(crate) name: String,
    pub(crate) states: Vec<StateNode>,
    pub(crate) regions: Vec<RegionNode>,
    pub(crate) transitions: Vec<TransitionNode>,
}

impl Model {
    pub(crate) fn new(name: String) -> Self {
        let root = StateNode::new(
            StateId::ROOT,
            name.clone(),
            None,
            StateKind::Composite {
                regions: Vec::new(),
                machine: true,
            },
        );
        Self {
            name,
            states: vec![root],
            regions: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> StateId {
        StateId::ROOT
    }

    pub fn state(&self, id: StateId) -> Option<&StateNode> {
        self.states.get(id.0)
    }

    pub fn region(&self, id: RegionId) -> Option<&RegionNode> {
        self.regions.get(id.0)
    }

    pub fn transition(&self, id: TransitionId) -> Option<&TransitionNode> {
        self.transitions.get(id.0)
    }

    pub fn states(&self) -> &[StateNode] {
        &self.states
    }

    pub fn regions(&self) -> &[RegionNode] {
        &self.regions
    }

    pub fn transitions(&self) -> &[TransitionNode] {
        &self.transitions
    }

    pub fn find(&self, name: &str) -> Option<StateId> {
        self.states.iter().find(|s| s.name == name).map(|s| s.id)
    }

    pub fn find_region(&self, name: &str) -> Option<RegionId> {
        self.regions.iter().find(|r| r.name == name).map(|r| r.id)
    }

    // Ids handed out by this model; callers validate foreign ids first.
    pub(crate) fn node(&self, id: StateId) -> &StateNode {
        &self.states[id.0]
    }

    pub(crate) fn region_node(&self, id: RegionId) -> &RegionNode {
        &self.regions[id.0]
    }

    pub(crate) fn transition_node(&self, id: TransitionId) -> &TransitionNode {
        &self.transitions[id.0]
    }

    pub(crate) fn require_state(&self, id: StateId) -> Result<&StateNode, ModelError> {
        self.state(id).ok_or(ModelError::UnknownState(id))
    }

    pub(crate) fn require_transition(&self, id: TransitionId) -> Result<&TransitionNode, ModelError> {
        self.transition(id).ok_or(ModelError::UnknownTransition(id))
    }

    pub fn parent(&self, id: StateId) -> Option<StateId> {
        let node = self.state(id)?;
        match (node.region, &node.kind) {
            (Some(region), _) => Some(self.region_node(region).owner),
            (None, StateKind::ForkJoin { owner }) => Some(*owner),
            (None, _) => None,
        }
    }

    /// Proper ancestors, nearest first.
    pub fn ancestors(&self, id: StateId) -> Vec<StateId> {
        let mut ancestors = Vec::new();
        let mut current = self.parent(id);
        while let Some(state) = current {
            ancestors.push(state);
            current = self.parent(state);
        }
        ancestors
    }

    /// `true` if `state` is nested (at any depth) inside `ancestor`.
    pub fn is_descendant(&self, state: StateId, ancestor: StateId) -> bool {
        let mut current = self.parent(state);
        while let Some(s) = current {
            if s == ancestor {
                return true;
            }
            current = self.parent(s);
        }
        false
    }

    /// Least common ancestor for an external transition: the innermost
    /// proper ancestor of `source` that is also a proper ancestor of
    /// `target`.
    pub fn lca(&self, source: StateId, target: StateId) -> StateId {
        self.ancestors(source)
            .into_iter()
            .find(|a| self.is_descendant(target, *a))
            .unwrap_or(StateId::ROOT)
    }

    /// The direct child of `ancestor` on the way down to `state`.
    pub fn child_toward(&self, ancestor: StateId, state: StateId) -> Option<StateId> {
        let mut current = state;
        loop {
            let parent = self.parent(current)?;
            if parent == ancestor {
                return Some(current);
            }
            current = parent;
        }
    }

    /// States strictly below `ancestor` down to and including `state`,
    /// outermost first.
    pub fn path_from(&self, ancestor: StateId, state: StateId) -> Vec<StateId> {
        let mut path = vec![state];
        let mut current = state;
        while let Some(parent) = self.parent(current) {
            if parent == ancestor {
                break;
            }
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// The region of `owner` that contains `state`, if any.
    pub(crate) fn originating_region(&self, state: StateId, owner: StateId) -> Option<RegionId> {
        let mut current = state;
        loop {
            let region = self.state(current)?.region?;
            let region_owner = self.region_node(region).owner;
            if region_owner == owner {
                return Some(region);
            }
            current = region_owner;
        }
    }

    /// Register `transition` on its source (kept grouped by rank) and target.
    pub(crate) fn attach(&mut self, transition: TransitionId) {
        let (source, target, rank) = {
            let t = self.transition_node(transition);
            (t.source, t.target, t.kind.rank())
        };
        let insert_at = {
            let outgoing = &self.states[source.0].outgoing;
            outgoing
                .iter()
                .position(|other| self.transitions[other.0].kind.rank() > rank)
                .unwrap_or(outgoing.len())
        };
        self.states[source.0].outgoing.insert(insert_at, transition);
        let incoming = &mut self.states[target.0].incoming;
        if !incoming.contains(&transition) {
            incoming.push(transition);
        }
    }

    pub(crate) fn detach(&mut self, transition: TransitionId) {
        let (source, target) = {
            let t = self.transition_node(transition);
            (t.source, t.target)
        };
        self.states[source.0].outgoing.retain(|t| *t != transition);
        self.states[target.0].incoming.retain(|t| *t != transition);
    }

    /// Structural rules a single transition must satisfy on its own.
    pub(crate) fn check_transition(
        &self,
        name: &str,
        kind: TransitionKind,
        source: StateId,
        target: StateId,
        triggered: bool,
        guarded: bool,
    ) -> Result<(), ModelError> {
        let source_node = self.require_state(source)?;
        let target_node = self.require_state(target)?;

        if source == target && !triggered && !guarded {
            return Err(ModelError::InvalidSelfTransition {
                state: source_node.name.clone(),
            });
        }

        match kind {
            TransitionKind::Internal => {
                if source != target {
                    return Err(ModelError::InvalidLocalTarget {
                        from: source_node.name.clone(),
                        to: target_node.name.clone(),
                    });
                }
            }
            TransitionKind::Local => {
                if source != target && !self.is_descendant(target, source) {
                    return Err(ModelError::InvalidLocalTarget {
                        from: source_node.name.clone(),
                        to: target_node.name.clone(),
                    });
                }
            }
            TransitionKind::External => {
                if source == StateId::ROOT || target == StateId::ROOT {
                    return Err(ModelError::RootTransition {
                        transition: name.to_string(),
                    });
                }
            }
            TransitionKind::ForkJoinLink { region } => {
                let (StateKind::ForkJoin { .. }, StateKind::ForkJoin { owner }) =
                    (&source_node.kind, &target_node.kind)
                else {
                    return Err(ModelError::InvalidForkJoinLink {
                        transition: name.to_string(),
                    });
                };
                if let Some(region) = region {
                    let region = self.region(region).ok_or(ModelError::UnknownRegion(region))?;
                    if region.owner != *owner {
                        return Err(ModelError::InvalidForkJoinLink {
                            transition: name.to_string(),
                        });
                    }
                }
            }
        }

        if matches!(source_node.kind, StateKind::ForkJoin { .. }) {
            if triggered {
                return Err(ModelError::TriggeredForkJoinOutgoing {
                    state: source_node.name.clone(),
                    transition: name.to_string(),
                });
            }
            if guarded {
                return Err(ModelError::GuardedForkJoinOutgoing {
                    state: source_node.name.clone(),
                    transition: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{StateMachineBuilder, TransitionBuilder};
    use crate::event::Event;

    struct Fixture {
        model: Model,
        a: StateId,
        a1: StateId,
        a2: StateId,
        a2x: StateId,
        b: StateId,
    }

    // root { A { A1, A2 { A2x } }, B }
    fn fixture() -> Fixture {
        let mut builder = StateMachineBuilder::new("tree");
        let root = builder.root();
        let init = builder.initial("Init", root).unwrap();
        let a = builder.state("A", root).unwrap();
        let b = builder.state("B", root).unwrap();
        let a_init = builder.initial("AInit", a).unwrap();
        let a1 = builder.state("A1", a).unwrap();
        let a2 = builder.state("A2", a).unwrap();
        let a2x = builder.state("A2x", a2).unwrap();
        builder.transition(TransitionBuilder::external(init, a)).unwrap();
        builder.transition(TransitionBuilder::external(a_init, a1)).unwrap();
        let model = builder.into_model().unwrap();
        Fixture {
            model,
            a,
            a1,
            a2,
            a2x,
            b,
        }
    }

    #[test]
    fn ancestors_walk_to_the_root() {
        let f = fixture();
        assert_eq!(f.model.ancestors(f.a2x), vec![f.a2, f.a, StateId::ROOT]);
        assert_eq!(f.model.parent(StateId::ROOT), None);
        assert!(f.model.is_descendant(f.a2x, f.a));
        assert!(!f.model.is_descendant(f.a, f.a));
    }

    #[test]
    fn lca_is_a_proper_ancestor_of_both() {
        let f = fixture();
        assert_eq!(f.model.lca(f.a1, f.a2x), f.a);
        assert_eq!(f.model.lca(f.a1, f.b), StateId::ROOT);
        // Self and ancestor targets leave the source's parent as the common ancestor.
        assert_eq!(f.model.lca(f.a1, f.a1), f.a);
        assert_eq!(f.model.lca(f.a2x, f.a), StateId::ROOT);
    }

    #[test]
    fn paths_and_children() {
        let f = fixture();
        assert_eq!(f.model.path_from(StateId::ROOT, f.a2x), vec![f.a, f.a2, f.a2x]);
        assert_eq!(f.model.path_from(f.a, f.a2x), vec![f.a2, f.a2x]);
        assert_eq!(f.model.child_toward(StateId::ROOT, f.a2x), Some(f.a));
        assert_eq!(f.model.child_toward(f.a2x, f.a2x), None);
    }

    #[test]
    fn outgoing_is_grouped_by_rank() {
        let mut builder = StateMachineBuilder::new("ranks");
        let root = builder.root();
        let s = builder.state("S", root).unwrap();
        let inner = builder.state("Inner", s).unwrap();
        let other = builder.state("Other", root).unwrap();
        let init = builder.initial("Init", root).unwrap();
        builder.transition(TransitionBuilder::external(init, s)).unwrap();
        let go = Event::new("Go");
        let external = builder
            .transition(TransitionBuilder::external(s, other).trigger(&go))
            .unwrap();
        let local = builder
            .transition(TransitionBuilder::local(s, inner).trigger(&go))
            .unwrap();
        let internal = builder
            .transition(TransitionBuilder::internal(s).trigger(&go))
            .unwrap();
        let model = builder.into_model().unwrap();

        assert_eq!(model.node(s).outgoing(), &[internal, local, external]);
        assert!(model.node(other).incoming().contains(&external));
    }

    #[test]
    fn originating_region_climbs_to_the_owner() {
        let f = fixture();
        let region_a = f.model.node(f.a1).region().unwrap();
        assert_eq!(f.model.originating_region(f.a2x, f.a), Some(region_a));
        assert_eq!(f.model.originating_region(f.b, f.a), None);
    }
}
