//! Runtime configuration: which substate each region currently holds.

use super::model::Model;
use super::region::RegionId;
use super::state::{StateId, StateKind};
use super::transition::TransitionId;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

/// Mutable per-machine state kept beside the immutable [`Model`].
///
/// State active flags live in a separate atomic array so they can be read
/// without taking the machine's runtime lock.
#[derive(Debug)]
pub(crate) struct Configuration {
    pub(crate) entered: bool,
    pub(crate) region_active: Vec<Option<StateId>>,
    pub(crate) region_history: Vec<Option<StateId>>,
    /// Incoming transitions that have arrived at each pending fork-join.
    pub(crate) arrivals: HashMap<StateId, BTreeSet<TransitionId>>,
    /// Regions currently marked as waiting on each fork-join.
    pub(crate) fork_regions: HashMap<StateId, BTreeSet<RegionId>>,
}

impl Configuration {
    pub(crate) fn new(model: &Model) -> Self {
        Self {
            entered: false,
            region_active: vec![None; model.regions.len()],
            region_history: vec![None; model.regions.len()],
            arrivals: HashMap::new(),
            fork_regions: HashMap::new(),
        }
    }

    pub(crate) fn active_in(&self, region: RegionId) -> Option<StateId> {
        self.region_active[region.0]
    }

    pub(crate) fn history_of(&self, region: RegionId) -> Option<StateId> {
        self.region_history[region.0]
    }

    /// Back to the never-entered configuration; history is forgotten too.
    pub(crate) fn clear(&mut self, active: &[AtomicBool]) {
        self.entered = false;
        self.region_active.iter_mut().for_each(|r| *r = None);
        self.region_history.iter_mut().for_each(|r| *r = None);
        self.arrivals.clear();
        self.fork_regions.clear();
        for flag in active {
            flag.store(false, Ordering::SeqCst);
        }
    }

    /// Verify that the active flags describe exactly the paths from the root
    /// to each active leaf. Returns every inconsistency found.
    pub(crate) fn check(&self, model: &Model, active: &[AtomicBool]) -> Result<(), Vec<String>> {
        let is_active = |s: StateId| active[s.0].load(Ordering::SeqCst);
        let mut problems = Vec::new();

        if is_active(StateId::ROOT) != self.entered {
            problems.push(format!(
                "root active flag is {} but entered is {}",
                is_active(StateId::ROOT),
                self.entered
            ));
        }

        for state in model.states() {
            if !is_active(state.id) {
                continue;
            }
            match &state.kind {
                StateKind::ForkJoin { owner } => {
                    if !is_active(*owner) {
                        problems.push(format!(
                            "fork-join '{}' is active but its owner is not",
                            state.name
                        ));
                    }
                    continue;
                }
                kind if kind.is_pseudostate() => {
                    problems.push(format!(
                        "pseudostate '{}' is still active",
                        state.name
                    ));
                    continue;
                }
                _ => {}
            }
            if let Some(region) = state.region {
                if self.active_in(region) != Some(state.id) {
                    problems.push(format!(
                        "'{}' is active but region '{}' does not hold it",
                        state.name,
                        model.region_node(region).name
                    ));
                }
            }
        }

        for region in model.regions() {
            let owner_active = is_active(region.owner);
            match self.active_in(region.id) {
                None if owner_active => problems.push(format!(
                    "region '{}' of active '{}' holds no substate",
                    region.name,
                    model.node(region.owner).name
                )),
                Some(held) if !owner_active => problems.push(format!(
                    "region '{}' of inactive '{}' still holds '{}'",
                    region.name,
                    model.node(region.owner).name,
                    model.node(held).name
                )),
                Some(held) if !is_active(held) => problems.push(format!(
                    "region '{}' holds inactive '{}'",
                    region.name,
                    model.node(held).name
                )),
                _ => {}
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}
