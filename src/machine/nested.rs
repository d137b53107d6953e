//! Submachine views over a running state machine.

use super::state_machine::StateMachine;
use crate::core::StateId;
use crate::event::Event;

/// A submachine state seen as a machine of its own.
///
/// Evaluation stays with the top-level machine; events enqueued here are
/// handed to it and reach the submachine's states through normal dispatch.
#[derive(Clone)]
pub struct NestedMachine {
    top: StateMachine,
    state: StateId,
    name: String,
}

impl NestedMachine {
    pub(crate) fn new(top: StateMachine, state: StateId, name: String) -> Self {
        Self { top, state, name }
    }

    /// Name of the submachine state.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The submachine state in the top-level model.
    pub fn state_id(&self) -> StateId {
        self.state
    }

    /// The machine that evaluates this submachine.
    pub fn top(&self) -> &StateMachine {
        &self.top
    }

    /// `true` while the submachine state itself is active.
    pub fn is_active(&self) -> bool {
        self.top.is_active(self.state)
    }

    /// `true` if `state` lies inside this submachine.
    pub fn contains(&self, state: StateId) -> bool {
        self.top.model().is_descendant(state, self.state)
    }

    /// Like [`StateMachine::is_active_named`], but only for states inside
    /// the submachine.
    pub fn is_active_named(&self, name: &str) -> bool {
        self.top
            .state(name)
            .is_some_and(|id| self.contains(id) && self.top.is_active(id))
    }

    /// Active states inside the submachine, in declaration order.
    pub fn active_state_names(&self) -> Vec<String> {
        let model = self.top.model();
        model
            .states()
            .iter()
            .filter(|s| model.is_descendant(s.id(), self.state) && self.top.is_active(s.id()))
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Queue `event` on the top-level machine.
    pub fn enqueue(&self, event: Event) -> bool {
        self.top.enqueue(event)
    }
}
