//! Builder for constructing state transitions.

use crate::core::{Action, Guard, RegionId, StateId, TransitionKind};
use crate::event::{Event, EventId};
use std::fmt;

/// Builder for constructing transitions with a fluent API.
///
/// The firing discipline is chosen by the constructor; triggers, guards and
/// actions are optional. A transition without triggers is evaluated for
/// every event, and one without guards always passes.
pub struct TransitionBuilder {
    pub(crate) kind: TransitionKind,
    pub(crate) source: StateId,
    pub(crate) target: StateId,
    pub(crate) name: Option<String>,
    pub(crate) triggers: Vec<EventId>,
    pub(crate) guards: Vec<Guard>,
    pub(crate) actions: Vec<Action>,
}

impl TransitionBuilder {
    fn new(kind: TransitionKind, source: StateId, target: StateId) -> Self {
        Self {
            kind,
            source,
            target,
            name: None,
            triggers: Vec::new(),
            guards: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Exits `source` up to the common ancestor, then enters `target`.
    pub fn external(source: StateId, target: StateId) -> Self {
        Self::new(TransitionKind::External, source, target)
    }

    /// Re-enters the regions of `source`; `target` must be `source` or one
    /// of its descendants.
    pub fn local(source: StateId, target: StateId) -> Self {
        Self::new(TransitionKind::Local, source, target)
    }

    /// Runs actions without leaving `state`.
    pub fn internal(state: StateId) -> Self {
        Self::new(TransitionKind::Internal, state, state)
    }

    /// Links two fork-joins, optionally marking `region` as waiting on the
    /// target.
    pub fn fork_join(source: StateId, target: StateId, region: Option<RegionId>) -> Self {
        Self::new(TransitionKind::ForkJoinLink { region }, source, target)
    }

    /// Name used in logs and fault reports; defaults to `source->target`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Fire on `event` (or any copy of it).
    pub fn trigger(mut self, event: &Event) -> Self {
        self.triggers.push(event.id());
        self
    }

    pub fn triggers<'a>(mut self, events: impl IntoIterator<Item = &'a Event>) -> Self {
        self.triggers.extend(events.into_iter().map(Event::id));
        self
    }

    /// Add a guard predicate; every guard must pass.
    pub fn guard<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.guards.push(Guard::new(predicate));
        self
    }

    pub fn action<F>(mut self, procedure: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.actions.push(Action::new(procedure));
        self
    }

    /// Add an action whose errors are reported as callback faults.
    pub fn try_action<F, E>(mut self, procedure: F) -> Self
    where
        F: Fn(&Event) -> Result<(), E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        self.actions.push(Action::fallible(procedure));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_pick_the_discipline() {
        let (a, b) = (StateId(1), StateId(2));
        assert_eq!(TransitionBuilder::external(a, b).kind, TransitionKind::External);
        assert_eq!(TransitionBuilder::local(a, b).kind, TransitionKind::Local);

        let internal = TransitionBuilder::internal(a);
        assert_eq!(internal.kind, TransitionKind::Internal);
        assert_eq!(internal.source, internal.target);
    }

    #[test]
    fn fluent_api_collects_parts() {
        let go = Event::new("Go");
        let stop = Event::new("Stop");
        let builder = TransitionBuilder::external(StateId(1), StateId(2))
            .name("launch")
            .trigger(&go)
            .triggers([&stop])
            .guard(|_| true)
            .action(|_| {})
            .try_action(|_| Err::<(), _>("no"));

        assert_eq!(builder.name.as_deref(), Some("launch"));
        assert_eq!(builder.triggers, vec![go.id(), stop.id()]);
        assert_eq!(builder.guards.len(), 1);
        assert_eq!(builder.actions.len(), 2);
    }
}
