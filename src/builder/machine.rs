//! Builder for constructing state machines.

use crate::builder::error::{BuildError, ModelError};
use crate::builder::transition::TransitionBuilder;
use crate::builder::validate::{collect_errors, resolve_initial, validate_model};
use crate::context::AppContext;
use crate::core::{
    Action, ActionList, DelegateId, GuardList, Model, RegionId, RegionNode, StateId, StateKind,
    StateNode, TransitionId, TransitionNode,
};
use crate::event::{Event, EventThread};
use crate::machine::{MachineLimits, StateMachine};
use std::sync::Arc;

/// Where a new state is placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parent {
    /// The state's default region, created on first use.
    State(StateId),
    Region(RegionId),
}

impl From<StateId> for Parent {
    fn from(state: StateId) -> Self {
        Parent::State(state)
    }
}

impl From<RegionId> for Parent {
    fn from(region: RegionId) -> Self {
        Parent::Region(region)
    }
}

/// Builder for a state machine's topology.
///
/// Structural edits return ids used to wire transitions. Local defects
/// (unknown ids, duplicate names, invalid self or local transitions) fail
/// the edit immediately; whole-model rules are checked together by
/// [`validate`](Self::validate) and [`build`](Self::build).
///
/// # Example
///
/// ```rust,no_run
/// use statecraft::builder::{StateMachineBuilder, TransitionBuilder};
/// use statecraft::context::AppContext;
/// use statecraft::event::Event;
///
/// let ctx = AppContext::with_defaults().unwrap();
/// let thread = ctx.event_thread("lights").unwrap();
/// let next = Event::new("Next");
///
/// let mut builder = StateMachineBuilder::new("traffic");
/// let root = builder.root();
/// let red = builder.state("Red", root).unwrap();
/// let green = builder.state("Green", root).unwrap();
/// let init = builder.initial("Init", root).unwrap();
/// builder.transition(TransitionBuilder::external(init, red)).unwrap();
/// builder.transition(TransitionBuilder::external(red, green).trigger(&next)).unwrap();
/// builder.transition(TransitionBuilder::external(green, red).trigger(&next)).unwrap();
///
/// let machine = builder.build(&ctx, &thread).unwrap();
/// machine.start();
/// machine.enqueue(next.clone());
/// ```
pub struct StateMachineBuilder {
    pub(crate) model: Model,
    limits: MachineLimits,
    trace: bool,
}

impl StateMachineBuilder {
    /// Create a new builder; the machine itself is the root state.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            model: Model::new(name.into()),
            limits: MachineLimits::default(),
            trace: false,
        }
    }

    pub fn root(&self) -> StateId {
        StateId::ROOT
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn find(&self, name: &str) -> Option<StateId> {
        self.model.find(name)
    }

    /// Add an explicit (orthogonal) region to `owner`.
    pub fn region(&mut self, name: impl Into<String>, owner: StateId) -> Result<RegionId, ModelError> {
        let owner_node = self.model.require_state(owner)?;
        if owner_node.kind.is_pseudostate() {
            return Err(ModelError::InvalidParent {
                state: owner_node.name.clone(),
            });
        }
        let id = RegionId(self.model.regions.len());
        self.model
            .regions
            .push(RegionNode::new(id, name.into(), owner));
        let node = &mut self.model.states[owner.0];
        match &mut node.kind {
            StateKind::Composite { regions, .. } => regions.push(id),
            kind => {
                *kind = StateKind::Composite {
                    regions: vec![id],
                    machine: false,
                }
            }
        }
        Ok(id)
    }

    fn resolve_parent(&mut self, parent: Parent) -> Result<RegionId, ModelError> {
        match parent {
            Parent::Region(region) => {
                self.model
                    .region(region)
                    .ok_or(ModelError::UnknownRegion(region))?;
                Ok(region)
            }
            Parent::State(state) => {
                let node = self.model.require_state(state)?;
                if let Some(region) = node.kind.regions().first().copied() {
                    return Ok(region);
                }
                let name = format!("{}.region", node.name);
                self.region(name, state)
            }
        }
    }

    fn add_state(
        &mut self,
        name: impl Into<String>,
        parent: Option<Parent>,
        kind: StateKind,
    ) -> Result<StateId, ModelError> {
        let name = name.into();
        if self.model.find(&name).is_some() {
            return Err(ModelError::DuplicateStateName(name));
        }
        let region = match parent {
            Some(parent) => Some(self.resolve_parent(parent)?),
            None => None,
        };
        let id = StateId(self.model.states.len());
        self.model
            .states
            .push(StateNode::new(id, name, region, kind));
        if let Some(region) = region {
            self.model.regions[region.0].substates.push(id);
        }
        Ok(id)
    }

    /// Add a state; adding substates to it later makes it composite.
    pub fn state(&mut self, name: impl Into<String>, parent: impl Into<Parent>) -> Result<StateId, ModelError> {
        self.add_state(name, Some(parent.into()), StateKind::Basic)
    }

    /// Add a composite state that is itself a nested state machine.
    pub fn submachine(
        &mut self,
        name: impl Into<String>,
        parent: impl Into<Parent>,
    ) -> Result<StateId, ModelError> {
        self.add_state(
            name,
            Some(parent.into()),
            StateKind::Composite {
                regions: Vec::new(),
                machine: true,
            },
        )
    }

    pub fn initial(&mut self, name: impl Into<String>, parent: impl Into<Parent>) -> Result<StateId, ModelError> {
        self.add_state(name, Some(parent.into()), StateKind::Initial)
    }

    pub fn choice(&mut self, name: impl Into<String>, parent: impl Into<Parent>) -> Result<StateId, ModelError> {
        self.add_state(name, Some(parent.into()), StateKind::Choice)
    }

    pub fn shallow_history(
        &mut self,
        name: impl Into<String>,
        parent: impl Into<Parent>,
    ) -> Result<StateId, ModelError> {
        self.add_state(name, Some(parent.into()), StateKind::ShallowHistory)
    }

    pub fn deep_history(
        &mut self,
        name: impl Into<String>,
        parent: impl Into<Parent>,
    ) -> Result<StateId, ModelError> {
        self.add_state(name, Some(parent.into()), StateKind::DeepHistory)
    }

    /// Add a fork-join joining the regions of `owner`.
    pub fn fork_join(&mut self, name: impl Into<String>, owner: StateId) -> Result<StateId, ModelError> {
        let owner_node = self.model.require_state(owner)?;
        if owner_node.kind.is_pseudostate() {
            return Err(ModelError::InvalidParent {
                state: owner_node.name.clone(),
            });
        }
        self.add_state(name, None, StateKind::ForkJoin { owner })
    }

    pub fn on_entry<F>(&mut self, state: StateId, action: F) -> Result<DelegateId, ModelError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        Ok(self.model.require_state(state)?.entry.add(Action::new(action)))
    }

    pub fn on_exit<F>(&mut self, state: StateId, action: F) -> Result<DelegateId, ModelError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        Ok(self.model.require_state(state)?.exit.add(Action::new(action)))
    }

    /// Record entries of `state` in the trace log.
    pub fn log_entry(&mut self, state: StateId, log: bool) -> Result<(), ModelError> {
        self.model.require_state(state)?;
        self.model.states[state.0].log_entry = log;
        Ok(())
    }

    pub fn set_limits(&mut self, limits: MachineLimits) -> &mut Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> MachineLimits {
        self.limits
    }

    /// Record every fired transition in the trace log.
    pub fn set_trace(&mut self, trace: bool) -> &mut Self {
        self.trace = trace;
        self
    }

    /// Add a transition using a builder.
    /// Returns an error if the transition is structurally invalid.
    pub fn transition(&mut self, builder: TransitionBuilder) -> Result<TransitionId, ModelError> {
        let name = match builder.name {
            Some(name) => name,
            None => format!(
                "{}->{}",
                self.model.require_state(builder.source)?.name,
                self.model.require_state(builder.target)?.name
            ),
        };
        self.model.check_transition(
            &name,
            builder.kind,
            builder.source,
            builder.target,
            !builder.triggers.is_empty(),
            !builder.guards.is_empty(),
        )?;

        let guards = GuardList::new();
        for guard in builder.guards {
            guards.add(guard);
        }
        let actions = ActionList::new();
        for action in builder.actions {
            actions.add(action);
        }
        let id = TransitionId(self.model.transitions.len());
        self.model.transitions.push(TransitionNode {
            id,
            name,
            kind: builder.kind,
            source: builder.source,
            target: builder.target,
            triggers: builder.triggers,
            guards,
            actions,
        });
        self.model.attach(id);
        Ok(id)
    }

    /// Check the whole model, reporting every defect found.
    pub fn validate(&self) -> Result<(), BuildError> {
        collect_errors(validate_model(&self.model)).map_err(|errors| BuildError::IllFormed {
            machine: self.model.name.clone(),
            errors,
        })
    }

    /// Validate and resolve each region's initial state.
    pub(crate) fn into_model(mut self) -> Result<Model, BuildError> {
        self.validate()?;
        for index in 0..self.model.regions.len() {
            let initial = resolve_initial(&self.model, &self.model.regions[index]).ok();
            self.model.regions[index].initial = initial;
        }
        Ok(self.model)
    }

    /// Build the machine on `thread`. The machine starts out stopped.
    pub fn build(self, ctx: &Arc<AppContext>, thread: &EventThread) -> Result<StateMachine, BuildError> {
        if !thread.is_running() {
            return Err(BuildError::ThreadTerminated(thread.name().to_string()));
        }
        let limits = self.limits;
        let trace = self.trace;
        let model = self.into_model()?;
        Ok(StateMachine::create(model, limits, trace, ctx, thread))
    }
}
