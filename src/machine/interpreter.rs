//! Transition evaluation and firing over a model and its configuration.
//!
//! One [`Interpreter`] lives for the handling of a single event. Firing a
//! transition may resolve pseudostates (initial, choice, history,
//! fork-join) which fire further transitions; regions of active composites
//! left empty are entered by default once the outermost firing completes.

use crate::builder::ModelError;
use crate::core::{
    Configuration, Model, RegionId, StateId, StateKind, TransitionId, TransitionKind,
};
use crate::event::Event;
use crate::fault::{CallbackKind, FaultReporter};
use crate::trace::{TraceKind, TraceLog};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

pub(crate) struct Interpreter<'a> {
    model: &'a Model,
    config: &'a mut Configuration,
    active: &'a [AtomicBool],
    faults: &'a dyn FaultReporter,
    trace: Option<&'a TraceLog>,
    trace_transitions: bool,
    depth: usize,
    fired: bool,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(
        model: &'a Model,
        config: &'a mut Configuration,
        active: &'a [AtomicBool],
        faults: &'a dyn FaultReporter,
    ) -> Self {
        Self {
            model,
            config,
            active,
            faults,
            trace: None,
            trace_transitions: false,
            depth: 0,
            fired: false,
        }
    }

    pub(crate) fn with_trace(mut self, trace: Option<&'a TraceLog>, transitions: bool) -> Self {
        self.trace = trace;
        self.trace_transitions = transitions;
        self
    }

    /// Whether any transition fired (including initial entry) so far.
    pub(crate) fn fired(&self) -> bool {
        self.fired
    }

    pub(crate) fn is_entered(&self) -> bool {
        self.config.entered
    }

    fn is_active(&self, state: StateId) -> bool {
        self.active[state.0].load(Ordering::SeqCst)
    }

    fn set_active(&self, state: StateId, active: bool) {
        self.active[state.0].store(active, Ordering::SeqCst);
    }

    fn machine(&self) -> &'a str {
        &self.model.name
    }

    /// Enter the initial configuration from the root down.
    pub(crate) fn enter_root(&mut self, event: &Event) -> Result<(), ModelError> {
        self.depth += 1;
        let result = self.enter_state(StateId::ROOT, false, None, event);
        self.depth -= 1;
        result?;
        self.config.entered = true;
        self.fired = true;
        self.complete_configuration(event)
    }

    /// Offer `event` to the active configuration.
    ///
    /// Returns `true` if a transition claimed it.
    pub(crate) fn dispatch(&mut self, event: &Event) -> Result<bool, ModelError> {
        self.offer(StateId::ROOT, event)
    }

    /// Depth first: the active substates of every region get the event
    /// before the state's own outgoing transitions.
    fn offer(&mut self, state: StateId, event: &Event) -> Result<bool, ModelError> {
        let model = self.model;
        let node = model.node(state);
        for region in node.kind.regions() {
            if let Some(held) = self.config.active_in(*region) {
                if self.offer(held, event)? {
                    return Ok(true);
                }
            }
        }
        if matches!(node.kind, StateKind::ForkJoin { .. }) {
            return self.try_release(state, event);
        }
        for transition in &node.outgoing {
            if self.claims(*transition, event) {
                self.fire(*transition, event)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn claims(&self, transition: TransitionId, event: &Event) -> bool {
        let t = self.model.transition_node(transition);
        t.is_triggered_by(event.id()) && t.guards.evaluate(event, &t.name, self.faults)
    }

    fn fire(&mut self, transition: TransitionId, event: &Event) -> Result<(), ModelError> {
        self.depth += 1;
        let result = self.fire_inner(transition, event);
        self.depth -= 1;
        result?;
        self.fired = true;
        if self.depth == 0 {
            self.complete_configuration(event)?;
        }
        Ok(())
    }

    fn fire_inner(&mut self, transition: TransitionId, event: &Event) -> Result<(), ModelError> {
        let model = self.model;
        let t = model.transition_node(transition);
        debug!(
            machine = self.machine(),
            transition = %t.name,
            kind = t.kind.label(),
            event = %event,
            "transition fired"
        );
        if self.trace_transitions {
            if let Some(log) = self.trace {
                log.append(
                    TraceKind::TransitionFired,
                    [
                        ("machine", self.machine()),
                        ("transition", t.name.as_str()),
                        ("kind", t.kind.label()),
                        ("event", event.name()),
                    ],
                );
            }
        }

        match t.kind {
            TransitionKind::Internal => {
                t.actions
                    .invoke(event, CallbackKind::Action, &t.name, self.faults);
            }
            TransitionKind::Local => {
                let regions = model.node(t.source).kind.regions();
                for region in regions {
                    self.exit_region(*region, event);
                }
                t.actions
                    .invoke(event, CallbackKind::Action, &t.name, self.faults);
                if t.target == t.source {
                    for region in regions {
                        self.enter_region(*region, false, event)?;
                    }
                } else {
                    self.enter_via(t.source, t.target, Some(transition), event)?;
                }
            }
            TransitionKind::External | TransitionKind::ForkJoinLink { .. } => {
                let lca = model.lca(t.source, t.target);
                if let Some(child) = model.child_toward(lca, t.source) {
                    self.exit_state(child, event);
                }
                t.actions
                    .invoke(event, CallbackKind::Action, &t.name, self.faults);
                self.enter_via(lca, t.target, Some(transition), event)?;
            }
        }
        Ok(())
    }

    /// Activate the states between `from` and `target`, then enter `target`.
    fn enter_via(
        &mut self,
        from: StateId,
        target: StateId,
        via: Option<TransitionId>,
        event: &Event,
    ) -> Result<(), ModelError> {
        let path = self.model.path_from(from, target);
        if let Some((last, ancestors)) = path.split_last() {
            for ancestor in ancestors {
                self.activate(*ancestor, event);
            }
            self.enter_state(*last, false, via, event)?;
        }
        Ok(())
    }

    /// Mark `state` active in its region and run its entry actions.
    ///
    /// A different state active in the same region is exited first.
    fn activate(&mut self, state: StateId, event: &Event) {
        if self.is_active(state) {
            return;
        }
        let model = self.model;
        let node = model.node(state);
        if let Some(region) = node.region {
            if let Some(other) = self.config.active_in(region) {
                if other != state {
                    self.exit_state(other, event);
                }
            }
            self.config.region_active[region.0] = Some(state);
        }
        self.set_active(state, true);
        trace!(machine = self.machine(), state = %node.name, "state entered");
        node.entry
            .invoke(event, CallbackKind::Entry, &node.name, self.faults);
        if node.log_entry {
            if let Some(log) = self.trace {
                log.append(
                    TraceKind::StateEntered,
                    [
                        ("machine", self.machine()),
                        ("state", node.name.as_str()),
                        ("event", event.name()),
                    ],
                );
            }
        }
    }

    fn enter_state(
        &mut self,
        state: StateId,
        deep: bool,
        via: Option<TransitionId>,
        event: &Event,
    ) -> Result<(), ModelError> {
        let model = self.model;
        match &model.node(state).kind {
            StateKind::Initial => self.resolve_initial(state, event),
            StateKind::Choice => self.resolve_choice(state, event),
            StateKind::ShallowHistory => self.enter_history(state, false, event),
            StateKind::DeepHistory => self.enter_history(state, true, event),
            StateKind::ForkJoin { owner } => self.arrive(state, *owner, via, event),
            StateKind::Basic => {
                self.activate(state, event);
                Ok(())
            }
            StateKind::Composite { regions, .. } => {
                self.activate(state, event);
                for region in regions {
                    self.enter_region(*region, deep, event)?;
                }
                Ok(())
            }
        }
    }

    /// Enter `region` by history (when `deep`) or by its initial state.
    fn enter_region(&mut self, region: RegionId, deep: bool, event: &Event) -> Result<(), ModelError> {
        if self.config.active_in(region).is_some() {
            return Ok(());
        }
        if deep {
            if let Some(recorded) = self.config.history_of(region) {
                return self.enter_state(recorded, true, None, event);
            }
        }
        let node = self.model.region_node(region);
        let initial = node.initial.ok_or_else(|| ModelError::EmptyRegion {
            region: node.name.clone(),
        })?;
        self.enter_state(initial, deep, None, event)
    }

    fn resolve_initial(&mut self, state: StateId, event: &Event) -> Result<(), ModelError> {
        let model = self.model;
        let node = model.node(state);
        for transition in &node.outgoing {
            let t = model.transition_node(*transition);
            if t.guards.evaluate(event, &t.name, self.faults) {
                return self.fire(*transition, event);
            }
        }
        Err(ModelError::PseudostateWithoutTransition {
            state: node.name.clone(),
        })
    }

    fn resolve_choice(&mut self, state: StateId, event: &Event) -> Result<(), ModelError> {
        let model = self.model;
        let node = model.node(state);
        let elses: Vec<TransitionId> = node
            .outgoing
            .iter()
            .copied()
            .filter(|t| model.transition_node(*t).is_else())
            .collect();
        if elses.len() > 1 {
            return Err(ModelError::MultipleElseTransitions {
                state: node.name.clone(),
                count: elses.len(),
            });
        }
        for transition in &node.outgoing {
            let t = model.transition_node(*transition);
            if !t.is_else() && t.guards.evaluate(event, &t.name, self.faults) {
                return self.fire(*transition, event);
            }
        }
        match elses.first() {
            Some(fallback) => self.fire(*fallback, event),
            None => Err(ModelError::NoChoiceTransition {
                state: node.name.clone(),
            }),
        }
    }

    fn enter_history(&mut self, state: StateId, deep: bool, event: &Event) -> Result<(), ModelError> {
        let model = self.model;
        let node = model.node(state);
        let region = node.region.ok_or_else(|| ModelError::MissingParentRegion {
            state: node.name.clone(),
        })?;
        match self.config.history_of(region) {
            Some(recorded) => {
                debug!(machine = self.machine(), history = %node.name, restored = %model.node(recorded).name, deep, "history restored");
                self.enter_state(recorded, deep, None, event)
            }
            None => self.enter_region(region, deep, event),
        }
    }

    /// Record an arrival at a fork-join and release it once every incoming
    /// transition has arrived.
    fn arrive(
        &mut self,
        fork_join: StateId,
        owner: StateId,
        via: Option<TransitionId>,
        event: &Event,
    ) -> Result<(), ModelError> {
        let model = self.model;
        for ancestor in model.path_from(StateId::ROOT, owner) {
            self.activate(ancestor, event);
        }

        if let Some(transition) = via {
            self.config
                .arrivals
                .entry(fork_join)
                .or_default()
                .insert(transition);
            let t = model.transition_node(transition);
            let region = match t.kind {
                TransitionKind::ForkJoinLink { region } => region,
                _ => model.originating_region(t.source, owner),
            };
            if let Some(region) = region {
                if let Some(other) = self.config.active_in(region) {
                    if other != fork_join {
                        self.exit_state(other, event);
                    }
                }
                self.config.region_active[region.0] = Some(fork_join);
                self.config
                    .fork_regions
                    .entry(fork_join)
                    .or_default()
                    .insert(region);
            }
        }

        if !self.is_active(fork_join) {
            let node = model.node(fork_join);
            self.set_active(fork_join, true);
            node.entry
                .invoke(event, CallbackKind::Entry, &node.name, self.faults);
        }
        debug!(
            machine = self.machine(),
            fork_join = %model.node(fork_join).name,
            arrived = self.config.arrivals.get(&fork_join).map_or(0, |a| a.len()),
            expected = model.node(fork_join).incoming.len(),
            "fork-join arrival"
        );
        self.try_release(fork_join, event).map(|_| ())
    }

    fn try_release(&mut self, fork_join: StateId, event: &Event) -> Result<bool, ModelError> {
        let model = self.model;
        let node = model.node(fork_join);
        let complete = match self.config.arrivals.get(&fork_join) {
            Some(arrived) => {
                !node.incoming.is_empty() && node.incoming.iter().all(|t| arrived.contains(t))
            }
            None => false,
        };
        if !complete {
            return Ok(false);
        }
        self.exit_state(fork_join, event);
        // Outgoing transitions of a fork-join are unconditional.
        for transition in &node.outgoing {
            self.fire(*transition, event)?;
        }
        Ok(true)
    }

    fn exit_region(&mut self, region: RegionId, event: &Event) {
        let Some(held) = self.config.active_in(region) else {
            return;
        };
        if !self.model.node(held).kind.is_pseudostate() {
            self.config.region_history[region.0] = Some(held);
        }
        self.exit_state(held, event);
        self.config.region_active[region.0] = None;
    }

    /// Exit `state` and everything active below it, innermost first.
    fn exit_state(&mut self, state: StateId, event: &Event) {
        if !self.is_active(state) {
            return;
        }
        let model = self.model;
        let node = model.node(state);
        match &node.kind {
            StateKind::Composite { regions, .. } => {
                for region in regions {
                    self.exit_region(*region, event);
                }
            }
            StateKind::ForkJoin { .. } => self.reset_fork_join(state),
            _ => {}
        }
        node.exit
            .invoke(event, CallbackKind::Exit, &node.name, self.faults);
        self.set_active(state, false);
        if let Some(region) = node.region {
            if self.config.active_in(region) == Some(state) {
                self.config.region_active[region.0] = None;
            }
        }
        trace!(machine = self.machine(), state = %node.name, "state exited");
        if node.log_entry {
            if let Some(log) = self.trace {
                log.append(
                    TraceKind::StateExited,
                    [
                        ("machine", self.machine()),
                        ("state", node.name.as_str()),
                        ("event", event.name()),
                    ],
                );
            }
        }
    }

    fn reset_fork_join(&mut self, fork_join: StateId) {
        self.config.arrivals.remove(&fork_join);
        if let Some(regions) = self.config.fork_regions.remove(&fork_join) {
            for region in regions {
                if self.config.active_in(region) == Some(fork_join) {
                    self.config.region_active[region.0] = None;
                }
            }
        }
    }

    /// Enter every empty region of an active composite by default.
    fn complete_configuration(&mut self, event: &Event) -> Result<(), ModelError> {
        self.depth += 1;
        let result = self.fill_regions(event);
        self.depth -= 1;
        result
    }

    fn fill_regions(&mut self, event: &Event) -> Result<(), ModelError> {
        let model = self.model;
        let mut attempted: HashSet<RegionId> = HashSet::new();
        loop {
            let next = model
                .regions()
                .iter()
                .find(|r| {
                    !attempted.contains(&r.id)
                        && self.is_active(r.owner)
                        && self.config.active_in(r.id).is_none()
                })
                .map(|r| r.id);
            let Some(region) = next else {
                return Ok(());
            };
            attempted.insert(region);
            self.enter_region(region, false, event)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{StateMachineBuilder, TransitionBuilder};
    use crate::fault::Fault;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Collect(Mutex<Vec<Fault>>);

    impl FaultReporter for Collect {
        fn report(&self, fault: Fault) {
            self.0.lock().push(fault);
        }
    }

    /// A model plus its runtime state, driven without any threads.
    struct Harness {
        model: Model,
        config: Configuration,
        active: Vec<AtomicBool>,
        faults: Collect,
    }

    impl Harness {
        fn new(builder: StateMachineBuilder) -> Self {
            let model = builder.into_model().unwrap();
            let config = Configuration::new(&model);
            let active = (0..model.states().len())
                .map(|_| AtomicBool::new(false))
                .collect();
            Self {
                model,
                config,
                active,
                faults: Collect::default(),
            }
        }

        /// Enter on first use, then dispatch and run to completion.
        fn send(&mut self, event: &Event) -> Result<bool, ModelError> {
            let mut interpreter =
                Interpreter::new(&self.model, &mut self.config, &self.active, &self.faults);
            if !interpreter.is_entered() {
                interpreter.enter_root(event)?;
            }
            let handled = interpreter.dispatch(event)?;
            let mut fired = interpreter.fired();
            while fired {
                let mut interpreter =
                    Interpreter::new(&self.model, &mut self.config, &self.active, &self.faults);
                interpreter.dispatch(&Event::completion())?;
                fired = interpreter.fired();
            }
            Ok(handled)
        }

        fn start(&mut self) {
            let mut interpreter =
                Interpreter::new(&self.model, &mut self.config, &self.active, &self.faults);
            interpreter.enter_root(&Event::start()).unwrap();
            self.settle();
        }

        fn settle(&mut self) {
            loop {
                let mut interpreter =
                    Interpreter::new(&self.model, &mut self.config, &self.active, &self.faults);
                interpreter.dispatch(&Event::completion()).unwrap();
                if !interpreter.fired() {
                    break;
                }
            }
        }

        fn is_active(&self, name: &str) -> bool {
            let id = self.model.find(name).unwrap();
            self.active[id.0].load(Ordering::SeqCst)
        }

        fn active_names(&self) -> Vec<&str> {
            self.model
                .states()
                .iter()
                .filter(|s| self.active[s.id.0].load(Ordering::SeqCst))
                .map(|s| s.name())
                .collect()
        }

        fn consistent(&self) {
            if let Err(problems) = self.config.check(&self.model, &self.active) {
                panic!("inconsistent configuration: {problems:?}");
            }
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> Box<dyn Fn(&Event) + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |label: &'static str| {
            let sink = Arc::clone(&sink);
            Box::new(move |_: &Event| sink.lock().push(label.to_string())) as Box<dyn Fn(&Event) + Send + Sync>
        };
        (log, make)
    }

    #[test]
    fn entering_the_root_enters_initial_configuration() {
        let mut b = StateMachineBuilder::new("m");
        let root = b.root();
        let init = b.initial("Init", root).unwrap();
        let a = b.state("A", root).unwrap();
        b.state("B", root).unwrap();
        let left = b.region("Left", a).unwrap();
        let right = b.region("Right", a).unwrap();
        b.state("L1", left).unwrap();
        b.state("R1", right).unwrap();
        b.transition(TransitionBuilder::external(init, a)).unwrap();
        let mut h = Harness::new(b);

        h.start();

        assert_eq!(h.active_names(), vec!["m", "A", "L1", "R1"]);
        h.consistent();
    }

    #[test]
    fn entry_and_exit_actions_run_innermost_outward() {
        let (log, make) = recorder();
        let go = Event::new("Go");
        let mut b = StateMachineBuilder::new("m");
        let root = b.root();
        let init = b.initial("Init", root).unwrap();
        let a = b.state("A", root).unwrap();
        let bb = b.state("B", root).unwrap();
        let a1 = b.state("A1", a).unwrap();
        b.transition(TransitionBuilder::external(init, a)).unwrap();
        b.transition(TransitionBuilder::external(a1, bb).trigger(&go).action(make("action")))
            .unwrap();
        b.on_entry(a, make("enter A")).unwrap();
        b.on_entry(a1, make("enter A1")).unwrap();
        b.on_exit(a, make("exit A")).unwrap();
        b.on_exit(a1, make("exit A1")).unwrap();
        b.on_entry(bb, make("enter B")).unwrap();
        let mut h = Harness::new(b);

        h.start();
        assert!(h.send(&go).unwrap());

        assert_eq!(
            log.lock().as_slice(),
            &["enter A", "enter A1", "exit A1", "exit A", "action", "enter B"]
        );
        h.consistent();
    }

    #[test]
    fn internal_beats_local_beats_external() {
        let (log, make) = recorder();
        let go = Event::new("Go");
        let mut b = StateMachineBuilder::new("m");
        let root = b.root();
        let init = b.initial("Init", root).unwrap();
        let s = b.state("S", root).unwrap();
        let other = b.state("Other", root).unwrap();
        let inner = b.state("Inner", s).unwrap();
        b.transition(TransitionBuilder::external(init, s)).unwrap();
        b.transition(TransitionBuilder::external(s, other).trigger(&go).action(make("external")))
            .unwrap();
        let local = b
            .transition(TransitionBuilder::local(s, inner).trigger(&go).action(make("local")))
            .unwrap();
        let internal = b
            .transition(TransitionBuilder::internal(s).trigger(&go).action(make("internal")))
            .unwrap();
        let mut h = Harness::new(b);
        h.start();

        assert!(h.send(&go).unwrap());
        assert_eq!(log.lock().as_slice(), &["internal"]);

        h.model.transition_node(internal).guards.add(crate::core::Guard::new(|_| false));
        assert!(h.send(&go).unwrap());
        assert_eq!(log.lock().last().map(String::as_str), Some("local"));
        assert!(h.is_active("S"));

        h.model.transition_node(local).guards.add(crate::core::Guard::new(|_| false));
        assert!(h.send(&go).unwrap());
        assert_eq!(log.lock().last().map(String::as_str), Some("external"));
        assert!(h.is_active("Other"));
        assert!(!h.is_active("S"));
        h.consistent();
    }

    #[test]
    fn local_transition_keeps_the_source_active() {
        let (log, make) = recorder();
        let go = Event::new("Go");
        let mut b = StateMachineBuilder::new("m");
        let root = b.root();
        let s = b.state("S", root).unwrap();
        let s_init = b.initial("SInit", s).unwrap();
        let s1 = b.state("S1", s).unwrap();
        let s2 = b.state("S2", s).unwrap();
        b.transition(TransitionBuilder::external(s_init, s1)).unwrap();
        b.transition(TransitionBuilder::local(s, s2).trigger(&go)).unwrap();
        b.on_entry(s, make("enter S")).unwrap();
        b.on_exit(s, make("exit S")).unwrap();
        b.on_exit(s1, make("exit S1")).unwrap();
        b.on_entry(s2, make("enter S2")).unwrap();
        let mut h = Harness::new(b);
        h.start();

        assert!(h.send(&go).unwrap());

        assert_eq!(log.lock().as_slice(), &["enter S", "exit S1", "enter S2"]);
        assert!(h.is_active("S2"));
        h.consistent();
    }

    #[test]
    fn false_guard_leaves_configuration_unchanged() {
        let go = Event::new("Go");
        let mut b = StateMachineBuilder::new("m");
        let root = b.root();
        let init = b.initial("Init", root).unwrap();
        let a = b.state("A", root).unwrap();
        let other = b.state("B", root).unwrap();
        b.transition(TransitionBuilder::external(init, a)).unwrap();
        b.transition(TransitionBuilder::external(a, other).trigger(&go).guard(|_| false))
            .unwrap();
        let mut h = Harness::new(b);
        h.start();
        let before = h.active_names().join(",");

        assert!(!h.send(&go).unwrap());
        assert!(!h.send(&go).unwrap());
        assert_eq!(h.active_names().join(","), before);
    }

    #[test]
    fn shallow_history_restores_only_the_top_level() {
        let (leave, back, deeper) = (Event::new("Leave"), Event::new("Back"), Event::new("Deeper"));
        let mut b = StateMachineBuilder::new("m");
        let root = b.root();
        let init = b.initial("Init", root).unwrap();
        let s = b.state("S", root).unwrap();
        let out = b.state("Out", root).unwrap();
        let s_init = b.initial("SInit", s).unwrap();
        let s1 = b.state("S1", s).unwrap();
        let s2 = b.state("S2", s).unwrap();
        let hist = b.shallow_history("H", s).unwrap();
        let s2_init = b.initial("S2Init", s2).unwrap();
        let s2a = b.state("S2a", s2).unwrap();
        let s2b = b.state("S2b", s2).unwrap();
        b.transition(TransitionBuilder::external(init, s)).unwrap();
        b.transition(TransitionBuilder::external(s_init, s1)).unwrap();
        b.transition(TransitionBuilder::external(s2_init, s2a)).unwrap();
        b.transition(TransitionBuilder::external(s1, s2b).trigger(&deeper)).unwrap();
        b.transition(TransitionBuilder::external(s, out).trigger(&leave)).unwrap();
        b.transition(TransitionBuilder::external(out, hist).trigger(&back)).unwrap();
        let mut h = Harness::new(b);
        h.start();

        h.send(&deeper).unwrap();
        assert!(h.is_active("S2b"));
        h.send(&leave).unwrap();
        assert!(h.is_active("Out"));
        h.send(&back).unwrap();

        assert!(h.is_active("S2"));
        assert!(h.is_active("S2a"));
        assert!(!h.is_active("S2b"));
        h.consistent();
    }

    #[test]
    fn history_without_record_uses_the_initial_state() {
        let back = Event::new("Back");
        let mut b = StateMachineBuilder::new("m");
        let root = b.root();
        let init = b.initial("Init", root).unwrap();
        let out = b.state("Out", root).unwrap();
        let s = b.state("S", root).unwrap();
        b.state("S1", s).unwrap();
        let hist = b.deep_history("H", s).unwrap();
        b.transition(TransitionBuilder::external(init, out)).unwrap();
        b.transition(TransitionBuilder::external(out, hist).trigger(&back)).unwrap();
        let mut h = Harness::new(b);
        h.start();

        h.send(&back).unwrap();

        assert!(h.is_active("S1"));
        assert!(!h.is_active("H"));
        h.consistent();
    }

    #[test]
    fn choice_takes_first_passing_branch_then_else() {
        let go = Event::new("Go");
        let mut b = StateMachineBuilder::new("m");
        let root = b.root();
        let init = b.initial("Init", root).unwrap();
        let idle = b.state("Idle", root).unwrap();
        let pick = b.choice("Pick", root).unwrap();
        let big = b.state("Big", root).unwrap();
        let small = b.state("Small", root).unwrap();
        b.transition(TransitionBuilder::external(init, idle)).unwrap();
        b.transition(TransitionBuilder::external(idle, pick).trigger(&go)).unwrap();
        b.transition(
            TransitionBuilder::external(pick, big).guard(|e| e.data::<u32>().is_some_and(|v| *v > 10)),
        )
        .unwrap();
        b.transition(TransitionBuilder::external(pick, small)).unwrap();
        b.transition(TransitionBuilder::external(big, idle).trigger(&go)).unwrap();
        let mut h = Harness::new(b);
        h.start();

        h.send(&go.with_data(50_u32)).unwrap();
        assert!(h.is_active("Big"));
        h.send(&go).unwrap();
        assert!(h.is_active("Idle"));
        h.send(&go.with_data(1_u32)).unwrap();
        assert!(h.is_active("Small"));
        assert!(!h.is_active("Pick"));
        h.consistent();
    }

    #[test]
    fn choice_without_a_taken_branch_is_ill_formed() {
        let go = Event::new("Go");
        let mut b = StateMachineBuilder::new("m");
        let root = b.root();
        let init = b.initial("Init", root).unwrap();
        let idle = b.state("Idle", root).unwrap();
        let pick = b.choice("Pick", root).unwrap();
        let never = b.state("Never", root).unwrap();
        b.transition(TransitionBuilder::external(init, idle)).unwrap();
        b.transition(TransitionBuilder::external(idle, pick).trigger(&go)).unwrap();
        b.transition(TransitionBuilder::external(pick, never).guard(|_| false))
            .unwrap();
        let mut h = Harness::new(b);
        h.start();

        assert_eq!(
            h.send(&go),
            Err(ModelError::NoChoiceTransition {
                state: "Pick".to_string()
            })
        );
    }

    #[test]
    fn fork_join_waits_for_every_region() {
        let (e1, e2) = (Event::new("Event1"), Event::new("Event2"));
        let mut b = StateMachineBuilder::new("m");
        let root = b.root();
        let c = b.state("C", root).unwrap();
        let left = b.region("Left", c).unwrap();
        let right = b.region("Right", c).unwrap();
        let l_init = b.initial("LInit", left).unwrap();
        let l1 = b.state("L1", left).unwrap();
        let l2 = b.state("L2", left).unwrap();
        let r_init = b.initial("RInit", right).unwrap();
        let r1 = b.state("R1", right).unwrap();
        let r2 = b.state("R2", right).unwrap();
        let join = b.fork_join("Join", c).unwrap();
        b.transition(TransitionBuilder::external(l_init, l1)).unwrap();
        b.transition(TransitionBuilder::external(r_init, r1)).unwrap();
        b.transition(TransitionBuilder::external(l1, join).trigger(&e1)).unwrap();
        b.transition(TransitionBuilder::external(r1, join).trigger(&e2)).unwrap();
        b.transition(TransitionBuilder::external(join, l2)).unwrap();
        b.transition(TransitionBuilder::external(join, r2)).unwrap();
        let mut h = Harness::new(b);
        h.start();

        assert!(h.send(&e1).unwrap());
        assert!(h.is_active("Join"));
        assert!(!h.is_active("L1"));
        assert!(h.is_active("R1"));
        assert!(!h.is_active("L2") && !h.is_active("R2"));
        h.consistent();

        assert!(h.send(&e2).unwrap());
        assert!(h.is_active("L2") && h.is_active("R2"));
        assert!(!h.is_active("Join"));
        assert!(h.config.arrivals.is_empty());
        h.consistent();
    }

    #[test]
    fn fork_from_outside_enters_every_target_region() {
        let go = Event::new("Go");
        let mut b = StateMachineBuilder::new("m");
        let root = b.root();
        let init = b.initial("Init", root).unwrap();
        let idle = b.state("Idle", root).unwrap();
        let c = b.state("C", root).unwrap();
        let left = b.region("Left", c).unwrap();
        let right = b.region("Right", c).unwrap();
        let l_init = b.initial("LInit", left).unwrap();
        let l1 = b.state("L1", left).unwrap();
        let l2 = b.state("L2", left).unwrap();
        b.state("R1", right).unwrap();
        let fork = b.fork_join("Fork", c).unwrap();
        b.transition(TransitionBuilder::external(init, idle)).unwrap();
        b.transition(TransitionBuilder::external(l_init, l1)).unwrap();
        b.transition(TransitionBuilder::external(idle, fork).trigger(&go)).unwrap();
        b.transition(TransitionBuilder::external(fork, l2)).unwrap();
        let mut h = Harness::new(b);
        h.start();

        h.send(&go).unwrap();

        // L2 from the fork, R1 by default entry of the untouched region.
        assert!(h.is_active("L2"));
        assert!(!h.is_active("L1"));
        assert!(h.is_active("R1"));
        h.consistent();
    }

    #[test]
    fn completion_transitions_cascade() {
        let go = Event::new("Go");
        let mut b = StateMachineBuilder::new("m");
        let root = b.root();
        let init = b.initial("Init", root).unwrap();
        let a = b.state("A", root).unwrap();
        let bb = b.state("B", root).unwrap();
        let c = b.state("C", root).unwrap();
        b.transition(TransitionBuilder::external(init, a)).unwrap();
        b.transition(TransitionBuilder::external(a, bb).trigger(&go)).unwrap();
        b.transition(TransitionBuilder::external(bb, c)).unwrap();
        let mut h = Harness::new(b);
        h.start();

        h.send(&go).unwrap();

        assert!(h.is_active("C"));
        assert!(!h.is_active("B"));
    }

    #[test]
    fn panicking_guard_is_reported_and_fails() {
        let go = Event::new("Go");
        let mut b = StateMachineBuilder::new("m");
        let root = b.root();
        let init = b.initial("Init", root).unwrap();
        let a = b.state("A", root).unwrap();
        let bb = b.state("B", root).unwrap();
        b.transition(TransitionBuilder::external(init, a)).unwrap();
        b.transition(TransitionBuilder::external(a, bb).trigger(&go).guard(|_| panic!("bad guard")))
            .unwrap();
        let mut h = Harness::new(b);
        h.start();

        assert!(!h.send(&go).unwrap());
        assert!(h.is_active("A"));
        assert!(matches!(
            h.faults.0.lock().as_slice(),
            [Fault::Callback { kind: CallbackKind::Guard, origin, .. }] if origin == "A->B"
        ));
    }
}
