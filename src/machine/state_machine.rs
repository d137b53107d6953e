//! The running state machine: an event handler on an event thread.

use super::interpreter::Interpreter;
use super::limits::MachineLimits;
use super::nested::NestedMachine;
use crate::builder::validate::{collect_errors, validate_model};
use crate::builder::ModelError;
use crate::context::AppContext;
use crate::core::{
    Action, ActionList, Configuration, DelegateId, DelegateList, Guard, Model, StateId, StateKind,
    TransitionId,
};
use crate::event::{Event, EventHandler, EventId, EventThread, HandlerId, Outcome};
use crate::fault::{isolate, CallbackKind, Fault, FaultHandler, FaultReporter};
use crate::timer::{ActionId, Signal, TimerTask};
use crate::trace::TraceKind;
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Whether a machine is processing user events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// Built or stopped; user events are dropped.
    Stopped,
    Started,
    /// Deregistered from its thread; nothing is accepted any more.
    Terminated,
}

/// Handle to a running hierarchical state machine.
///
/// All evaluation happens on the machine's event thread, one event at a
/// time. The handle is cheap to clone and every method may be called from
/// any thread. From inside the machine's own callbacks,
/// [`check_configuration`](Self::check_configuration) and
/// [`wait_idle`](Self::wait_idle) fail immediately instead of waiting for the
/// event being handled.
#[derive(Clone)]
pub struct StateMachine {
    inner: Arc<MachineInner>,
}

#[derive(Default)]
struct Counters {
    queued: usize,
    /// Thread handling one of this machine's events, if any.
    dispatcher: Option<ThreadId>,
    consecutive: usize,
}

pub(crate) struct MachineInner {
    id: HandlerId,
    name: String,
    ctx: Arc<AppContext>,
    thread: EventThread,
    model: RwLock<Arc<Model>>,
    active: Box<[AtomicBool]>,
    runtime: Mutex<Configuration>,
    status: Mutex<RunStatus>,
    counters: Mutex<Counters>,
    idle: Condvar,
    limits: Mutex<MachineLimits>,
    trace_transitions: bool,
    loop_limit_actions: ActionList,
    event_limit_actions: ActionList,
    fault_actions: DelegateList<FaultHandler>,
    /// Scheduler actions delivering events to this machine.
    scheduled: Mutex<Vec<ActionId>>,
    terminated: Signal,
    this: Weak<MachineInner>,
}

impl StateMachine {
    pub(crate) fn create(
        model: Model,
        limits: MachineLimits,
        trace_transitions: bool,
        ctx: &Arc<AppContext>,
        thread: &EventThread,
    ) -> Self {
        let active: Box<[AtomicBool]> = (0..model.states().len())
            .map(|_| AtomicBool::new(false))
            .collect();
        let runtime = Configuration::new(&model);
        info!(
            machine = model.name(),
            states = model.states().len(),
            regions = model.regions().len(),
            transitions = model.transitions().len(),
            thread = thread.name(),
            "state machine built"
        );
        let inner = Arc::new_cyclic(|this| MachineInner {
            id: HandlerId::next(),
            name: model.name().to_string(),
            ctx: Arc::clone(ctx),
            thread: thread.clone(),
            model: RwLock::new(Arc::new(model)),
            active,
            runtime: Mutex::new(runtime),
            status: Mutex::new(RunStatus::Stopped),
            counters: Mutex::new(Counters::default()),
            idle: Condvar::new(),
            limits: Mutex::new(limits),
            trace_transitions,
            loop_limit_actions: ActionList::new(),
            event_limit_actions: ActionList::new(),
            fault_actions: DelegateList::new(),
            scheduled: Mutex::new(Vec::new()),
            terminated: Signal::new(),
            this: this.clone(),
        });
        thread.register(inner.clone());
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn handler_id(&self) -> HandlerId {
        self.inner.id
    }

    pub fn thread(&self) -> &EventThread {
        &self.inner.thread
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.inner.ctx
    }

    /// The machine as an event destination.
    pub fn as_handler(&self) -> Arc<dyn EventHandler> {
        self.inner.clone()
    }

    /// Snapshot of the model currently in use.
    pub fn model(&self) -> Arc<Model> {
        Arc::clone(&self.inner.model.read())
    }

    pub fn status(&self) -> RunStatus {
        *self.inner.status.lock()
    }

    pub fn is_started(&self) -> bool {
        self.status() == RunStatus::Started
    }

    pub fn is_terminated(&self) -> bool {
        self.status() == RunStatus::Terminated
    }

    /// Begin processing user events, entering the initial configuration on
    /// the first start.
    pub fn start(&self) -> bool {
        self.inner.post_event(Event::start(), false)
    }

    /// Stop processing user events; the configuration is kept.
    pub fn stop(&self) -> bool {
        self.inner.post_event(Event::stop(), false)
    }

    /// Return to the never-entered configuration, forgetting history.
    pub fn reset(&self) -> bool {
        self.inner.post_event(Event::reset(), false)
    }

    /// Deregister from the event thread after pending events are handled.
    ///
    /// With `wait`, blocks up to the context's terminate timeout.
    pub fn terminate(&self, wait: bool) -> Result<(), Fault> {
        if self.is_terminated() {
            return Ok(());
        }
        let posted = self.inner.post_event(Event::terminate(), false);
        if !wait || !posted {
            return Ok(());
        }
        let timeout = self.inner.ctx.terminate_timeout();
        if self.inner.terminated.wait_timeout(timeout) || self.is_terminated() {
            self.inner.terminated.send();
            return Ok(());
        }
        let fault = Fault::TerminateTimeout {
            name: self.inner.name.clone(),
            timeout,
        };
        self.inner.ctx.faults().publish(&fault);
        Err(fault)
    }

    /// Queue `event` for this machine.
    ///
    /// Events carrying a delay or repeat interval go to the scheduler.
    /// Returns `false` when the event was refused.
    pub fn enqueue(&self, event: Event) -> bool {
        self.inner.post_event(event, false)
    }

    /// Queue `event`, naming the sender for tracing.
    pub fn enqueue_from(&self, event: Event, source: impl Into<String>) -> bool {
        self.enqueue(event.with_source(source))
    }

    /// Deliver `event` after `delay`, then every `repeat` if given.
    ///
    /// Pending deliveries are cancelled when the machine is reset or
    /// terminated.
    pub fn schedule(&self, event: Event, delay: Duration, repeat: Option<Duration>) -> ActionId {
        let event = self.inner.addressed(event.without_schedule());
        self.inner.schedule(event, delay, repeat)
    }

    /// Cancel a delivery returned by [`schedule`](Self::schedule).
    ///
    /// Returns `false` if it already fired for the last time or was
    /// cancelled before.
    pub fn unschedule(&self, action: ActionId) -> bool {
        self.inner.scheduled.lock().retain(|id| *id != action);
        self.inner.ctx.scheduler().unschedule(action)
    }

    /// Deliveries scheduled for this machine that have not finished.
    pub fn scheduled(&self) -> usize {
        self.inner.prune_scheduled()
    }

    /// Events waiting in the thread queue for this machine.
    pub fn queued(&self) -> usize {
        self.inner.counters.lock().queued
    }

    /// `true` if a copy of `event` is waiting for this machine.
    pub fn has_queued(&self, event: &Event) -> bool {
        self.inner.thread.has_event_for(self.inner.id, event.id())
    }

    /// Block until no event for this machine is queued or being handled.
    ///
    /// Returns `false` if `timeout` elapsed first, or at once when called
    /// from one of the machine's callbacks.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut counters = self.inner.counters.lock();
        if counters.dispatcher == Some(thread::current().id()) {
            return false;
        }
        while counters.queued > 0 || counters.dispatcher.is_some() {
            if self
                .inner
                .idle
                .wait_until(&mut counters, deadline)
                .timed_out()
            {
                return counters.queued == 0 && counters.dispatcher.is_none();
            }
        }
        true
    }

    pub fn is_active(&self, state: StateId) -> bool {
        self.inner.is_active(state)
    }

    pub fn is_active_named(&self, name: &str) -> bool {
        self.state(name).is_some_and(|id| self.is_active(id))
    }

    /// Look up a state by name.
    pub fn state(&self, name: &str) -> Option<StateId> {
        self.inner.model.read().find(name)
    }

    pub fn state_name(&self, state: StateId) -> Option<String> {
        self.inner
            .model
            .read()
            .state(state)
            .map(|s| s.name().to_string())
    }

    /// Names of every active state, in declaration order.
    pub fn active_state_names(&self) -> Vec<String> {
        let model = self.model();
        model
            .states()
            .iter()
            .filter(|s| self.is_active(s.id()))
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Verify the active flags against the region bookkeeping.
    ///
    /// Waits for the event being handled. Called from the machine's own
    /// callbacks, where the configuration is mid-transition, it fails
    /// without checking.
    pub fn check_configuration(&self) -> Result<(), Vec<String>> {
        if self.inner.counters.lock().dispatcher == Some(thread::current().id()) {
            return Err(vec![format!(
                "configuration of '{}' cannot be checked while it handles an event",
                self.inner.name
            )]);
        }
        let model = self.model();
        let runtime = self.inner.runtime.lock();
        runtime.check(&model, &self.inner.active)
    }

    pub fn limits(&self) -> MachineLimits {
        *self.inner.limits.lock()
    }

    /// Replace the limits; takes effect with the next event.
    pub fn set_limits(&self, limits: MachineLimits) {
        *self.inner.limits.lock() = limits;
    }

    /// Run `action` whenever the loop limit trips.
    pub fn on_loop_limit<F>(&self, action: F) -> DelegateId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.loop_limit_actions.add(Action::new(action))
    }

    pub fn remove_loop_limit_action(&self, id: DelegateId) -> bool {
        self.inner.loop_limit_actions.remove(id)
    }

    /// Run `action` whenever the event limit trips.
    pub fn on_event_limit<F>(&self, action: F) -> DelegateId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.event_limit_actions.add(Action::new(action))
    }

    pub fn remove_event_limit_action(&self, id: DelegateId) -> bool {
        self.inner.event_limit_actions.remove(id)
    }

    /// Receive this machine's faults before the context channel does.
    pub fn on_fault<F>(&self, handler: F) -> DelegateId
    where
        F: Fn(&Fault) + Send + Sync + 'static,
    {
        self.inner.fault_actions.add(Arc::new(handler))
    }

    pub fn remove_fault_action(&self, id: DelegateId) -> bool {
        self.inner.fault_actions.remove(id)
    }

    /// Add a guard to a transition of the running model.
    ///
    /// Outgoing transitions of a fork-join cannot be guarded.
    pub fn add_guard<F>(&self, transition: TransitionId, guard: F) -> Result<DelegateId, ModelError>
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        let model = self.model();
        let t = model.require_transition(transition)?;
        let source = model.node(t.source);
        if matches!(source.kind(), StateKind::ForkJoin { .. }) {
            return Err(ModelError::GuardedForkJoinOutgoing {
                state: source.name().to_string(),
                transition: t.name.clone(),
            });
        }
        Ok(t.guards.add(Guard::new(guard)))
    }

    /// Returns `Ok(false)` if `id` was not registered on `transition`.
    pub fn remove_guard(&self, transition: TransitionId, id: DelegateId) -> Result<bool, ModelError> {
        let model = self.model();
        Ok(model.require_transition(transition)?.guards.remove(id))
    }

    pub fn add_action<F>(&self, transition: TransitionId, action: F) -> Result<DelegateId, ModelError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let model = self.model();
        Ok(model
            .require_transition(transition)?
            .actions
            .add(Action::new(action)))
    }

    pub fn remove_action(&self, transition: TransitionId, id: DelegateId) -> Result<bool, ModelError> {
        let model = self.model();
        Ok(model.require_transition(transition)?.actions.remove(id))
    }

    /// Run `action` each time `state` is entered, after earlier entry actions.
    pub fn add_entry_action<F>(&self, state: StateId, action: F) -> Result<DelegateId, ModelError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let model = self.model();
        Ok(model.require_state(state)?.entry.add(Action::new(action)))
    }

    pub fn remove_entry_action(&self, state: StateId, id: DelegateId) -> Result<bool, ModelError> {
        let model = self.model();
        Ok(model.require_state(state)?.entry.remove(id))
    }

    pub fn add_exit_action<F>(&self, state: StateId, action: F) -> Result<DelegateId, ModelError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let model = self.model();
        Ok(model.require_state(state)?.exit.add(Action::new(action)))
    }

    pub fn remove_exit_action(&self, state: StateId, id: DelegateId) -> Result<bool, ModelError> {
        let model = self.model();
        Ok(model.require_state(state)?.exit.remove(id))
    }

    /// Move a transition to new endpoints.
    ///
    /// Only allowed while the machine is not started. The changed model is
    /// validated as a whole before it replaces the current one.
    pub fn reroute(
        &self,
        transition: TransitionId,
        source: StateId,
        target: StateId,
    ) -> Result<(), ModelError> {
        let mut current = self.inner.model.write();
        if self.status() == RunStatus::Started {
            return Err(ModelError::MachineRunning {
                machine: self.inner.name.clone(),
            });
        }
        let mut model = Model::clone(&current);
        let (name, kind, triggered, guarded) = {
            let t = model.require_transition(transition)?;
            (t.name.clone(), t.kind, !t.triggers.is_empty(), !t.guards.is_empty())
        };
        model.require_state(source)?;
        model.require_state(target)?;
        model.check_transition(&name, kind, source, target, triggered, guarded)?;
        model.detach(transition);
        {
            let t = &mut model.transitions[transition.0];
            t.source = source;
            t.target = target;
        }
        model.attach(transition);
        if let Err(errors) = collect_errors(validate_model(&model)) {
            if let Some(first) = errors.into_iter().next() {
                return Err(first);
            }
        }
        debug!(machine = %self.inner.name, transition = %name, "transition rerouted");
        *current = Arc::new(model);
        Ok(())
    }

    /// View of a submachine state declared in this machine.
    pub fn nested(&self, name: &str) -> Option<NestedMachine> {
        let model = self.model();
        let id = model.find(name)?;
        match model.node(id).kind() {
            StateKind::Composite { machine: true, .. } if id != StateId::ROOT => {
                Some(NestedMachine::new(self.clone(), id, name.to_string()))
            }
            _ => None,
        }
    }
}

impl MachineInner {
    fn is_active(&self, state: StateId) -> bool {
        self.active
            .get(state.index())
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn status(&self) -> RunStatus {
        *self.status.lock()
    }

    fn set_status(&self, status: RunStatus) {
        let mut current = self.status.lock();
        if *current != RunStatus::Terminated {
            *current = status;
        }
    }

    fn addressed(&self, event: Event) -> Event {
        match self.this.upgrade() {
            Some(me) => event.with_destination(me),
            None => event,
        }
    }

    fn trace<'a, I>(&self, kind: TraceKind, tags: I)
    where
        I: IntoIterator<Item = (&'a str, String)>,
    {
        if let Some(log) = self.ctx.trace() {
            log.append(kind, std::iter::once(("machine", self.name.clone())).chain(tags));
        }
    }

    fn post_event(&self, event: Event, priority: bool) -> bool {
        if self.status() == RunStatus::Terminated {
            return false;
        }
        let event = self.addressed(event);
        if event.destination().is_none() {
            return false;
        }
        if event.is_scheduled() {
            let delay = event.delay().unwrap_or(Duration::ZERO);
            let repeat = event.repeat();
            self.schedule(event.without_schedule(), delay, repeat);
            return true;
        }

        let mut counters = self.counters.lock();
        if !event.id().is_reserved() {
            if let Some(limit) = self.limits.lock().event_limit {
                if counters.queued + 1 > limit {
                    drop(counters);
                    self.trip_event_limit(limit, &event);
                    return false;
                }
            }
        }
        counters.queued += 1;
        if !self.thread.enqueue(event, priority) {
            counters.queued -= 1;
            return false;
        }
        true
    }

    fn schedule(&self, event: Event, delay: Duration, repeat: Option<Duration>) -> ActionId {
        let scheduler = self.ctx.scheduler();
        let id = scheduler.schedule(TimerTask::Event(event), delay, repeat);
        let mut scheduled = self.scheduled.lock();
        scheduled.retain(|id| scheduler.is_scheduled(*id));
        scheduled.push(id);
        id
    }

    /// Forget finished deliveries; returns how many remain.
    fn prune_scheduled(&self) -> usize {
        let scheduler = self.ctx.scheduler();
        let mut scheduled = self.scheduled.lock();
        scheduled.retain(|id| scheduler.is_scheduled(*id));
        scheduled.len()
    }

    fn cancel_scheduled(&self) -> usize {
        let scheduler = self.ctx.scheduler();
        let ids = std::mem::take(&mut *self.scheduled.lock());
        ids.into_iter().filter(|id| scheduler.unschedule(*id)).count()
    }

    /// Drop everything queued for this machine.
    fn purge(&self) -> usize {
        let mut counters = self.counters.lock();
        let removed = self.thread.remove_events_for(self.id);
        counters.queued = 0;
        counters.consecutive = 0;
        removed
    }

    fn trip_event_limit(&self, limit: usize, event: &Event) {
        let purged = self.purge();
        self.set_status(RunStatus::Stopped);
        warn!(machine = %self.name, limit, purged, event = %event, "event limit reached, machine stopped");
        self.trace(
            TraceKind::EventLimit,
            [("limit", limit.to_string()), ("purged", purged.to_string())],
        );
        self.event_limit_actions
            .invoke(event, CallbackKind::LimitAction, &self.name, self);
        self.report(Fault::EventLimit {
            machine: self.name.clone(),
            limit,
        });
    }

    fn trip_loop_limit(&self, limit: usize, event: &Event) {
        let purged = self.purge();
        self.set_status(RunStatus::Stopped);
        warn!(machine = %self.name, limit, purged, event = %event, "loop limit reached, machine stopped");
        self.trace(
            TraceKind::LoopLimit,
            [("limit", limit.to_string()), ("purged", purged.to_string())],
        );
        self.loop_limit_actions
            .invoke(event, CallbackKind::LimitAction, &self.name, self);
        self.report(Fault::LoopLimit {
            machine: self.name.clone(),
            limit,
        });
    }

    fn ill_formed(&self, error: ModelError) {
        error!(machine = %self.name, error = %error, "ill-formed model detected at runtime");
        self.purge();
        self.runtime.lock().clear(&self.active);
        self.set_status(RunStatus::Stopped);
        self.report(Fault::IllFormed {
            machine: self.name.clone(),
            error,
        });
    }

    fn process(&self, event: &Event) -> Outcome {
        match event.id() {
            EventId::START => {
                self.set_status(RunStatus::Started);
                info!(machine = %self.name, "started");
                self.trace(TraceKind::Lifecycle, [("event", "start".to_string())]);
                if !self.runtime.lock().entered {
                    self.step(event, false);
                }
                return Outcome::Handled;
            }
            EventId::STOP => {
                self.set_status(RunStatus::Stopped);
                info!(machine = %self.name, "stopped");
                self.trace(TraceKind::Lifecycle, [("event", "stop".to_string())]);
                return Outcome::Handled;
            }
            EventId::RESET => {
                self.runtime.lock().clear(&self.active);
                self.counters.lock().consecutive = 0;
                let cancelled = self.cancel_scheduled();
                info!(machine = %self.name, cancelled, "reset");
                self.trace(TraceKind::Lifecycle, [("event", "reset".to_string())]);
                return Outcome::Handled;
            }
            EventId::TERMINATE => {
                *self.status.lock() = RunStatus::Terminated;
                self.thread.deregister(self.id);
                let purged = self.purge();
                let cancelled = self.cancel_scheduled();
                info!(machine = %self.name, purged, cancelled, "terminated");
                self.trace(TraceKind::Lifecycle, [("event", "terminate".to_string())]);
                self.terminated.send();
                return Outcome::Handled;
            }
            _ => {}
        }

        if self.status() != RunStatus::Started {
            if event.wants_log() {
                debug!(machine = %self.name, event = %event, "event dropped, machine not started");
                self.trace(TraceKind::EventDropped, [("event", event.name().to_string())]);
            }
            return Outcome::Unhandled;
        }
        self.step(event, true)
    }

    /// Enter if needed, dispatch, and follow up on fired transitions.
    fn step(&self, event: &Event, dispatch: bool) -> Outcome {
        let model = Arc::clone(&self.model.read());
        let (result, fired) = {
            let mut runtime = self.runtime.lock();
            let mut interpreter = Interpreter::new(&model, &mut runtime, &self.active, self)
                .with_trace(self.ctx.trace(), self.trace_transitions);
            let result = run_to_completion(&mut interpreter, event, dispatch);
            (result, interpreter.fired())
        };

        match result {
            Err(error) => {
                self.ill_formed(error);
                Outcome::Unhandled
            }
            Ok(handled) => {
                if fired {
                    self.after_fire(event);
                }
                if handled {
                    Outcome::Handled
                } else {
                    if event.wants_log() {
                        debug!(machine = %self.name, event = %event, "no transition for event");
                        self.trace(TraceKind::EventDropped, [("event", event.name().to_string())]);
                    }
                    Outcome::Unhandled
                }
            }
        }
    }

    /// Count the cycle and post a completion event, unless the loop limit
    /// trips.
    fn after_fire(&self, event: &Event) {
        let limit = self.limits.lock().loop_limit;
        let tripped = {
            let mut counters = self.counters.lock();
            counters.consecutive += 1;
            limit.filter(|limit| counters.consecutive >= *limit)
        };
        match tripped {
            Some(limit) => self.trip_loop_limit(limit, event),
            None => {
                self.post_event(Event::completion(), true);
            }
        }
    }
}

fn run_to_completion(
    interpreter: &mut Interpreter<'_>,
    event: &Event,
    dispatch: bool,
) -> Result<bool, ModelError> {
    if !interpreter.is_entered() {
        interpreter.enter_root(event)?;
    }
    if dispatch {
        interpreter.dispatch(event)
    } else {
        Ok(false)
    }
}

impl FaultReporter for MachineInner {
    /// Fault actions first, then the context's exception channel.
    ///
    /// A panicking fault action is itself published to the channel.
    fn report(&self, fault: Fault) {
        for handler in self.fault_actions.snapshot() {
            if let Err(message) = isolate(|| handler(&fault)) {
                error!(machine = %self.name, fault = %fault, panic = %message, "fault action panicked");
                self.ctx.faults().publish(&Fault::Callback {
                    kind: CallbackKind::FaultHandler,
                    origin: self.name.clone(),
                    message,
                });
            }
        }
        self.trace(
            TraceKind::Fault,
            [("fault", fault.label().to_string()), ("message", fault.to_string())],
        );
        self.ctx.faults().publish(&fault);
    }
}

impl EventHandler for MachineInner {
    fn handler_id(&self) -> HandlerId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn post(&self, event: Event) -> bool {
        self.post_event(event, false)
    }

    fn handle_event(&self, event: &Event) -> Outcome {
        {
            let mut counters = self.counters.lock();
            counters.queued = counters.queued.saturating_sub(1);
            counters.dispatcher = Some(thread::current().id());
        }
        let outcome = match isolate(|| self.process(event)) {
            Ok(outcome) => outcome,
            Err(message) => {
                self.report(Fault::Dispatch {
                    handler: self.name.clone(),
                    event: event.name().to_string(),
                    message,
                });
                Outcome::Unhandled
            }
        };
        let mut counters = self.counters.lock();
        counters.dispatcher = None;
        if counters.queued == 0 {
            counters.consecutive = 0;
        }
        self.idle.notify_all();
        outcome
    }

    fn is_terminated(&self) -> bool {
        self.status() == RunStatus::Terminated
    }
}
