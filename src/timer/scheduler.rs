//! Time-ordered dispatch of delayed and periodic actions.

use super::clock::{Clock, Timer};
use super::signal::Signal;
use crate::context::ThreadPriority;
use crate::event::Event;
use crate::fault::{isolate, CallbackKind, Fault, FaultChannel};
use crate::trace::{TraceKind, TraceLog};
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle identifying one scheduled action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(u64);

impl ActionId {
    fn next() -> Self {
        Self(NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action-{}", self.0)
    }
}

/// What to do when a scheduled action comes due.
#[derive(Clone)]
pub enum TimerTask {
    /// Send the event to its destination.
    Event(Event),
    /// Run a callback on the scheduler thread.
    Callback(Arc<dyn Fn() + Send + Sync>),
    /// Release a waiter.
    Signal(Arc<Signal>),
}

impl TimerTask {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(f))
    }

    fn describe(&self) -> String {
        match self {
            Self::Event(event) => format!("event '{}'", event.name()),
            Self::Callback(_) => "callback".to_string(),
            Self::Signal(_) => "signal".to_string(),
        }
    }
}

impl fmt::Debug for TimerTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Scheduler settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Lateness above which a firing is reported as a scheduling gap.
    pub gap_threshold: Duration,
    pub priority: ThreadPriority,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            gap_threshold: Duration::from_millis(50),
            priority: ThreadPriority::Highest,
        }
    }
}

struct Pending {
    id: ActionId,
    task: TimerTask,
    execution_time: Duration,
    repeat: Option<Duration>,
}

/// Dedicated thread executing [`TimerTask`]s at their execution time.
///
/// Pending actions are kept sorted by execution time, ties in insertion
/// order. Cloning shares the thread.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    timer: Timer,
    pending: Mutex<Vec<Pending>>,
    config: SchedulerConfig,
    terminating: AtomicBool,
    finished: AtomicBool,
    done: Signal,
    gaps: AtomicU64,
    max_gap: Mutex<Duration>,
    faults: FaultChannel,
    trace: Option<TraceLog>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn spawn(
        config: SchedulerConfig,
        clock: Clock,
        faults: FaultChannel,
        trace: Option<TraceLog>,
    ) -> io::Result<Self> {
        let inner = Arc::new(Inner {
            timer: Timer::new(clock),
            pending: Mutex::new(Vec::new()),
            config,
            terminating: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            done: Signal::new(),
            gaps: AtomicU64::new(0),
            max_gap: Mutex::new(Duration::ZERO),
            faults,
            trace,
            join: Mutex::new(None),
        });
        let worker = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name("scheduler".to_string())
            .spawn(move || run(worker))?;
        *inner.join.lock() = Some(handle);
        info!(priority = ?config.priority, gap_threshold = ?config.gap_threshold, "scheduler started");
        Ok(Self { inner })
    }

    /// Current scheduler time.
    pub fn now(&self) -> Duration {
        self.inner.timer.now()
    }

    pub fn clock(&self) -> Clock {
        self.inner.timer.clock()
    }

    /// Run `task` after `delay`, then every `repeat` if given.
    pub fn schedule(&self, task: TimerTask, delay: Duration, repeat: Option<Duration>) -> ActionId {
        let id = ActionId::next();
        let execution_time = self.now() + delay;
        debug!(%id, task = ?task, ?delay, ?repeat, "action scheduled");
        let at_head = self.inner.insert(Pending {
            id,
            task,
            execution_time,
            repeat: repeat.filter(|r| !r.is_zero()),
        });
        if at_head {
            self.inner.timer.wake();
        }
        id
    }

    /// Remove a pending action. Unscheduling twice is a no-op.
    pub fn unschedule(&self, id: ActionId) -> bool {
        let removed_head = {
            let mut pending = self.inner.pending.lock();
            match pending.iter().position(|p| p.id == id) {
                Some(index) => {
                    pending.remove(index);
                    Some(index == 0)
                }
                None => None,
            }
        };
        if removed_head == Some(true) {
            self.inner.timer.wake();
        }
        removed_head.is_some()
    }

    pub fn is_scheduled(&self, id: ActionId) -> bool {
        self.inner.pending.lock().iter().any(|p| p.id == id)
    }

    pub fn pending(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Number of firings later than the gap threshold.
    pub fn gap_count(&self) -> u64 {
        self.inner.gaps.load(Ordering::Relaxed)
    }

    pub fn max_gap(&self) -> Duration {
        *self.inner.max_gap.lock()
    }

    pub fn is_running(&self) -> bool {
        !self.inner.finished.load(Ordering::SeqCst)
    }

    /// Stop the thread; pending actions are discarded.
    pub fn terminate(&self, wait: Option<Duration>) -> Result<(), Fault> {
        self.inner.terminating.store(true, Ordering::SeqCst);
        self.inner.timer.wake();
        let Some(timeout) = wait else {
            return Ok(());
        };
        if self.inner.finished.load(Ordering::SeqCst) || self.inner.done.wait_timeout(timeout) {
            self.inner.done.send();
            let handle = self.inner.join.lock().take();
            if let Some(handle) = handle {
                if handle.thread().id() != thread::current().id() {
                    let _ = handle.join();
                }
            }
            return Ok(());
        }
        let fault = Fault::TerminateTimeout {
            name: "scheduler".to_string(),
            timeout,
        };
        self.inner.faults.publish(&fault);
        Err(fault)
    }
}

impl Inner {
    /// Insert in execution order; returns `true` if it became the head.
    fn insert(&self, action: Pending) -> bool {
        let mut pending = self.pending.lock();
        let index = pending.partition_point(|p| p.execution_time <= action.execution_time);
        pending.insert(index, action);
        index == 0
    }

    /// Remove everything due at `now`, re-inserting periodic actions.
    fn take_due(&self, now: Duration) -> Vec<(ActionId, TimerTask, Duration)> {
        let mut due = Vec::new();
        let mut pending = self.pending.lock();
        let split = pending.partition_point(|p| p.execution_time <= now);
        let expired: Vec<Pending> = pending.drain(..split).collect();
        // Periodic actions go back under the same lock so an unschedule
        // racing with the firing still finds them.
        for action in expired {
            due.push((action.id, action.task.clone(), action.execution_time));
            if let Some(repeat) = action.repeat {
                let execution_time = now + repeat;
                let index = pending.partition_point(|p| p.execution_time <= execution_time);
                pending.insert(
                    index,
                    Pending {
                        execution_time,
                        ..action
                    },
                );
            }
        }
        due
    }

    fn execute(&self, id: ActionId, task: &TimerTask, target: Duration) {
        let fired = self.timer.now();
        let gap = fired.saturating_sub(target);
        if gap > self.config.gap_threshold {
            self.gaps.fetch_add(1, Ordering::Relaxed);
            {
                let mut max_gap = self.max_gap.lock();
                if gap > *max_gap {
                    *max_gap = gap;
                }
            }
            warn!(%id, task = ?task, ?gap, "scheduling gap exceeded threshold");
            if let Some(trace) = &self.trace {
                trace.append(
                    TraceKind::SchedulerGap,
                    [
                        ("action", id.to_string()),
                        ("task", task.describe()),
                        ("gap_us", gap.as_micros().to_string()),
                    ],
                );
            }
        }
        match task {
            TimerTask::Event(event) => {
                if !event.without_schedule().send() {
                    debug!(%id, event = %event, "scheduled event was refused");
                }
            }
            TimerTask::Signal(signal) => signal.send(),
            TimerTask::Callback(callback) => {
                if let Err(message) = isolate(|| callback()) {
                    self.faults.publish(&Fault::Callback {
                        kind: CallbackKind::TimerCallback,
                        origin: id.to_string(),
                        message,
                    });
                }
            }
        }
    }
}

fn run(inner: Arc<Inner>) {
    while !inner.terminating.load(Ordering::SeqCst) {
        let deadline = inner.pending.lock().first().map(|p| p.execution_time);
        inner.timer.wait_until(deadline);
        if inner.terminating.load(Ordering::SeqCst) {
            break;
        }
        let now = inner.timer.now();
        for (id, task, target) in inner.take_due(now) {
            inner.execute(id, &task, target);
        }
    }
    inner.pending.lock().clear();
    inner.finished.store(true, Ordering::SeqCst);
    info!("scheduler exited");
    inner.done.send();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn() -> Scheduler {
        Scheduler::spawn(
            SchedulerConfig::default(),
            Clock::new(),
            FaultChannel::new(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn signal_fires_after_delay() {
        let scheduler = spawn();
        let signal = Arc::new(Signal::new());
        let started = scheduler.now();
        scheduler.schedule(
            TimerTask::Signal(Arc::clone(&signal)),
            Duration::from_millis(20),
            None,
        );

        assert!(signal.wait_timeout(Duration::from_secs(5)));
        assert!(scheduler.now() - started >= Duration::from_millis(20));
        assert_eq!(scheduler.pending(), 0);
        scheduler.terminate(Some(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn earlier_insert_wakes_the_thread() {
        let scheduler = spawn();
        let late = Arc::new(Signal::new());
        let early = Arc::new(Signal::new());
        scheduler.schedule(TimerTask::Signal(Arc::clone(&late)), Duration::from_secs(60), None);
        scheduler.schedule(
            TimerTask::Signal(Arc::clone(&early)),
            Duration::from_millis(10),
            None,
        );

        assert!(early.wait_timeout(Duration::from_secs(5)));
        assert!(!late.is_set());
        assert_eq!(scheduler.pending(), 1);
        scheduler.terminate(Some(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn unschedule_is_idempotent() {
        let scheduler = spawn();
        let signal = Arc::new(Signal::new());
        let id = scheduler.schedule(
            TimerTask::Signal(Arc::clone(&signal)),
            Duration::from_millis(30),
            None,
        );

        assert!(scheduler.is_scheduled(id));
        assert!(scheduler.unschedule(id));
        assert!(!scheduler.unschedule(id));
        assert!(!signal.wait_timeout(Duration::from_millis(80)));
        scheduler.terminate(Some(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn periodic_action_repeats_until_unscheduled() {
        let scheduler = spawn();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let id = scheduler.schedule(
            TimerTask::callback(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(5),
            Some(Duration::from_millis(5)),
        );

        thread::sleep(Duration::from_millis(100));
        assert!(scheduler.is_scheduled(id));
        assert!(scheduler.unschedule(id));
        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 3, "fired {fired} times");
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), fired);
        scheduler.terminate(Some(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn panicking_callback_is_reported() {
        let faults = FaultChannel::new();
        let reported = Arc::new(Signal::new());
        let sink = Arc::clone(&reported);
        faults.subscribe(move |fault| {
            if matches!(fault, Fault::Callback { kind: CallbackKind::TimerCallback, .. }) {
                sink.send();
            }
        });
        let scheduler =
            Scheduler::spawn(SchedulerConfig::default(), Clock::new(), faults, None).unwrap();
        scheduler.schedule(TimerTask::callback(|| panic!("late")), Duration::ZERO, None);

        assert!(reported.wait_timeout(Duration::from_secs(5)));
        scheduler.terminate(Some(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn late_firing_counts_as_gap() {
        let config = SchedulerConfig {
            gap_threshold: Duration::from_millis(5),
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::spawn(config, Clock::new(), FaultChannel::new(), None).unwrap();
        let done = Arc::new(Signal::new());
        // The first callback hogs the thread so the second one fires late.
        scheduler.schedule(
            TimerTask::callback(|| thread::sleep(Duration::from_millis(40))),
            Duration::ZERO,
            None,
        );
        scheduler.schedule(TimerTask::Signal(Arc::clone(&done)), Duration::ZERO, None);

        assert!(done.wait_timeout(Duration::from_secs(5)));
        assert!(scheduler.gap_count() >= 1);
        assert!(scheduler.max_gap() > Duration::from_millis(5));
        scheduler.terminate(Some(Duration::from_secs(5))).unwrap();
    }
}
