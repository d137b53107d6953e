//! Guards, actions and the delegate lists that hold them.
//!
//! Guards are predicates that control whether a transition may fire; actions
//! are procedures run on entry, exit or while a transition fires. Both live in
//! ordered, lock-protected [`DelegateList`]s that are snapshotted before
//! invocation, so a callback can register or remove callbacks on the list that
//! is currently running without corrupting the iteration.

use crate::event::Event;
use crate::fault::{isolate, CallbackError, CallbackKind, Fault, FaultReporter};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_DELEGATE_ID: AtomicU64 = AtomicU64::new(1);

/// Registration handle returned by [`DelegateList::add`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DelegateId(u64);

impl DelegateId {
    fn next() -> Self {
        Self(NEXT_DELEGATE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Ordered, shareable collection of callbacks.
///
/// Cloning a list shares its entries.
pub struct DelegateList<T> {
    entries: Arc<Mutex<Vec<(DelegateId, T)>>>,
}

impl<T> Clone for DelegateList<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for DelegateList<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T> fmt::Debug for DelegateList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateList")
            .field("len", &self.entries.lock().len())
            .finish()
    }
}

impl<T: Clone> DelegateList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, delegate: T) -> DelegateId {
        let id = DelegateId::next();
        self.entries.lock().push((id, delegate));
        id
    }

    /// Remove a delegate; returns `false` if it was not registered.
    pub fn remove(&self, id: DelegateId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of the current delegates, in registration order.
    pub fn snapshot(&self) -> Vec<T> {
        self.entries
            .lock()
            .iter()
            .map(|(_, delegate)| delegate.clone())
            .collect()
    }
}

/// Predicate that determines if a transition can fire for an event.
///
/// # Example
///
/// ```rust
/// use statecraft::core::Guard;
/// use statecraft::event::Event;
///
/// let only_named = Guard::new(|event: &Event| event.name() == "Go");
///
/// assert!(only_named.check(&Event::new("Go")));
/// assert!(!only_named.check(&Event::new("Stop")));
/// ```
#[derive(Clone)]
pub struct Guard {
    predicate: Arc<dyn Fn(&Event) -> bool + Send + Sync>,
}

impl Guard {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        Guard {
            predicate: Arc::new(predicate),
        }
    }

    pub fn check(&self, event: &Event) -> bool {
        (self.predicate)(event)
    }
}

/// Procedure run on entry, exit, or transition firing.
#[derive(Clone)]
pub struct Action {
    procedure: Arc<dyn Fn(&Event) -> Result<(), CallbackError> + Send + Sync>,
}

impl Action {
    /// Wrap an infallible procedure.
    pub fn new<F>(procedure: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        Action {
            procedure: Arc::new(move |event| {
                procedure(event);
                Ok(())
            }),
        }
    }

    /// Wrap a procedure whose errors are reported as callback faults.
    pub fn fallible<F, E>(procedure: F) -> Self
    where
        F: Fn(&Event) -> Result<(), E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        Action {
            procedure: Arc::new(move |event| {
                procedure(event).map_err(|e| CallbackError::new(e.to_string()))
            }),
        }
    }

    pub fn run(&self, event: &Event) -> Result<(), CallbackError> {
        (self.procedure)(event)
    }
}

pub type GuardList = DelegateList<Guard>;
pub type ActionList = DelegateList<Action>;

impl GuardList {
    /// Evaluate every guard; the list passes only if all of them pass.
    ///
    /// A panicking guard counts as `false` and is reported, but its siblings
    /// are still evaluated.
    pub fn evaluate(&self, event: &Event, origin: &str, faults: &dyn FaultReporter) -> bool {
        let mut passed = true;
        for guard in self.snapshot() {
            match isolate(|| guard.check(event)) {
                Ok(result) => passed &= result,
                Err(message) => {
                    passed = false;
                    faults.report(Fault::Callback {
                        kind: CallbackKind::Guard,
                        origin: origin.to_string(),
                        message,
                    });
                }
            }
        }
        passed
    }
}

impl ActionList {
    /// Run every action in order, reporting failures of individual actions.
    pub fn invoke(
        &self,
        event: &Event,
        kind: CallbackKind,
        origin: &str,
        faults: &dyn FaultReporter,
    ) {
        for action in self.snapshot() {
            let message = match isolate(|| action.run(event)) {
                Ok(Ok(())) => continue,
                Ok(Err(error)) => error.0,
                Err(panic) => panic,
            };
            faults.report(Fault::Callback {
                kind,
                origin: origin.to_string(),
                message,
            });
        }
    }
}
