//! Event destinations.

use super::message::{Event, EventId};
use super::queue::EventThread;
use crate::timer::Signal;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a registered event handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// Result of offering an event to a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Handled,
    Unhandled,
}

impl Outcome {
    pub fn is_handled(self) -> bool {
        matches!(self, Self::Handled)
    }
}

/// Something an [`EventThread`] can deliver events to.
pub trait EventHandler: Send + Sync {
    fn handler_id(&self) -> HandlerId;

    fn name(&self) -> &str;

    /// Queue `event` on this handler's thread. Returns `false` if the handler
    /// refused it (terminated, or a queue limit tripped).
    fn post(&self, event: Event) -> bool;

    /// Process one event. Called on the handler's thread only.
    fn handle_event(&self, event: &Event) -> Outcome;

    fn is_terminated(&self) -> bool;
}

type Callback = Box<dyn Fn(&Event) -> Outcome + Send + Sync>;

/// Lightweight standalone handler that runs a closure for every event.
pub struct CallbackHandler {
    id: HandlerId,
    name: String,
    thread: EventThread,
    callback: Callback,
    terminated: AtomicBool,
    finished: Signal,
    this: Weak<CallbackHandler>,
}

impl CallbackHandler {
    /// Create the handler and register it with `thread`.
    pub fn spawn<F>(name: impl Into<String>, thread: &EventThread, callback: F) -> Arc<Self>
    where
        F: Fn(&Event) -> Outcome + Send + Sync + 'static,
    {
        let handler = Arc::new_cyclic(|this| CallbackHandler {
            id: HandlerId::next(),
            name: name.into(),
            thread: thread.clone(),
            callback: Box::new(callback),
            terminated: AtomicBool::new(false),
            finished: Signal::new(),
            this: this.clone(),
        });
        thread.register(handler.clone());
        handler
    }

    pub fn enqueue(&self, event: Event) -> bool {
        self.post(event)
    }

    /// Queue a terminate event behind any pending work.
    ///
    /// With `wait`, blocks until it has been processed or `wait` elapses and
    /// returns whether termination completed.
    pub fn terminate(&self, wait: Option<Duration>) -> bool {
        if self.is_terminated() {
            return true;
        }
        if !self.post(Event::terminate()) {
            return self.is_terminated();
        }
        match wait {
            Some(timeout) => self.finished.wait_timeout(timeout) || self.is_terminated(),
            None => true,
        }
    }
}

impl EventHandler for CallbackHandler {
    fn handler_id(&self) -> HandlerId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn post(&self, event: Event) -> bool {
        if self.is_terminated() {
            return false;
        }
        let event = match (event.destination().is_some(), self.this.upgrade()) {
            (true, _) => event,
            (false, Some(this)) => event.with_destination(this),
            (false, None) => return false,
        };
        self.thread.enqueue(event, false)
    }

    fn handle_event(&self, event: &Event) -> Outcome {
        if event.id() == EventId::TERMINATE {
            self.terminated.store(true, Ordering::SeqCst);
            self.thread.deregister(self.id);
            debug!(handler = %self.name, "callback handler terminated");
            self.finished.send();
            return Outcome::Handled;
        }
        if self.is_terminated() {
            return Outcome::Unhandled;
        }
        (self.callback)(event)
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ThreadPriority;
    use crate::fault::FaultChannel;
    use parking_lot::Mutex;

    #[test]
    fn callback_handler_receives_events_in_order() {
        let thread = EventThread::spawn("callbacks", ThreadPriority::Normal, FaultChannel::new())
            .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let done = Arc::new(Signal::new());
        let finished = Arc::clone(&done);
        let handler = CallbackHandler::spawn("recorder", &thread, move |event| {
            sink.lock().push(event.name().to_string());
            if event.name() == "C" {
                finished.send();
            }
            Outcome::Handled
        });

        for name in ["A", "B", "C"] {
            assert!(handler.enqueue(Event::new(name)));
        }
        assert!(done.wait_timeout(Duration::from_secs(5)));
        assert_eq!(seen.lock().as_slice(), &["A", "B", "C"]);

        assert!(handler.terminate(Some(Duration::from_secs(5))));
        assert!(handler.is_terminated());
        assert!(!handler.enqueue(Event::new("late")));
        thread.terminate(Some(Duration::from_secs(5))).unwrap();
    }
}
