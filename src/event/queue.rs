//! Per-context event queue thread.

use super::handler::{EventHandler, HandlerId};
use super::message::{Event, EventId};
use crate::context::ThreadPriority;
use crate::fault::{isolate, Fault, FaultChannel};
use crate::timer::Signal;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace};

/// A dedicated thread dispatching queued events to their destinations.
///
/// Events are processed strictly in queue order; `enqueue` with `priority`
/// places an event at the front. Cloning shares the thread.
#[derive(Clone)]
pub struct EventThread {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    priority: ThreadPriority,
    queue: Mutex<VecDeque<Event>>,
    handlers: Mutex<Vec<Arc<dyn EventHandler>>>,
    wake: Signal,
    terminating: AtomicBool,
    finished: AtomicBool,
    done: Signal,
    faults: FaultChannel,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl EventThread {
    pub fn spawn(
        name: impl Into<String>,
        priority: ThreadPriority,
        faults: FaultChannel,
    ) -> io::Result<Self> {
        let name = name.into();
        let inner = Arc::new(Inner {
            name: name.clone(),
            priority,
            queue: Mutex::new(VecDeque::new()),
            handlers: Mutex::new(Vec::new()),
            wake: Signal::new(),
            terminating: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            done: Signal::new(),
            faults,
            join: Mutex::new(None),
        });
        let worker = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run(worker))?;
        *inner.join.lock() = Some(handle);
        info!(thread = %name, priority = ?priority, "event thread started");
        Ok(Self { inner })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn priority(&self) -> ThreadPriority {
        self.inner.priority
    }

    /// Append `event` (or prepend it with `priority`) and wake the thread.
    ///
    /// Returns `false` if the event has no destination or the thread has
    /// already exited.
    pub fn enqueue(&self, event: Event, priority: bool) -> bool {
        if event.destination().is_none() || self.inner.finished.load(Ordering::SeqCst) {
            return false;
        }
        if event.wants_log() {
            debug!(thread = %self.inner.name, event = %event, priority, "event queued");
        }
        {
            let mut queue = self.inner.queue.lock();
            if priority {
                queue.push_front(event);
            } else {
                queue.push_back(event);
            }
        }
        self.inner.wake.send();
        true
    }

    pub fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.inner.handlers.lock();
        if !handlers
            .iter()
            .any(|h| h.handler_id() == handler.handler_id())
        {
            debug!(thread = %self.inner.name, handler = handler.name(), "handler registered");
            handlers.push(handler);
        }
    }

    pub fn deregister(&self, id: HandlerId) {
        self.inner.handlers.lock().retain(|h| h.handler_id() != id);
        self.inner.wake.send();
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.lock().len()
    }

    /// `true` if an event with this id (or a copy of it) is queued.
    pub fn has_event(&self, id: EventId) -> bool {
        self.inner.queue.lock().iter().any(|e| e.id() == id)
    }

    /// `true` if an event with this id is queued for `handler`.
    pub fn has_event_for(&self, handler: HandlerId, id: EventId) -> bool {
        self.inner
            .queue
            .lock()
            .iter()
            .any(|e| e.id() == id && destined_for(e, handler))
    }

    pub fn has_events_for(&self, handler: HandlerId) -> bool {
        self.inner
            .queue
            .lock()
            .iter()
            .any(|e| destined_for(e, handler))
    }

    /// Drop every queued event for `handler`; returns how many were removed.
    pub fn remove_events_for(&self, handler: HandlerId) -> usize {
        let mut queue = self.inner.queue.lock();
        let before = queue.len();
        queue.retain(|e| !destined_for(e, handler));
        before - queue.len()
    }

    pub fn len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.queue.lock().is_empty()
    }

    pub fn is_running(&self) -> bool {
        !self.inner.finished.load(Ordering::SeqCst)
    }

    /// Ask every registered handler to terminate, then let the thread exit
    /// once they all have.
    ///
    /// Terminate events queue behind pending work, so the backlog drains in
    /// order first. With `wait`, blocks up to that long for the thread to
    /// exit and reports a [`Fault::TerminateTimeout`] if it does not.
    pub fn terminate(&self, wait: Option<Duration>) -> Result<(), Fault> {
        if !self.inner.terminating.swap(true, Ordering::SeqCst) {
            let handlers: Vec<_> = self.inner.handlers.lock().clone();
            for handler in handlers {
                if !handler.is_terminated() {
                    handler.post(Event::terminate());
                }
            }
            self.inner.wake.send();
        }
        let Some(timeout) = wait else {
            return Ok(());
        };
        if self.inner.finished.load(Ordering::SeqCst) || self.inner.done.wait_timeout(timeout) {
            // The signal is one-shot; keep it latched for other waiters.
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
            name: self.inner.name.clone(),
            timeout,
        };
        self.inner.faults.publish(&fault);
        Err(fault)
    }
}

fn destined_for(event: &Event, handler: HandlerId) -> bool {
    event
        .destination()
        .is_some_and(|d| d.handler_id() == handler)
}

fn run(inner: Arc<Inner>) {
    loop {
        inner.wake.wait();
        loop {
            let next = inner.queue.lock().pop_front();
            let Some(event) = next else {
                break;
            };
            let Some(destination) = event.destination().cloned() else {
                continue;
            };
            trace!(thread = %inner.name, handler = destination.name(), event = %event, "dispatch");
            if let Err(message) = isolate(|| destination.handle_event(&event)) {
                inner.faults.publish(&Fault::Dispatch {
                    handler: destination.name().to_string(),
                    event: event.name().to_string(),
                    message,
                });
            }
        }
        if inner.terminating.load(Ordering::SeqCst)
            && inner.handlers.lock().iter().all(|h| h.is_terminated())
        {
            break;
        }
    }
    let dropped = {
        let mut queue = inner.queue.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    };
    inner.handlers.lock().clear();
    inner.finished.store(true, Ordering::SeqCst);
    info!(thread = %inner.name, dropped, "event thread exited");
    inner.done.send();
}
