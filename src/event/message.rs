//! Named, identity-bearing messages.

use super::handler::EventHandler;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// First id handed out to user events; everything below is reserved.
const FIRST_USER_ID: u64 = 64;

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(FIRST_USER_ID);

/// Event identity.
///
/// Ids are assigned monotonically when an event is created. Copies made with
/// [`Event::with_data`] and friends keep the id of their origin, so trigger
/// matching treats them as the same event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(u64);

impl EventId {
    pub const START: EventId = EventId(1);
    pub const STOP: EventId = EventId(2);
    pub const TERMINATE: EventId = EventId(3);
    pub const RESET: EventId = EventId(4);
    /// Internal run-to-completion continuation.
    pub const COMPLETION: EventId = EventId(5);

    fn next() -> Self {
        Self(NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// Start, stop, terminate and reset.
    pub fn is_lifecycle(self) -> bool {
        (Self::START.0..=Self::RESET.0).contains(&self.0)
    }

    pub fn is_reserved(self) -> bool {
        self.0 < FIRST_USER_ID
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Typed payload carried by a data event.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// A message routed to an [`EventHandler`].
///
/// Events are cheap to clone. The optional payload, source, destination and
/// scheduling parameters are per-copy; the id is shared by all copies.
///
/// ```rust
/// use statecraft::event::Event;
///
/// let reading = Event::new("Reading");
/// let hot = reading.with_data(90_u32);
/// let cold = reading.with_data(-5_i32);
///
/// assert!(hot.is_same(&cold));
/// assert_eq!(hot.data::<u32>(), Some(&90));
/// assert_eq!(cold.data::<u32>(), None);
/// ```
#[derive(Clone)]
pub struct Event {
    id: EventId,
    name: Arc<str>,
    source: Option<Arc<str>>,
    data: Option<Payload>,
    destination: Option<Arc<dyn EventHandler>>,
    delay: Option<Duration>,
    repeat: Option<Duration>,
    log: bool,
}

impl Event {
    /// Define a new event with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(EventId::next(), name.into())
    }

    fn with_id(id: EventId, name: String) -> Self {
        Self {
            id,
            name: Arc::from(name),
            source: None,
            data: None,
            destination: None,
            delay: None,
            repeat: None,
            log: false,
        }
    }

    pub(crate) fn start() -> Self {
        Self::with_id(EventId::START, "Start".to_string())
    }

    pub(crate) fn stop() -> Self {
        Self::with_id(EventId::STOP, "Stop".to_string())
    }

    pub(crate) fn terminate() -> Self {
        Self::with_id(EventId::TERMINATE, "Terminate".to_string())
    }

    pub(crate) fn reset() -> Self {
        Self::with_id(EventId::RESET, "Reset".to_string())
    }

    pub(crate) fn completion() -> Self {
        Self::with_id(EventId::COMPLETION, "Completion".to_string())
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` if both events share an id (copies of the same event).
    pub fn is_same(&self, other: &Event) -> bool {
        self.id == other.id
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(Arc::from(source.into()));
        self
    }

    /// Copy of this event carrying `data`.
    pub fn with_data<T: Any + Send + Sync>(&self, data: T) -> Self {
        let mut copy = self.clone();
        copy.data = Some(Arc::new(data));
        copy
    }

    /// Typed view of the payload, if present and of type `T`.
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.as_deref().and_then(|data| data.downcast_ref::<T>())
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn destination(&self) -> Option<&Arc<dyn EventHandler>> {
        self.destination.as_ref()
    }

    pub fn with_destination(mut self, destination: Arc<dyn EventHandler>) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Deliver after `delay` instead of immediately.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Redeliver every `interval` after the first delivery.
    pub fn with_repeat(mut self, interval: Duration) -> Self {
        self.repeat = Some(interval);
        self
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    pub fn repeat(&self) -> Option<Duration> {
        self.repeat
    }

    pub fn is_scheduled(&self) -> bool {
        self.delay.is_some() || self.repeat.is_some()
    }

    /// This copy without scheduling parameters, as delivered by the scheduler.
    pub(crate) fn without_schedule(&self) -> Self {
        let mut copy = self.clone();
        copy.delay = None;
        copy.repeat = None;
        copy
    }

    /// Ask handlers to trace this event when it is queued or dropped.
    pub fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn wants_log(&self) -> bool {
        self.log
    }

    /// Post to the destination handler; `false` without a destination or
    /// when the destination refuses the event.
    pub fn send(self) -> bool {
        match self.destination.clone() {
            Some(destination) => destination.post(self),
            None => false,
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("source", &self.source)
            .field("has_data", &self.data.is_some())
            .field("destination", &self.destination.as_ref().map(|d| d.name().to_string()))
            .field("delay", &self.delay)
            .field("repeat", &self.repeat)
            .finish()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_events_get_distinct_user_ids() {
        let a = Event::new("A");
        let b = Event::new("B");
        assert_ne!(a.id(), b.id());
        assert!(!a.id().is_reserved());
        assert!(b.id() > a.id());
    }

    #[test]
    fn copies_share_identity() {
        let event = Event::new("Reading");
        let copy = event.with_data(3_u8).with_source("sensor");
        assert!(copy.is_same(&event));
        assert_eq!(copy, event);
        assert_eq!(copy.source(), Some("sensor"));
        assert!(!event.has_data());
    }

    #[test]
    fn lifecycle_ids_are_reserved() {
        for event in [Event::start(), Event::stop(), Event::terminate(), Event::reset()] {
            assert!(event.id().is_lifecycle());
            assert!(event.id().is_reserved());
        }
        assert!(!Event::completion().id().is_lifecycle());
        assert!(Event::completion().id().is_reserved());
    }

    #[test]
    fn schedule_parameters_are_stripped_for_delivery() {
        let event = Event::new("Tick")
            .with_delay(Duration::from_millis(5))
            .with_repeat(Duration::from_millis(10));
        assert!(event.is_scheduled());
        let delivered = event.without_schedule();
        assert!(!delivered.is_scheduled());
        assert!(delivered.is_same(&event));
    }

    #[test]
    fn send_without_destination_fails() {
        assert!(!Event::new("Lost").send());
    }
}
