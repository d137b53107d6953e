//! Events, event handlers and the threads that deliver events to them.
//!
//! - [`Event`]: a named message with a shared identity and optional payload
//! - [`EventHandler`]: a destination that owns a queue on some [`EventThread`]
//! - [`EventThread`]: a dedicated thread processing one queue in order
//! - [`CallbackHandler`]: a closure-backed handler for lightweight consumers

mod handler;
mod message;
mod queue;

pub use handler::{CallbackHandler, EventHandler, HandlerId, Outcome};
pub use message::{Event, EventId, Payload};
pub use queue::EventThread;
