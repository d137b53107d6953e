//! State machine runtime.
//!
//! A built [`StateMachine`] is an event handler registered on an event
//! thread. Each event is handled to completion before the next: transitions
//! are selected innermost first, fired, and followed by a completion event
//! that lets untriggered transitions run.

mod interpreter;
mod limits;
mod nested;
mod state_machine;

pub use limits::MachineLimits;
pub use nested::NestedMachine;
pub use state_machine::{RunStatus, StateMachine};
