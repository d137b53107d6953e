//! Statecraft: hierarchical state machines with run-to-completion semantics
//!
//! Machines are described with a builder (states, orthogonal regions,
//! pseudostates and guarded transitions), validated as a whole, and then run
//! as event handlers on dedicated event threads. A scheduler thread delivers
//! delayed and repeating events, and every fault a callback raises is routed
//! to an exception channel instead of unwinding through the runtime.
//!
//! # Core Concepts
//!
//! - **Model**: an arena of states, regions and transitions addressed by ids
//! - **Transitions**: internal, local, external and fork-join links, always
//!   preferred in that order on the same state
//! - **Pseudostates**: initial, choice, shallow/deep history and fork-join
//! - **Context**: [`AppContext`] owns the scheduler, the trace log and the
//!   event threads of one application
//!
//! # Example
//!
//! ```rust
//! use statecraft::{AppContext, Event, StateMachineBuilder, TransitionBuilder};
//! use std::time::Duration;
//!
//! let ctx = AppContext::with_defaults().unwrap();
//! let thread = ctx.event_thread("door").unwrap();
//! let (open, close) = (Event::new("Open"), Event::new("Close"));
//!
//! let mut builder = StateMachineBuilder::new("Door");
//! let root = builder.root();
//! let closed = builder.state("Closed", root).unwrap();
//! let opened = builder.state("Opened", root).unwrap();
//! let init = builder.initial("Init", root).unwrap();
//! builder.transition(TransitionBuilder::external(init, closed)).unwrap();
//! builder.transition(TransitionBuilder::external(closed, opened).trigger(&open)).unwrap();
//! builder.transition(TransitionBuilder::external(opened, closed).trigger(&close)).unwrap();
//!
//! let door = builder.build(&ctx, &thread).unwrap();
//! door.start();
//! door.enqueue(open.clone());
//! assert!(door.wait_idle(Duration::from_secs(5)));
//! assert!(door.is_active(opened));
//!
//! ctx.shutdown().unwrap();
//! ```

pub mod builder;
pub mod context;
pub mod core;
pub mod event;
pub mod fault;
pub mod machine;
pub mod timer;
pub mod trace;

// Re-export commonly used types
pub use builder::{BuildError, ModelError, StateMachineBuilder, TransitionBuilder};
pub use context::{AppContext, RuntimeConfig, ThreadPriority};
pub use core::{StateId, TransitionId};
pub use event::{Event, EventHandler, EventThread};
pub use fault::{Fault, FaultChannel};
pub use machine::{MachineLimits, NestedMachine, RunStatus, StateMachine};
