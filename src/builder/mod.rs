//! Builder API for state machine construction.
//!
//! [`StateMachineBuilder`] assembles the topology (states, regions,
//! pseudostates) and [`TransitionBuilder`] describes one transition with a
//! fluent API. Building validates the whole model and reports every
//! ill-formed-model defect at once.

pub mod error;
pub mod machine;
pub mod macros;
pub mod transition;
pub(crate) mod validate;

pub use error::{BuildError, ModelError};
pub use machine::{Parent, StateMachineBuilder};
pub use transition::TransitionBuilder;
