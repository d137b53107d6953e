//! Timing primitives and the scheduler thread.
//!
//! - [`Signal`]: latched binary wait/notify
//! - [`Clock`] and [`Timer`]: monotonic time and deadline waits
//! - [`Scheduler`]: the thread that fires delayed and periodic actions

mod clock;
mod scheduler;
mod signal;

pub use clock::{Clock, Timer};
pub use scheduler::{ActionId, Scheduler, SchedulerConfig, TimerTask};
pub use signal::Signal;
