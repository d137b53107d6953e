//! Monotonic clock and deadline waits.

use super::signal::Signal;
use std::time::{Duration, Instant};

/// Monotonic time source shared by the scheduler and the trace log.
///
/// Time is expressed as the [`Duration`] elapsed since the clock was created,
/// so every component reading the same clock agrees on "scheduler time".
#[derive(Clone, Copy, Debug)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Current scheduler time.
    pub fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Convert a scheduler time back into an [`Instant`].
    pub fn instant_at(&self, time: Duration) -> Instant {
        self.epoch + time
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocking "wait until deadline or woken early" primitive.
#[derive(Debug)]
pub struct Timer {
    clock: Clock,
    wake: Signal,
}

impl Timer {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            wake: Signal::new(),
        }
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Block until the scheduler time reaches `deadline`, or forever when
    /// `deadline` is `None`.
    ///
    /// Returns `true` when woken early by [`Timer::wake`].
    pub fn wait_until(&self, deadline: Option<Duration>) -> bool {
        match deadline {
            Some(deadline) => {
                if deadline <= self.now() {
                    return false;
                }
                self.wake.wait_until(self.clock.instant_at(deadline))
            }
            None => {
                self.wake.wait();
                true
            }
        }
    }

    /// Interrupt a pending [`Timer::wait_until`].
    pub fn wake(&self) {
        self.wake.send();
    }
}
