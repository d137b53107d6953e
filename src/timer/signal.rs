//! Binary wait/notify primitive.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Auto-resetting binary signal.
///
/// `send` latches the signal; the next `wait*` call consumes it. Sending an
/// already latched signal is a no-op, so a waiter never misses a wake-up that
/// happened between its last check and the call to `wait`.
#[derive(Debug, Default)]
pub struct Signal {
    latched: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch the signal and wake one waiter.
    pub fn send(&self) {
        let mut latched = self.latched.lock();
        *latched = true;
        self.cond.notify_one();
    }

    /// Block until the signal is sent, then consume it.
    pub fn wait(&self) {
        let mut latched = self.latched.lock();
        while !*latched {
            self.cond.wait(&mut latched);
        }
        *latched = false;
    }

    /// Block until the signal is sent or `timeout` elapses.
    ///
    /// Returns `true` if the signal was received.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now() + timeout)
    }

    /// Block until the signal is sent or `deadline` passes.
    ///
    /// Returns `true` if the signal was received.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut latched = self.latched.lock();
        while !*latched {
            if self.cond.wait_until(&mut latched, deadline).timed_out() {
                break;
            }
        }
        std::mem::replace(&mut *latched, false)
    }

    /// Clear a pending signal without waiting.
    pub fn reset(&self) {
        *self.latched.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.latched.lock()
    }
}
