//! The exception channel shared by everything in one application context.

use super::{isolate, CallbackKind, Fault, FaultReporter};
use crate::core::{DelegateId, DelegateList};
use std::sync::Arc;
use tracing::error;

/// Callback subscribed to a [`FaultChannel`].
pub type FaultHandler = Arc<dyn Fn(&Fault) + Send + Sync>;

/// Registrable list of "on any framework fault" callbacks.
///
/// Cloning the channel shares the subscriber list.
#[derive(Clone, Default)]
pub struct FaultChannel {
    handlers: DelegateList<FaultHandler>,
}

impl FaultChannel {
    /// An empty channel; publishing only logs until someone subscribes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every fault published from now on.
    pub fn subscribe<F>(&self, handler: F) -> DelegateId
    where
        F: Fn(&Fault) + Send + Sync + 'static,
    {
        self.handlers.add(Arc::new(handler))
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: DelegateId) -> bool {
        self.handlers.remove(id)
    }

    pub fn subscribers(&self) -> usize {
        self.handlers.len()
    }

    /// Deliver `fault` to every subscriber.
    ///
    /// A panicking subscriber is logged and skipped; it never prevents the
    /// remaining subscribers from running.
    pub fn publish(&self, fault: &Fault) {
        error!(fault = %fault, kind = fault.label(), "framework fault");
        for handler in self.handlers.snapshot() {
            if let Err(message) = isolate(|| handler(fault)) {
                error!(
                    fault = %fault,
                    callback = %CallbackKind::FaultHandler,
                    panic = %message,
                    "subscriber panicked"
                );
            }
        }
    }
}

impl FaultReporter for FaultChannel {
    fn report(&self, fault: Fault) {
        self.publish(&fault);
    }
}
