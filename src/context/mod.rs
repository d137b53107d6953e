//! Application context: the runtime services shared by every machine.
//!
//! One [`AppContext`] is created at startup with [`AppContext::start`] and
//! passed to the machines and handlers that need it. It owns the clock, the
//! scheduler thread, the trace log, the debug console, the fault channel and
//! every event thread spawned through it, and tears them down in order in
//! [`AppContext::shutdown`].

mod config;

pub use config::{RuntimeConfig, ThreadPriority, TraceConfig};

use crate::event::EventThread;
use crate::fault::{Fault, FaultChannel};
use crate::timer::{Clock, Scheduler, SchedulerConfig};
use crate::trace::{DebugSink, FileSink, MemorySink, TraceLog, TraceSink};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Errors raised while creating or using an application context.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("failed to spawn thread '{name}': {error}")]
    Spawn {
        name: String,
        #[source]
        error: io::Error,
    },

    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("application context has been shut down")]
    ShutDown,
}

fn spawn_error(name: &str) -> impl FnOnce(io::Error) -> ContextError + '_ {
    move |error| ContextError::Spawn {
        name: name.to_string(),
        error,
    }
}

pub struct AppContext {
    config: RuntimeConfig,
    clock: Clock,
    faults: FaultChannel,
    scheduler: Scheduler,
    trace: Option<TraceLog>,
    console: DebugSink,
    threads: Mutex<Vec<EventThread>>,
    shut_down: AtomicBool,
}

impl AppContext {
    pub fn start(config: RuntimeConfig) -> Result<Arc<Self>, ContextError> {
        let clock = Clock::new();
        let faults = FaultChannel::new();

        let trace = if config.trace.enabled {
            let sink: Arc<dyn TraceSink> = match &config.trace.directory {
                Some(directory) => Arc::new(FileSink::new(directory, config.trace.format)),
                None => Arc::new(MemorySink::new()),
            };
            let log = TraceLog::spawn(config.trace.capacity, clock, sink, faults.clone())
                .map_err(spawn_error("trace-writer"))?;
            Some(log)
        } else {
            None
        };

        let scheduler = Scheduler::spawn(
            SchedulerConfig {
                gap_threshold: config.gap_threshold(),
                priority: config.scheduler_priority,
            },
            clock,
            faults.clone(),
            trace.clone(),
        )
        .map_err(spawn_error("scheduler"))?;

        let console = DebugSink::stderr(config.console_capacity, faults.clone())
            .map_err(spawn_error("debug-console"))?;

        info!(
            trace = config.trace.enabled,
            terminate_timeout_ms = config.terminate_timeout_ms,
            "application context started"
        );
        Ok(Arc::new(Self {
            config,
            clock,
            faults,
            scheduler,
            trace,
            console,
            threads: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        }))
    }

    /// Context with [`RuntimeConfig::default`].
    pub fn with_defaults() -> Result<Arc<Self>, ContextError> {
        Self::start(RuntimeConfig::default())
    }

    pub fn from_json(json: &str) -> Result<Arc<Self>, ContextError> {
        Self::start(RuntimeConfig::from_json(json)?)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Current scheduler time.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn faults(&self) -> &FaultChannel {
        &self.faults
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn trace(&self) -> Option<&TraceLog> {
        self.trace.as_ref()
    }

    pub fn console(&self) -> &DebugSink {
        &self.console
    }

    pub fn terminate_timeout(&self) -> Duration {
        self.config.terminate_timeout()
    }

    /// Spawn an event thread owned by this context.
    pub fn spawn_event_thread(
        &self,
        name: impl Into<String>,
        priority: ThreadPriority,
    ) -> Result<EventThread, ContextError> {
        if self.is_shut_down() {
            return Err(ContextError::ShutDown);
        }
        let name = name.into();
        let thread = EventThread::spawn(name.clone(), priority, self.faults.clone())
            .map_err(spawn_error(&name))?;
        self.threads.lock().push(thread.clone());
        Ok(thread)
    }

    /// Event thread at the configured default priority.
    pub fn event_thread(&self, name: impl Into<String>) -> Result<EventThread, ContextError> {
        self.spawn_event_thread(name, self.config.event_priority)
    }

    pub fn event_threads(&self) -> Vec<EventThread> {
        self.threads.lock().clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Terminate event threads, then the scheduler, the console and the
    /// trace writer, each bounded by the terminate timeout.
    ///
    /// Returns every termination timeout that occurred; calling it again is
    /// a no-op.
    pub fn shutdown(&self) -> Result<(), Vec<Fault>> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let wait = Some(self.terminate_timeout());
        let threads: Vec<EventThread> = self.threads.lock().drain(..).collect();

        let mut timeouts: Vec<Fault> = threads
            .iter()
            .filter_map(|thread| thread.terminate(wait).err())
            .collect();
        timeouts.extend(self.scheduler.terminate(wait).err());
        timeouts.extend(self.console.terminate(wait).err());
        if let Some(trace) = &self.trace {
            timeouts.extend(trace.terminate(wait).err());
        }

        info!(threads = threads.len(), timeouts = timeouts.len(), "application context shut down");
        if timeouts.is_empty() {
            Ok(())
        } else {
            Err(timeouts)
        }
    }
}
