//! Structured trace log, persistence sinks and the debug console.
//!
//! The runtime appends [`TraceRecord`]s for lifecycle changes, state entries
//! and exits, fired transitions, limit trips, scheduler gaps and faults.
//! [`TraceLog::persist`] hands a snapshot to a low-priority writer thread
//! which saves it through a [`TraceSink`].

mod console;
mod error;
mod log;
mod record;
mod sink;

pub use console::DebugSink;
pub use error::TraceError;
pub use log::TraceLog;
pub use record::{TraceKind, TraceRecord};
pub use sink::{FileSink, MemorySink, TraceDocument, TraceFormat, TraceSink, TRACE_VERSION};
