//! Trace record types.
//!
//! Records carry both the monotonic scheduler time, used for ordering, and a
//! wall-clock timestamp for humans reading a persisted trace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Category of a trace record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Lifecycle,
    StateEntered,
    StateExited,
    TransitionFired,
    EventDropped,
    LoopLimit,
    EventLimit,
    SchedulerGap,
    Fault,
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lifecycle => "lifecycle",
            Self::StateEntered => "state_entered",
            Self::StateExited => "state_exited",
            Self::TransitionFired => "transition_fired",
            Self::EventDropped => "event_dropped",
            Self::LoopLimit => "loop_limit",
            Self::EventLimit => "event_limit",
            Self::SchedulerGap => "scheduler_gap",
            Self::Fault => "fault",
        };
        f.write_str(name)
    }
}

/// One structured trace entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Position in submission order, starting at zero for each log.
    pub seq: u64,
    pub kind: TraceKind,
    /// Scheduler time at submission.
    pub time: Duration,
    pub timestamp: DateTime<Utc>,
    pub tags: Vec<(String, String)>,
}

impl TraceRecord {
    /// Value of the first tag named `key`.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
