//! Runtime configuration loaded once at startup.

use crate::trace::TraceFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Scheduling priority requested for a runtime thread.
///
/// Priorities are recorded per thread and reported in logs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadPriority {
    Lowest,
    BelowNormal,
    #[default]
    Normal,
    AboveNormal,
    Highest,
}

/// Trace log settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub enabled: bool,
    /// Records kept in memory; the oldest are dropped beyond this.
    pub capacity: usize,
    /// Where persisted logs are written. `None` keeps them in memory.
    pub directory: Option<PathBuf>,
    pub format: TraceFormat,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 10_000,
            directory: None,
            format: TraceFormat::Json,
        }
    }
}

/// Settings for an [`AppContext`](super::AppContext).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```rust
/// use statecraft::context::{RuntimeConfig, ThreadPriority};
///
/// let config = RuntimeConfig::from_json(r#"{ "gap_threshold_ms": 10 }"#).unwrap();
/// assert_eq!(config.gap_threshold_ms, 10);
/// assert_eq!(config.scheduler_priority, ThreadPriority::Highest);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Scheduler lateness reported as a gap.
    pub gap_threshold_ms: u64,
    /// Bound on every "wait for termination".
    pub terminate_timeout_ms: u64,
    pub scheduler_priority: ThreadPriority,
    /// Default priority of event threads spawned by the context.
    pub event_priority: ThreadPriority,
    /// Pending writes the debug console accepts before dropping.
    pub console_capacity: usize,
    pub trace: TraceConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gap_threshold_ms: 50,
            terminate_timeout_ms: 5_000,
            scheduler_priority: ThreadPriority::Highest,
            event_priority: ThreadPriority::Normal,
            console_capacity: 256,
            trace: TraceConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn gap_threshold(&self) -> Duration {
        Duration::from_millis(self.gap_threshold_ms)
    }

    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.terminate_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn nested_trace_settings_parse() {
        let config = RuntimeConfig::from_json(
            r#"{
                "event_priority": "above_normal",
                "trace": { "enabled": false, "format": "binary", "directory": "/tmp/traces" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.event_priority, ThreadPriority::AboveNormal);
        assert!(!config.trace.enabled);
        assert_eq!(config.trace.format, TraceFormat::Binary);
        assert_eq!(config.trace.directory, Some(PathBuf::from("/tmp/traces")));
        assert_eq!(config.trace.capacity, 10_000);
    }

    #[test]
    fn round_trips_through_json() {
        let config = RuntimeConfig {
            gap_threshold_ms: 3,
            ..RuntimeConfig::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(RuntimeConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn unknown_priority_is_rejected() {
        assert!(RuntimeConfig::from_json(r#"{ "event_priority": "realtime" }"#).is_err());
    }
}
