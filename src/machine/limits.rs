//! Loop and event-flood thresholds.

use serde::{Deserialize, Serialize};

/// Self-protection thresholds of a state machine.
///
/// `None` disables a limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineLimits {
    /// Consecutive transition-producing cycles allowed before the queue
    /// empties.
    pub loop_limit: Option<usize>,
    /// Events allowed to wait in the machine's queue.
    pub event_limit: Option<usize>,
}

impl Default for MachineLimits {
    fn default() -> Self {
        Self {
            loop_limit: Some(1000),
            event_limit: Some(100),
        }
    }
}

impl MachineLimits {
    /// Both limits disabled.
    pub fn unlimited() -> Self {
        Self {
            loop_limit: None,
            event_limit: None,
        }
    }

    pub fn with_loop_limit(self, limit: Option<usize>) -> Self {
        Self {
            loop_limit: limit,
            ..self
        }
    }

    pub fn with_event_limit(self, limit: Option<usize>) -> Self {
        Self {
            event_limit: limit,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let limits = MachineLimits::default();
        assert_eq!(limits.loop_limit, Some(1000));
        assert_eq!(limits.event_limit, Some(100));
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let limits: MachineLimits = serde_json::from_str(r#"{ "event_limit": null }"#).unwrap();
        assert_eq!(limits, MachineLimits::default().with_event_limit(None));
    }
}
