//! Frequency-cap policy attached to a trigger rule.

use serde::{Deserialize, Serialize};

/// Frequency cap for a trigger rule.
///
/// `key` names the counter shared by every rule carrying the same key; the
/// rule may fire while fewer than `max_count` occurrences were recorded in
/// `interval`. The same value doubles as the "unsaved occurrence" handed back
/// to the caller after a match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerRuleOccurrence {
    pub key: String,
    pub max_count: u32,
    pub interval: OccurrenceInterval,
}

/// Window over which occurrences are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OccurrenceInterval {
    /// Count every occurrence ever recorded.
    Infinity,
    /// Count occurrences in the trailing `minutes`.
    Minutes { minutes: u32 },
}

impl OccurrenceInterval {
    /// Length of the trailing window, `None` for an unbounded one.
    pub fn window(&self) -> Option<chrono::Duration> {
        match self {
            OccurrenceInterval::Infinity => None,
            OccurrenceInterval::Minutes { minutes } => {
                Some(chrono::Duration::minutes(i64::from(*minutes)))
            }
        }
    }
}
