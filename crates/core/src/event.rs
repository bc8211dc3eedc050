use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Unique identifier of a single event occurrence.
pub type EventId = Uuid;

/// Free-form event parameters as supplied by the host application.
pub type EventParameters = Map<String, Value>;

/// An application event handed to the rule engine.
///
/// Identity is per occurrence: two events with the same name and parameters
/// are still distinct, and nothing downstream deduplicates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub id: EventId,
    pub name: String,
    #[serde(default)]
    pub parameters: EventParameters,
    pub created_at: DateTime<Utc>,
}

impl EventData {
    /// Create an event stamped with the current time.
    pub fn new(name: impl Into<String>, parameters: EventParameters) -> Self {
        Self::at(name, parameters, Utc::now())
    }

    /// Create an event with an explicit timestamp (replay, tests).
    pub fn at(
        name: impl Into<String>,
        parameters: EventParameters,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            parameters,
            created_at,
        }
    }

    /// Look up a single parameter by name.
    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }
}
