//! Trigger document: the file-level container loaded from YAML or JSON.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{CommonMetadata, Trigger};

/// The only document kind this crate understands.
pub const TRIGGERS_KIND: &str = "Triggers";

/// A file of triggers, keyed by event name once loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TriggerDocument {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: CommonMetadata,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

impl TriggerDocument {
    /// Check document-level invariants and every rule within it.
    pub fn validate(&self) -> Result<(), String> {
        if self.kind != TRIGGERS_KIND {
            return Err(format!(
                "unknown document kind: '{}' (expected '{}')",
                self.kind, TRIGGERS_KIND
            ));
        }
        if self.metadata.id.trim().is_empty() {
            return Err("document metadata.id must not be empty".to_string());
        }

        let mut seen = HashSet::new();
        for trigger in &self.triggers {
            if trigger.event_name.trim().is_empty() {
                return Err("trigger event_name must not be empty".to_string());
            }
            if !seen.insert(trigger.event_name.as_str()) {
                return Err(format!(
                    "duplicate trigger for event '{}'",
                    trigger.event_name
                ));
            }
            for rule in &trigger.rules {
                rule.validate()
                    .map_err(|e| format!("trigger '{}': {}", trigger.event_name, e))?;
            }
        }
        Ok(())
    }

    /// Event names defined by this document, in declared order.
    pub fn event_names(&self) -> Vec<&str> {
        self.triggers.iter().map(|t| t.event_name.as_str()).collect()
    }

    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
