//! Triggers and their ordered targeting rules.

use serde::{Deserialize, Serialize};

use crate::expression::NativeEvaluator;

use super::{RawExperiment, TriggerRuleOccurrence, VariantOption};

/// Ordered targeting rules activated by one event name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Trigger {
    pub event_name: String,
    /// Evaluated strictly in this order; the first match wins.
    #[serde(default)]
    pub rules: Vec<TriggerRule>,
}

impl Trigger {
    pub fn name(&self) -> &str {
        &self.event_name
    }
}

/// A single targeting rule: an experiment plus the conditions under which it applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerRule {
    pub experiment_id: String,
    pub experiment_group_id: String,
    pub variants: Vec<VariantOption>,
    #[serde(default)]
    pub expression: Option<String>,
    /// Script-flavoured expression, used when `expression` is absent.
    #[serde(default)]
    pub expression_js: Option<String>,
    #[serde(default)]
    pub occurrence: Option<TriggerRuleOccurrence>,
}

impl TriggerRule {
    /// The experiment this rule points at.
    pub fn experiment(&self) -> RawExperiment {
        RawExperiment {
            id: self.experiment_id.clone(),
            group_id: self.experiment_group_id.clone(),
            variants: self.variants.clone(),
        }
    }

    /// The expression to evaluate, preferring `expression` over `expression_js`.
    pub fn active_expression(&self) -> Option<&str> {
        [self.expression.as_deref(), self.expression_js.as_deref()]
            .into_iter()
            .flatten()
            .find(|e| !e.trim().is_empty())
    }

    /// Check the structural invariants of a reachable rule.
    pub fn validate(&self) -> Result<(), String> {
        if self.experiment_id.trim().is_empty() {
            return Err("rule experiment_id must not be empty".to_string());
        }
        if self.experiment_group_id.trim().is_empty() {
            return Err(format!(
                "rule for experiment '{}' has an empty experiment_group_id",
                self.experiment_id
            ));
        }
        if self.variants.is_empty() {
            return Err(format!(
                "rule for experiment '{}' has no variants",
                self.experiment_id
            ));
        }
        if let Some(v) = self.variants.iter().find(|v| v.percentage > 100) {
            return Err(format!(
                "variant '{}' of experiment '{}' has percentage {} (max 100)",
                v.id, self.experiment_id, v.percentage
            ));
        }
        if let Some(occurrence) = &self.occurrence {
            if occurrence.key.trim().is_empty() {
                return Err(format!(
                    "occurrence of experiment '{}' has an empty key",
                    self.experiment_id
                ));
            }
        }
        if let Some(expression) = self.active_expression() {
            NativeEvaluator::new().check(expression).map_err(|e| {
                format!(
                    "rule for experiment '{}' has an invalid expression: {}",
                    self.experiment_id, e
                )
            })?;
        }
        Ok(())
    }

    /// Minimal always-matching holdout rule used throughout the tests.
    #[cfg(test)]
    pub(crate) fn stub() -> Self {
        Self {
            experiment_id: "1".to_string(),
            experiment_group_id: "2".to_string(),
            variants: vec![VariantOption {
                variant_type: super::VariantType::Holdout,
                id: "3".to_string(),
                percentage: 20,
                paywall_id: None,
            }],
            expression: None,
            expression_js: None,
            occurrence: None,
        }
    }
}
