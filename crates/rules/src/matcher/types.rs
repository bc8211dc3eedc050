//! Per-rule match results.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schema::{TriggerRule, TriggerRuleOccurrence};

/// A rule whose expression matched and whose frequency cap allows a fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedItem {
    pub rule: TriggerRule,
    /// Counter increment the caller applies once the result is actually used.
    pub unsaved_occurrence: Option<TriggerRuleOccurrence>,
}

/// Why a rule did not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchReason {
    ExpressionFalse,
    OccurrenceExceeded,
    ExpressionError,
}

impl fmt::Display for UnmatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmatchReason::ExpressionFalse => write!(f, "expression_false"),
            UnmatchReason::OccurrenceExceeded => write!(f, "occurrence_exceeded"),
            UnmatchReason::ExpressionError => write!(f, "expression_error"),
        }
    }
}

/// A rule that was tried and skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedRule {
    pub rule: TriggerRule,
    pub reason: UnmatchReason,
}

impl UnmatchedRule {
    pub fn new(rule: TriggerRule, reason: UnmatchReason) -> Self {
        Self { rule, reason }
    }
}

/// Outcome of evaluating one rule.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerRuleOutcome {
    Match(MatchedItem),
    NoMatch(UnmatchedRule),
}

/// Outcome of evaluating a whole trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleMatchOutcome {
    Matched(MatchedItem),
    /// Every rule, in declared order, with its reason.
    NoMatchingRules(Vec<UnmatchedRule>),
}
