//! Ordered, first-match-wins rule matching for a single trigger.
//!
//! Rules are evaluated strictly in declared order. Rule N+1 is not started
//! until rule N's expression and frequency cap are fully known, so rule
//! priority and any time-dependent attributes behave the same on every run.
//! A skipped rule (false expression, exhausted cap, broken expression) never
//! stops the trigger; later rules are still tried.

mod types;

use std::time::Duration;

use tracing::debug;

use paywall_core::EventData;

use crate::expression::ExpressionEvaluatorAdapter;
use crate::schema::Trigger;

pub use types::*;

/// Finds the first matching rule of a trigger.
#[derive(Clone)]
pub struct RuleMatcher {
    adapter: ExpressionEvaluatorAdapter,
}

impl RuleMatcher {
    pub fn new(adapter: ExpressionEvaluatorAdapter) -> Self {
        Self { adapter }
    }

    pub fn with_expression_timeout(self, timeout: Duration) -> Self {
        Self {
            adapter: self.adapter.with_timeout(Some(timeout)),
        }
    }

    /// Evaluate `trigger.rules` in order and stop at the first match.
    ///
    /// Rule attributes are gathered once, so every rule of this evaluation
    /// sees the same context.
    pub async fn find_matching_rule(
        &self,
        event: &EventData,
        trigger: &Trigger,
    ) -> RuleMatchOutcome {
        let context = self.adapter.context_for(event).await;
        let mut unmatched_rules = Vec::new();

        for (index, rule) in trigger.rules.iter().enumerate() {
            match self.adapter.evaluate_in_context(rule, event, &context).await {
                TriggerRuleOutcome::Match(item) => {
                    debug!(
                        event = %event.name,
                        rule_index = index,
                        experiment_id = %item.rule.experiment_id,
                        skipped = unmatched_rules.len(),
                        "rule matched"
                    );
                    return RuleMatchOutcome::Matched(item);
                }
                TriggerRuleOutcome::NoMatch(unmatched) => {
                    debug!(
                        event = %event.name,
                        rule_index = index,
                        experiment_id = %unmatched.rule.experiment_id,
                        reason = %unmatched.reason,
                        "rule not matched"
                    );
                    unmatched_rules.push(unmatched);
                }
            }
        }

        RuleMatchOutcome::NoMatchingRules(unmatched_rules)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
