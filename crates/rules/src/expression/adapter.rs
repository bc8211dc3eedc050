//! Per-rule evaluation: expression, then frequency cap.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use paywall_core::EventData;

use crate::matcher::{MatchedItem, TriggerRuleOutcome, UnmatchReason, UnmatchedRule};
use crate::occurrence::OccurrenceTracker;
use crate::schema::TriggerRule;

use super::{evaluation_context, ExpressionError, ExpressionEvaluator, RuleAttributesProvider};

/// Turns a single rule into a [`TriggerRuleOutcome`].
///
/// Evaluator failures, timeouts and panics all become
/// `UnmatchedRule(ExpressionError)`; nothing propagates to the caller.
#[derive(Clone)]
pub struct ExpressionEvaluatorAdapter {
    evaluator: Arc<dyn ExpressionEvaluator>,
    attributes: Arc<dyn RuleAttributesProvider>,
    occurrences: OccurrenceTracker,
    timeout: Option<Duration>,
}

impl ExpressionEvaluatorAdapter {
    pub fn new(
        evaluator: Arc<dyn ExpressionEvaluator>,
        attributes: Arc<dyn RuleAttributesProvider>,
        occurrences: OccurrenceTracker,
    ) -> Self {
        Self {
            evaluator,
            attributes,
            occurrences,
            timeout: None,
        }
    }

    /// Bound each expression evaluation; expiry counts as an expression error.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the evaluation context for `event` from the current rule attributes.
    pub async fn context_for(&self, event: &EventData) -> Value {
        let attributes = self.attributes.rule_attributes().await;
        evaluation_context(&attributes, event)
    }

    /// Evaluate one rule, gathering rule attributes first.
    pub async fn evaluate_expression(
        &self,
        rule: &TriggerRule,
        event: &EventData,
    ) -> TriggerRuleOutcome {
        let context = self.context_for(event).await;
        self.evaluate_in_context(rule, event, &context).await
    }

    /// Evaluate one rule against an already-built context.
    pub async fn evaluate_in_context(
        &self,
        rule: &TriggerRule,
        event: &EventData,
        context: &Value,
    ) -> TriggerRuleOutcome {
        if let Some(expression) = rule.active_expression() {
            match self.run_expression(expression, context).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(experiment_id = %rule.experiment_id, "expression evaluated false");
                    return no_match(rule, UnmatchReason::ExpressionFalse);
                }
                Err(e) => {
                    warn!(
                        experiment_id = %rule.experiment_id,
                        expression,
                        error = %e,
                        "expression failed, skipping rule"
                    );
                    return no_match(rule, UnmatchReason::ExpressionError);
                }
            }
        }

        if let Some(occurrence) = &rule.occurrence {
            match self.occurrences.is_within_cap(occurrence, event.created_at).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        experiment_id = %rule.experiment_id,
                        key = %occurrence.key,
                        "occurrence cap exhausted"
                    );
                    return no_match(rule, UnmatchReason::OccurrenceExceeded);
                }
                Err(e) => {
                    warn!(
                        experiment_id = %rule.experiment_id,
                        key = %occurrence.key,
                        error = %e,
                        "occurrence lookup failed, skipping rule"
                    );
                    return no_match(rule, UnmatchReason::ExpressionError);
                }
            }
        }

        TriggerRuleOutcome::Match(MatchedItem {
            rule: rule.clone(),
            unsaved_occurrence: rule.occurrence.clone(),
        })
    }

    /// Run the evaluator on its own task so a panic is contained to this rule.
    ///
    /// The task is aborted if this future is dropped before it finishes.
    async fn run_expression(
        &self,
        expression: &str,
        context: &Value,
    ) -> Result<bool, ExpressionError> {
        let evaluator = Arc::clone(&self.evaluator);
        let expression = expression.to_string();
        let context = context.clone();
        let mut task = AbortOnDrop(tokio::spawn(async move {
            evaluator.evaluate(&expression, &context).await
        }));

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task.0).await {
                Ok(joined) => joined,
                Err(_) => return Err(ExpressionError::Timeout(limit.as_millis() as u64)),
            },
            None => (&mut task.0).await,
        };

        joined.map_err(|e| ExpressionError::Crashed(e.to_string()))?
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn no_match(rule: &TriggerRule, reason: UnmatchReason) -> TriggerRuleOutcome {
    TriggerRuleOutcome::NoMatch(UnmatchedRule::new(rule.clone(), reason))
}

// ── Tests ───────────────────────────────────────────────────────────
