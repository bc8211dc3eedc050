//! Rule logic facade: event → trigger → matched rule → variant → result.
//!
//! One call walks `TriggerLookup → RuleMatching → AssignmentResolution →
//! Classified` exactly once and returns every outcome as data. Nothing is
//! written during evaluation; the caller applies the returned confirmable
//! assignment and unsaved occurrence through [`RuleLogic::confirm_assignment`]
//! and [`RuleLogic::commit_occurrence`] once the result was actually used.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use paywall_core::{EventData, Result};

use crate::assignment::{
    resolve_assignment, AssignmentError, AssignmentStore, Assignments, UnconfirmedAssignments,
};
use crate::expression::{ExpressionEvaluator, ExpressionEvaluatorAdapter, RuleAttributesProvider};
use crate::matcher::{RuleMatchOutcome, RuleMatcher, UnmatchReason, UnmatchedRule};
use crate::occurrence::{OccurrenceStore, OccurrenceTracker};
use crate::schema::{
    AssignmentPostback, ConfirmableAssignment, Experiment, Trigger, TriggerRuleOccurrence,
    VariantType,
};

// ── Outcome types ───────────────────────────────────────────────────

/// Terminal result of evaluating one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum TriggerResult {
    /// No trigger is configured for the event name.
    EventNotFound,
    /// A trigger exists but none of its rules matched.
    NoRuleMatch(Vec<UnmatchedRule>),
    /// The user is held out of the experiment; show nothing.
    Holdout(Experiment),
    /// Show the assigned variant's paywall.
    Paywall(Experiment),
    Error(EvaluationError),
}

/// Recoverable evaluation failures, reported as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationError {
    #[error("experiment '{experiment_id}' has no variant provisioned")]
    ExperimentNotProvisioned { experiment_id: String },

    #[error("failed to read confirmed assignments: {0}")]
    Storage(String),
}

impl From<AssignmentError> for EvaluationError {
    fn from(e: AssignmentError) -> Self {
        match e {
            AssignmentError::ExperimentNotProvisioned { experiment_id } => {
                EvaluationError::ExperimentNotProvisioned { experiment_id }
            }
        }
    }
}

/// Everything one evaluation produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluationOutcome {
    pub confirmable_assignment: Option<ConfirmableAssignment>,
    pub unsaved_occurrence: Option<TriggerRuleOccurrence>,
    pub trigger_result: TriggerResult,
}

impl RuleEvaluationOutcome {
    fn terminal(trigger_result: TriggerResult) -> Self {
        Self {
            confirmable_assignment: None,
            unsaved_occurrence: None,
            trigger_result,
        }
    }

    /// The resolved experiment, for `Holdout` and `Paywall` results.
    pub fn experiment(&self) -> Option<&Experiment> {
        match &self.trigger_result {
            TriggerResult::Holdout(e) | TriggerResult::Paywall(e) => Some(e),
            _ => None,
        }
    }
}

// ── Facade ──────────────────────────────────────────────────────────

/// Evaluates events against the current trigger table.
///
/// Holds no mutable state of its own; every collaborator is injected and
/// owned by the host.
#[derive(Clone)]
pub struct RuleLogic {
    matcher: RuleMatcher,
    assignments: Arc<dyn AssignmentStore>,
    occurrences: OccurrenceTracker,
}

impl RuleLogic {
    pub fn new(
        evaluator: Arc<dyn ExpressionEvaluator>,
        attributes: Arc<dyn RuleAttributesProvider>,
        assignments: Arc<dyn AssignmentStore>,
        occurrences: Arc<dyn OccurrenceStore>,
    ) -> Self {
        let occurrences = OccurrenceTracker::new(occurrences);
        let adapter = ExpressionEvaluatorAdapter::new(evaluator, attributes, occurrences.clone());
        Self {
            matcher: RuleMatcher::new(adapter),
            assignments,
            occurrences,
        }
    }

    /// Bound each rule's expression evaluation; expiry skips the rule as an
    /// expression error.
    pub fn with_expression_timeout(mut self, timeout: Duration) -> Self {
        self.matcher = self.matcher.with_expression_timeout(timeout);
        self
    }

    /// Evaluate one event against `triggers`.
    ///
    /// `unconfirmed` is the provisional-assignment snapshot taken by the caller.
    pub async fn evaluate_rules(
        &self,
        event: &EventData,
        triggers: &HashMap<String, Trigger>,
        unconfirmed: &Assignments,
    ) -> RuleEvaluationOutcome {
        let trigger = match triggers.get(&event.name) {
            Some(t) => t,
            None => {
                info!(event = %event.name, "no trigger for event");
                return RuleEvaluationOutcome::terminal(TriggerResult::EventNotFound);
            }
        };

        let matched = match self.matcher.find_matching_rule(event, trigger).await {
            RuleMatchOutcome::Matched(item) => item,
            RuleMatchOutcome::NoMatchingRules(unmatched) => {
                info!(
                    event = %event.name,
                    rules = unmatched.len(),
                    expression_false = count_reason(&unmatched, UnmatchReason::ExpressionFalse),
                    occurrence_exceeded =
                        count_reason(&unmatched, UnmatchReason::OccurrenceExceeded),
                    expression_error = count_reason(&unmatched, UnmatchReason::ExpressionError),
                    "no rule matched"
                );
                return RuleEvaluationOutcome::terminal(TriggerResult::NoRuleMatch(unmatched));
            }
        };

        let rule = &matched.rule;
        let confirmed = match self.assignments.confirmed_assignments().await {
            Ok(c) => c,
            Err(e) => {
                warn!(event = %event.name, error = %e, "could not read confirmed assignments");
                return RuleEvaluationOutcome::terminal(TriggerResult::Error(
                    EvaluationError::Storage(e.to_string()),
                ));
            }
        };

        let resolved = match resolve_assignment(rule, &confirmed, unconfirmed) {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    event = %event.name,
                    experiment_id = %rule.experiment_id,
                    error = %e,
                    "assignment resolution failed"
                );
                return RuleEvaluationOutcome::terminal(TriggerResult::Error(e.into()));
            }
        };

        let experiment = Experiment {
            id: rule.experiment_id.clone(),
            group_id: rule.experiment_group_id.clone(),
            variant: resolved.variant,
        };

        info!(
            event = %event.name,
            experiment_id = %experiment.id,
            variant_id = %experiment.variant.id,
            variant_type = %experiment.variant.variant_type,
            confirmable = resolved.confirmable_assignment.is_some(),
            "rule matched"
        );

        let trigger_result = match experiment.variant.variant_type {
            VariantType::Holdout => TriggerResult::Holdout(experiment),
            VariantType::Treatment => TriggerResult::Paywall(experiment),
        };

        RuleEvaluationOutcome {
            confirmable_assignment: resolved.confirmable_assignment,
            unsaved_occurrence: matched.unsaved_occurrence,
            trigger_result,
        }
    }

    /// Persist the outcome's confirmable assignment, if any.
    ///
    /// Drops the experiment from the unconfirmed cache and returns the payload
    /// to post to the confirmation endpoint.
    pub async fn confirm_assignment(
        &self,
        outcome: &RuleEvaluationOutcome,
        unconfirmed: &UnconfirmedAssignments,
    ) -> Result<Option<AssignmentPostback>> {
        let confirmable = match &outcome.confirmable_assignment {
            Some(c) => c,
            None => return Ok(None),
        };

        self.assignments.confirm(confirmable).await?;
        unconfirmed.remove(&confirmable.experiment_id);

        let mut postback = AssignmentPostback::default();
        postback.add(confirmable.to_assignment());
        info!(
            experiment_id = %confirmable.experiment_id,
            variant_id = %confirmable.variant.id,
            "assignment confirmed"
        );
        Ok(Some(postback))
    }

    /// Record the outcome's unsaved occurrence. Call at most once per used outcome.
    pub async fn commit_occurrence(
        &self,
        outcome: &RuleEvaluationOutcome,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        match &outcome.unsaved_occurrence {
            Some(occurrence) => {
                self.occurrences.commit(occurrence, at).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn count_reason(unmatched: &[UnmatchedRule], reason: UnmatchReason) -> usize {
    unmatched.iter().filter(|u| u.reason == reason).count()
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::InMemoryAssignmentStore;
    use crate::expression::{ExpressionError, NativeEvaluator, StaticAttributes};
    use crate::occurrence::InMemoryOccurrenceStore;
    use crate::schema::{OccurrenceInterval, TriggerRule, Variant, VariantOption};
    use chrono::TimeZone;
    use paywall_core::PaywallError;
    use serde_json::Map;

    struct Harness {
        logic: RuleLogic,
        store: Arc<InMemoryAssignmentStore>,
    }

    fn harness(confirmed: Assignments) -> Harness {
        let store = Arc::new(InMemoryAssignmentStore::with_assignments(confirmed));
        let logic = RuleLogic::new(
            Arc::new(NativeEvaluator::new()),
            Arc::new(StaticAttributes::default()),
            store.clone(),
            Arc::new(InMemoryOccurrenceStore::new()),
        );
        Harness { logic, store }
    }

    fn app_open_rule() -> TriggerRule {
        TriggerRule {
            experiment_id: "1".to_string(),
            experiment_group_id: "2".to_string(),
            variants: vec![VariantOption {
                variant_type: VariantType::Holdout,
                id: "h1".to_string(),
                percentage: 50,
                paywall_id: None,
            }],
            expression: Some("true".to_string()),
            expression_js: None,
            occurrence: None,
        }
    }

    fn triggers(rule: TriggerRule) -> HashMap<String, Trigger> {
        let mut map = HashMap::new();
        map.insert(
            "app_open".to_string(),
            Trigger {
                event_name: "app_open".to_string(),
                rules: vec![rule],
            },
        );
        map
    }

    fn event(name: &str) -> EventData {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap();
        EventData::at(name, Map::new(), ts)
    }

    fn single(id: &str, variant: Variant) -> Assignments {
        let mut map = Assignments::new();
        map.insert(id.to_string(), variant);
        map
    }

    #[tokio::test]
    async fn unknown_event_is_event_not_found() {
        let h = harness(Assignments::new());
        let outcome = h
            .logic
            .evaluate_rules(
                &event("settings_open"),
                &triggers(app_open_rule()),
                &Assignments::new(),
            )
            .await;
        assert_eq!(outcome.trigger_result, TriggerResult::EventNotFound);
        assert_eq!(outcome.confirmable_assignment, None);
        assert_eq!(outcome.unsaved_occurrence, None);
    }

    #[tokio::test]
    async fn unconfirmed_holdout_is_confirmable() {
        let h = harness(Assignments::new());
        let unconfirmed = single("1", Variant::holdout("h1"));
        let outcome = h
            .logic
            .evaluate_rules(&event("app_open"), &triggers(app_open_rule()), &unconfirmed)
            .await;

        let expected = Experiment {
            id: "1".to_string(),
            group_id: "2".to_string(),
            variant: Variant::holdout("h1"),
        };
        assert_eq!(outcome.trigger_result, TriggerResult::Holdout(expected.clone()));
        assert_eq!(outcome.experiment(), Some(&expected));
        assert_eq!(
            outcome.confirmable_assignment,
            Some(ConfirmableAssignment {
                experiment_id: "1".to_string(),
                variant: Variant::holdout("h1"),
            })
        );
    }

    #[tokio::test]
    async fn confirmed_treatment_is_paywall() {
        let h = harness(single("1", Variant::treatment("t1", None)));
        let unconfirmed = single("1", Variant::holdout("h1"));
        let outcome = h
            .logic
            .evaluate_rules(&event("app_open"), &triggers(app_open_rule()), &unconfirmed)
            .await;

        assert_eq!(
            outcome.trigger_result,
            TriggerResult::Paywall(Experiment {
                id: "1".to_string(),
                group_id: "2".to_string(),
                variant: Variant::treatment("t1", None),
            })
        );
        assert_eq!(outcome.confirmable_assignment, None);
    }

    #[tokio::test]
    async fn unprovisioned_experiment_is_error() {
        let h = harness(Assignments::new());
        let outcome = h
            .logic
            .evaluate_rules(&event("app_open"), &triggers(app_open_rule()), &Assignments::new())
            .await;
        assert_eq!(
            outcome.trigger_result,
            TriggerResult::Error(EvaluationError::ExperimentNotProvisioned {
                experiment_id: "1".to_string()
            })
        );
    }

    #[tokio::test]
    async fn no_rule_match_carries_reasons() {
        let h = harness(Assignments::new());
        let mut rule = app_open_rule();
        rule.expression = Some("false".to_string());
        let outcome = h
            .logic
            .evaluate_rules(&event("app_open"), &triggers(rule.clone()), &Assignments::new())
            .await;
        assert_eq!(
            outcome.trigger_result,
            TriggerResult::NoRuleMatch(vec![UnmatchedRule::new(
                rule,
                UnmatchReason::ExpressionFalse
            )])
        );
    }

    #[tokio::test]
    async fn storage_failure_is_reported_as_data() {
        struct Broken;

        #[async_trait::async_trait]
        impl AssignmentStore for Broken {
            async fn confirmed_assignments(&self) -> Result<Assignments> {
                Err(PaywallError::Storage("disk unavailable".to_string()))
            }

            async fn confirm(&self, _assignment: &ConfirmableAssignment) -> Result<()> {
                Ok(())
            }
        }

        let logic = RuleLogic::new(
            Arc::new(NativeEvaluator::new()),
            Arc::new(StaticAttributes::default()),
            Arc::new(Broken),
            Arc::new(InMemoryOccurrenceStore::new()),
        );
        let outcome = logic
            .evaluate_rules(&event("app_open"), &triggers(app_open_rule()), &Assignments::new())
            .await;
        assert!(matches!(
            outcome.trigger_result,
            TriggerResult::Error(EvaluationError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn confirm_then_reevaluate_has_nothing_to_confirm() {
        let h = harness(Assignments::new());
        let cache = UnconfirmedAssignments::new(single("1", Variant::holdout("h1")));
        let triggers = triggers(app_open_rule());

        let first = h
            .logic
            .evaluate_rules(&event("app_open"), &triggers, &cache.snapshot())
            .await;
        let postback = h.logic.confirm_assignment(&first, &cache).await.unwrap().unwrap();
        assert_eq!(postback.assignments.len(), 1);
        assert_eq!(postback.assignments[0].experiment_id, "1");
        assert_eq!(postback.assignments[0].variant_id, "h1");
        assert!(cache.is_empty());
        assert_eq!(
            h.store.confirmed_assignments().await.unwrap()["1"],
            Variant::holdout("h1")
        );

        let second = h
            .logic
            .evaluate_rules(&event("app_open"), &triggers, &cache.snapshot())
            .await;
        assert_eq!(second.trigger_result, first.trigger_result);
        assert_eq!(second.confirmable_assignment, None);
        assert_eq!(h.logic.confirm_assignment(&second, &cache).await.unwrap(), None);
    }

    #[tokio::test]
    async fn occurrence_only_counts_after_commit() {
        let h = harness(Assignments::new());
        let mut rule = app_open_rule();
        rule.occurrence = Some(TriggerRuleOccurrence {
            key: "app_open_cap".to_string(),
            max_count: 1,
            interval: OccurrenceInterval::Minutes { minutes: 30 },
        });
        let triggers = triggers(rule);
        let unconfirmed = single("1", Variant::holdout("h1"));
        let ev = event("app_open");

        // Evaluating twice without committing: both match.
        let first = h.logic.evaluate_rules(&ev, &triggers, &unconfirmed).await;
        let second = h.logic.evaluate_rules(&ev, &triggers, &unconfirmed).await;
        assert!(matches!(first.trigger_result, TriggerResult::Holdout(_)));
        assert_eq!(first, second);

        assert!(h.logic.commit_occurrence(&first, ev.created_at).await.unwrap());
        let third = h.logic.evaluate_rules(&ev, &triggers, &unconfirmed).await;
        match third.trigger_result {
            TriggerResult::NoRuleMatch(unmatched) => {
                assert_eq!(unmatched[0].reason, UnmatchReason::OccurrenceExceeded)
            }
            other => panic!("expected no rule match, got {:?}", other),
        }
    }

    #[test]
    fn trigger_result_serializes_tagged() {
        let result = TriggerResult::Holdout(Experiment {
            id: "1".to_string(),
            group_id: "2".to_string(),
            variant: Variant::holdout("h1"),
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["result"], "holdout");
        assert_eq!(json["detail"]["variant"]["type"], "HOLDOUT");

        let json = serde_json::to_value(TriggerResult::EventNotFound).unwrap();
        assert_eq!(json["result"], "event_not_found");
    }

    #[tokio::test]
    async fn expression_timeout_skips_slow_rule() {
        struct Slow;

        #[async_trait::async_trait]
        impl ExpressionEvaluator for Slow {
            async fn evaluate(
                &self,
                _expression: &str,
                _context: &serde_json::Value,
            ) -> std::result::Result<bool, ExpressionError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(true)
            }
        }

        let logic = RuleLogic::new(
            Arc::new(Slow),
            Arc::new(StaticAttributes::default()),
            Arc::new(InMemoryAssignmentStore::new()),
            Arc::new(InMemoryOccurrenceStore::new()),
        )
        .with_expression_timeout(Duration::from_millis(20));

        let outcome = logic
            .evaluate_rules(
                &event("app_open"),
                &triggers(app_open_rule()),
                &single("1", Variant::holdout("h1")),
            )
            .await;
        match outcome.trigger_result {
            TriggerResult::NoRuleMatch(unmatched) => {
                assert_eq!(unmatched.len(), 1);
                assert_eq!(unmatched[0].reason, UnmatchReason::ExpressionError);
            }
            other => panic!("expected no rule match, got {:?}", other),
        }
    }
}
