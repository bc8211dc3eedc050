//! End-to-end evaluation scenarios over the example trigger documents.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Map, Value};

use paywall_core::EventData;
use paywall_rules::assignment::{Assignments, InMemoryAssignmentStore, UnconfirmedAssignments};
use paywall_rules::expression::{NativeEvaluator, RuleAttributes, StaticAttributes};
use paywall_rules::loader::TriggerLoader;
use paywall_rules::logic::{EvaluationError, RuleLogic, TriggerResult};
use paywall_rules::matcher::UnmatchReason;
use paywall_rules::occurrence::InMemoryOccurrenceStore;
use paywall_rules::schema::{ConfirmableAssignment, Experiment, Trigger, Variant};

fn examples_dir() -> PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../data/triggers/examples")
}

fn example_triggers() -> HashMap<String, Trigger> {
    let loader = TriggerLoader::new(examples_dir());
    loader.load_all().unwrap();
    loader.snapshot()
}

fn logic(confirmed: Assignments, attributes: Value) -> RuleLogic {
    let attributes: RuleAttributes = serde_json::from_value(attributes).unwrap();
    RuleLogic::new(
        Arc::new(NativeEvaluator::new()),
        Arc::new(StaticAttributes(attributes)),
        Arc::new(InMemoryAssignmentStore::with_assignments(confirmed)),
        Arc::new(InMemoryOccurrenceStore::new()),
    )
}

fn assignments(entries: &[(&str, Variant)]) -> Assignments {
    entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn event(name: &str, params: Value) -> EventData {
    let params: Map<String, Value> = serde_json::from_value(params).unwrap();
    EventData::at(name, params, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
}

#[tokio::test]
async fn unconfirmed_holdout_yields_holdout_and_confirmable() {
    let logic = logic(Assignments::new(), json!({}));
    let unconfirmed = assignments(&[("1", Variant::holdout("h1"))]);

    let outcome = logic
        .evaluate_rules(&event("app_open", json!({})), &example_triggers(), &unconfirmed)
        .await;

    assert_eq!(
        outcome.trigger_result,
        TriggerResult::Holdout(Experiment {
            id: "1".to_string(),
            group_id: "2".to_string(),
            variant: Variant::holdout("h1"),
        })
    );
    assert_eq!(
        outcome.confirmable_assignment,
        Some(ConfirmableAssignment {
            experiment_id: "1".to_string(),
            variant: Variant::holdout("h1"),
        })
    );
    assert_eq!(outcome.unsaved_occurrence, None);
}

#[tokio::test]
async fn confirmed_treatment_yields_paywall_without_confirmable() {
    let logic = logic(assignments(&[("1", Variant::treatment("t1", None))]), json!({}));
    let unconfirmed = assignments(&[("1", Variant::holdout("h1"))]);

    let outcome = logic
        .evaluate_rules(&event("app_open", json!({})), &example_triggers(), &unconfirmed)
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
async fn missing_assignment_yields_not_provisioned() {
    let logic = logic(Assignments::new(), json!({}));

    let outcome = logic
        .evaluate_rules(&event("app_open", json!({})), &example_triggers(), &Assignments::new())
        .await;

    assert_eq!(
        outcome.trigger_result,
        TriggerResult::Error(EvaluationError::ExperimentNotProvisioned {
            experiment_id: "1".to_string()
        })
    );
}

#[tokio::test]
async fn unknown_and_disabled_events_are_not_found() {
    let logic = logic(Assignments::new(), json!({}));
    let triggers = example_triggers();

    for name in ["settings_open", "holiday_banner_tap"] {
        let outcome = logic
            .evaluate_rules(&event(name, json!({})), &triggers, &Assignments::new())
            .await;
        assert_eq!(outcome.trigger_result, TriggerResult::EventNotFound, "event {}", name);
    }
}

#[tokio::test]
async fn capped_upsell_falls_through_to_fallback_rule() {
    let logic = logic(Assignments::new(), json!({ "user": { "plan": "free" } }));
    let triggers = example_triggers();
    let unconfirmed = assignments(&[
        ("10", Variant::treatment("t10", Some("pw_level_upsell".to_string()))),
        ("12", Variant::holdout("h12")),
    ]);
    let first = event("level_complete", json!({ "level": 7 }));

    let outcome = logic.evaluate_rules(&first, &triggers, &unconfirmed).await;
    assert_eq!(outcome.experiment().map(|e| e.id.as_str()), Some("10"));
    let occurrence = outcome.unsaved_occurrence.clone().unwrap();
    assert_eq!(occurrence.key, "level_upsell");

    assert!(logic.commit_occurrence(&outcome, first.created_at).await.unwrap());

    // Within the 30 minute window the upsell is capped; the fallback rule wins.
    let mut second = first.clone();
    second.created_at = first.created_at + Duration::minutes(10);
    let outcome = logic.evaluate_rules(&second, &triggers, &unconfirmed).await;
    assert_eq!(
        outcome.trigger_result,
        TriggerResult::Holdout(Experiment {
            id: "12".to_string(),
            group_id: "13".to_string(),
            variant: Variant::holdout("h12"),
        })
    );
    assert_eq!(outcome.unsaved_occurrence, None);

    // Once the window has passed the upsell fires again.
    let mut third = first.clone();
    third.created_at = first.created_at + Duration::minutes(45);
    let outcome = logic.evaluate_rules(&third, &triggers, &unconfirmed).await;
    assert_eq!(outcome.experiment().map(|e| e.id.as_str()), Some("10"));
}

#[tokio::test]
async fn no_rule_match_lists_every_rule_in_order() {
    let logic = logic(Assignments::new(), json!({ "user": { "plan": "pro" } }));

    let outcome = logic
        .evaluate_rules(
            &event("level_complete", json!({ "level": 0 })),
            &example_triggers(),
            &Assignments::new(),
        )
        .await;

    match outcome.trigger_result {
        TriggerResult::NoRuleMatch(unmatched) => {
            let summary: Vec<_> = unmatched
                .iter()
                .map(|u| (u.rule.experiment_id.as_str(), u.reason))
                .collect();
            assert_eq!(
                summary,
                vec![("10", UnmatchReason::ExpressionFalse), ("12", UnmatchReason::ExpressionFalse)]
            );
        }
        other => panic!("expected no rule match, got {:?}", other),
    }
}

#[tokio::test]
async fn device_attributes_reach_expressions() {
    let unconfirmed = assignments(&[(
        "20",
        Variant::treatment("t20", Some("pw_checkout".to_string())),
    )]);
    let triggers = example_triggers();
    let ev = event("checkout_start", json!({}));

    let on_ios = logic(Assignments::new(), json!({ "device": { "platform": "ios" } }));
    let outcome = on_ios.evaluate_rules(&ev, &triggers, &unconfirmed).await;
    assert!(matches!(outcome.trigger_result, TriggerResult::Paywall(_)));

    let on_web = logic(Assignments::new(), json!({ "device": { "platform": "web" } }));
    let outcome = on_web.evaluate_rules(&ev, &triggers, &unconfirmed).await;
    assert!(matches!(outcome.trigger_result, TriggerResult::NoRuleMatch(_)));
}

#[tokio::test]
async fn repeated_evaluation_is_identical() {
    let logic = logic(Assignments::new(), json!({ "user": { "plan": "free" } }));
    let triggers = example_triggers();
    let unconfirmed = assignments(&[("10", Variant::treatment("t10", None))]);
    let ev = event("level_complete", json!({ "level": 9 }));

    let first = logic.evaluate_rules(&ev, &triggers, &unconfirmed).await;
    let second = logic.evaluate_rules(&ev, &triggers, &unconfirmed).await;
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn confirm_clears_unconfirmed_and_returns_postback() {
    let logic = logic(Assignments::new(), json!({}));
    let cache = UnconfirmedAssignments::new(assignments(&[("1", Variant::holdout("h1"))]));

    let outcome = logic
        .evaluate_rules(&event("app_open", json!({})), &example_triggers(), &cache.snapshot())
        .await;
    let postback = logic.confirm_assignment(&outcome, &cache).await.unwrap().unwrap();

    assert_eq!(
        serde_json::to_value(&postback).unwrap(),
        json!({ "assignments": [{ "experiment_id": "1", "variant_id": "h1" }] })
    );
    assert!(cache.is_empty());
}
