//! Pure resolution of a matched rule's experiment to a variant.

use crate::schema::{ConfirmableAssignment, TriggerRule, Variant};

use super::Assignments;

/// Errors from assignment resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssignmentError {
    /// No variant was ever provisioned locally for the rule's experiment.
    #[error("experiment '{experiment_id}' has no confirmed or unconfirmed variant")]
    ExperimentNotProvisioned { experiment_id: String },
}

/// The variant chosen for a rule, plus any confirmation to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAssignment {
    pub variant: Variant,
    pub confirmable_assignment: Option<ConfirmableAssignment>,
}

/// Resolve `rule`'s experiment against the confirmed and unconfirmed maps.
///
/// Confirmed wins over unconfirmed. A variant taken from the unconfirmed map
/// yields a [`ConfirmableAssignment`] unless that exact variant already
/// appears among the confirmed values. Pure: same inputs, same result.
pub fn resolve_assignment(
    rule: &TriggerRule,
    confirmed: &Assignments,
    unconfirmed: &Assignments,
) -> Result<ResolvedAssignment, AssignmentError> {
    let experiment_id = &rule.experiment_id;

    if let Some(variant) = confirmed.get(experiment_id) {
        return Ok(ResolvedAssignment {
            variant: variant.clone(),
            confirmable_assignment: None,
        });
    }

    let variant = unconfirmed
        .get(experiment_id)
        .ok_or_else(|| AssignmentError::ExperimentNotProvisioned {
            experiment_id: experiment_id.clone(),
        })?;

    let already_confirmed = confirmed.values().any(|v| v == variant);
    let confirmable_assignment = (!already_confirmed).then(|| ConfirmableAssignment {
        experiment_id: experiment_id.clone(),
        variant: variant.clone(),
    });

    Ok(ResolvedAssignment {
        variant: variant.clone(),
        confirmable_assignment,
    })
}
