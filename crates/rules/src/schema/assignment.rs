//! Assignment records exchanged with storage and the confirmation endpoint.

use serde::{Deserialize, Serialize};

use super::Variant;

/// Instruction to persist a newly confirmed assignment.
///
/// Emitted when the resolved variant came from the unconfirmed cache and is
/// not yet among the confirmed values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmableAssignment {
    pub experiment_id: String,
    pub variant: Variant,
}

impl ConfirmableAssignment {
    pub fn to_assignment(&self) -> Assignment {
        Assignment {
            experiment_id: self.experiment_id.clone(),
            variant_id: self.variant.id.clone(),
        }
    }
}

/// Wire form of a confirmed assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub experiment_id: String,
    pub variant_id: String,
}

/// Body posted to the assignment confirmation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssignmentPostback {
    pub assignments: Vec<Assignment>,
}

impl AssignmentPostback {
    pub fn add(&mut self, assignment: Assignment) {
        self.assignments.push(assignment);
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}
