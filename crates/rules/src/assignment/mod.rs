//! Experiment assignment resolution and storage.
//!
//! Resolution precedence for a matched rule's experiment:
//! 1. confirmed assignment (already durably committed)
//! 2. unconfirmed assignment (provisioned by config sync), plus a
//!    [`ConfirmableAssignment`](crate::schema::ConfirmableAssignment) when needed
//! 3. otherwise `ExperimentNotProvisioned`

mod resolver;
mod store;

use std::collections::BTreeMap;

use crate::schema::Variant;

pub use resolver::{resolve_assignment, AssignmentError, ResolvedAssignment};
pub use store::{AssignmentStore, InMemoryAssignmentStore, UnconfirmedAssignments};

/// Experiment id → assigned variant. Ordered so iteration and serialization are stable.
pub type Assignments = BTreeMap<String, Variant>;
