//! Confirmed-assignment storage and the unconfirmed-assignment cache.

use std::sync::{Arc, RwLock};

use paywall_core::Result;
use tracing::debug;

use crate::schema::{ConfirmableAssignment, Variant};

use super::Assignments;

/// Durable store of confirmed assignments, owned by the host application.
///
/// The engine only reads it during evaluation; [`confirm`](AssignmentStore::confirm)
/// is called from the explicit post-evaluation commit path. Implementations
/// must document how concurrent confirms of the same experiment are settled.
#[async_trait::async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn confirmed_assignments(&self) -> Result<Assignments>;

    async fn confirm(&self, assignment: &ConfirmableAssignment) -> Result<()>;
}

/// Process-local confirmed-assignment store.
///
/// Concurrent confirms for the same experiment id are last-write-wins.
#[derive(Default)]
pub struct InMemoryAssignmentStore {
    confirmed: RwLock<Assignments>,
}

impl InMemoryAssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing confirmed assignments.
    pub fn with_assignments(confirmed: Assignments) -> Self {
        Self {
            confirmed: RwLock::new(confirmed),
        }
    }
}

#[async_trait::async_trait]
impl AssignmentStore for InMemoryAssignmentStore {
    async fn confirmed_assignments(&self) -> Result<Assignments> {
        Ok(self
            .confirmed
            .read()
            .expect("confirmed assignments lock poisoned")
            .clone())
    }

    async fn confirm(&self, assignment: &ConfirmableAssignment) -> Result<()> {
        self.confirmed
            .write()
            .expect("confirmed assignments lock poisoned")
            .insert(assignment.experiment_id.clone(), assignment.variant.clone());
        debug!(
            experiment_id = %assignment.experiment_id,
            variant_id = %assignment.variant.id,
            "confirmed assignment"
        );
        Ok(())
    }
}

/// Shared handle to the provisional assignments populated by config sync.
///
/// Evaluations read an owned [`snapshot`](UnconfirmedAssignments::snapshot), so
/// a concurrent refresh never changes an evaluation already in flight.
#[derive(Debug, Clone, Default)]
pub struct UnconfirmedAssignments {
    inner: Arc<RwLock<Assignments>>,
}

impl UnconfirmedAssignments {
    pub fn new(assignments: Assignments) -> Self {
        Self {
            inner: Arc::new(RwLock::new(assignments)),
        }
    }

    pub fn snapshot(&self) -> Assignments {
        self.inner
            .read()
            .expect("unconfirmed assignments lock poisoned")
            .clone()
    }

    /// Replace the whole cache (config sync).
    pub fn replace(&self, assignments: Assignments) {
        *self
            .inner
            .write()
            .expect("unconfirmed assignments lock poisoned") = assignments;
    }

    /// Drop an experiment once its assignment has been confirmed.
    pub fn remove(&self, experiment_id: &str) -> Option<Variant> {
        self.inner
            .write()
            .expect("unconfirmed assignments lock poisoned")
            .remove(experiment_id)
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("unconfirmed assignments lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
