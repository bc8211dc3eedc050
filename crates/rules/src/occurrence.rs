//! Frequency-cap bookkeeping for trigger rules.
//!
//! Matching only ever *reads* occurrence counts. A matched rule hands its
//! occurrence back to the caller as an "unsaved occurrence", and the single
//! write path is [`OccurrenceTracker::commit`], invoked after the outcome was
//! actually used. An aborted presentation therefore never bumps a counter.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use paywall_core::Result;
use tracing::debug;

use crate::schema::TriggerRuleOccurrence;

// ── Storage abstraction ─────────────────────────────────────────────

/// Durable record of rule occurrences, owned by the host application.
///
/// Implementations serialize their own writes; the engine never holds a lock
/// across calls.
#[async_trait::async_trait]
pub trait OccurrenceStore: Send + Sync {
    /// Count occurrences recorded for `key` within `[since, until]`
    /// (no lower bound when `since` is `None`).
    async fn count_occurrences(
        &self,
        key: &str,
        since: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> Result<u64>;

    /// Record one occurrence of `occurrence.key` at `at`.
    async fn record_occurrence(&self, occurrence: &TriggerRuleOccurrence, at: DateTime<Utc>)
        -> Result<()>;
}

/// Process-local occurrence store keyed by occurrence key.
#[derive(Default)]
pub struct InMemoryOccurrenceStore {
    timestamps: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl InMemoryOccurrenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl OccurrenceStore for InMemoryOccurrenceStore {
    async fn count_occurrences(
        &self,
        key: &str,
        since: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> Result<u64> {
        let guard = self.timestamps.read().expect("occurrences lock poisoned");
        let count = guard
            .get(key)
            .map(|ts| {
                ts.iter()
                    .filter(|t| since.map_or(true, |since| **t >= since) && **t <= until)
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn record_occurrence(
        &self,
        occurrence: &TriggerRuleOccurrence,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.timestamps
            .write()
            .expect("occurrences lock poisoned")
            .entry(occurrence.key.clone())
            .or_default()
            .push(at);
        Ok(())
    }
}

// ── Tracker ─────────────────────────────────────────────────────────

/// Checks and commits frequency caps against an [`OccurrenceStore`].
#[derive(Clone)]
pub struct OccurrenceTracker {
    store: Arc<dyn OccurrenceStore>,
}

impl OccurrenceTracker {
    pub fn new(store: Arc<dyn OccurrenceStore>) -> Self {
        Self { store }
    }

    /// Whether one more fire is allowed at `now` under the cap.
    ///
    /// `now` is the evaluated event's timestamp, not the wall clock.
    pub async fn is_within_cap(
        &self,
        occurrence: &TriggerRuleOccurrence,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let since = occurrence.interval.window().map(|w| now - w);
        let count = self.store.count_occurrences(&occurrence.key, since, now).await?;
        let allowed = count < u64::from(occurrence.max_count);

        debug!(
            key = %occurrence.key,
            count,
            max_count = occurrence.max_count,
            allowed,
            "checked occurrence cap"
        );
        Ok(allowed)
    }

    /// Apply a previously returned unsaved occurrence.
    pub async fn commit(
        &self,
        occurrence: &TriggerRuleOccurrence,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.store.record_occurrence(occurrence, at).await?;
        debug!(key = %occurrence.key, at = %at, "committed occurrence");
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::OccurrenceInterval;
    use chrono::{Duration, TimeZone};

    fn occurrence(max_count: u32, interval: OccurrenceInterval) -> TriggerRuleOccurrence {
        TriggerRuleOccurrence {
            key: "rule-key".to_string(),
            max_count,
            interval,
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn tracker() -> OccurrenceTracker {
        OccurrenceTracker::new(Arc::new(InMemoryOccurrenceStore::new()))
    }

    #[tokio::test]
    async fn infinity_cap_counts_all_time() {
        let tracker = tracker();
        let occ = occurrence(2, OccurrenceInterval::Infinity);
        let now = base_time();

        assert!(tracker.is_within_cap(&occ, now).await.unwrap());
        tracker.commit(&occ, now - Duration::days(300)).await.unwrap();
        assert!(tracker.is_within_cap(&occ, now).await.unwrap());
        tracker.commit(&occ, now - Duration::days(1)).await.unwrap();
        assert!(!tracker.is_within_cap(&occ, now).await.unwrap());
    }

    #[tokio::test]
    async fn minutes_cap_ignores_old_occurrences() {
        let tracker = tracker();
        let occ = occurrence(1, OccurrenceInterval::Minutes { minutes: 60 });
        let now = base_time();

        tracker.commit(&occ, now - Duration::minutes(61)).await.unwrap();
        assert!(tracker.is_within_cap(&occ, now).await.unwrap());

        tracker.commit(&occ, now - Duration::minutes(5)).await.unwrap();
        assert!(!tracker.is_within_cap(&occ, now).await.unwrap());

        // Same state, later evaluation: the recent one has aged out.
        assert!(tracker
            .is_within_cap(&occ, now + Duration::minutes(56))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn zero_max_count_never_fires() {
        let tracker = tracker();
        let occ = occurrence(0, OccurrenceInterval::Infinity);
        assert!(!tracker.is_within_cap(&occ, base_time()).await.unwrap());
    }

    #[tokio::test]
    async fn keys_are_counted_independently() {
        let store = Arc::new(InMemoryOccurrenceStore::new());
        let tracker = OccurrenceTracker::new(store.clone());
        let a = occurrence(1, OccurrenceInterval::Infinity);
        let mut b = a.clone();
        b.key = "other-key".to_string();

        tracker.commit(&a, base_time()).await.unwrap();
        assert!(!tracker.is_within_cap(&a, base_time()).await.unwrap());
        assert!(tracker.is_within_cap(&b, base_time()).await.unwrap());
        assert_eq!(
            store
                .count_occurrences("rule-key", None, base_time())
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn later_occurrences_are_not_counted() {
        let tracker = tracker();
        let now = base_time();
        let windowed = occurrence(1, OccurrenceInterval::Minutes { minutes: 60 });
        let unbounded = occurrence(1, OccurrenceInterval::Infinity);

        tracker.commit(&windowed, now + Duration::minutes(30)).await.unwrap();
        assert!(tracker.is_within_cap(&windowed, now).await.unwrap());
        assert!(tracker.is_within_cap(&unbounded, now).await.unwrap());

        // Replaying at the commit time itself sees it.
        assert!(!tracker
            .is_within_cap(&windowed, now + Duration::minutes(30))
            .await
            .unwrap());
    }
}
