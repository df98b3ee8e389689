//! Per-target health tracking.
//!
//! The tracker maintains the layer's belief about whether each target is
//! currently serving requests successfully. A single failure flips the
//! target to unhealthy immediately so health reporting is informative; a
//! single success clears the whole failure history. Eviction of a
//! sustained-unhealthy target is a separate, explicit maintenance decision
//! made by the facade (see `DbService::evict_unhealthy`).

use crate::db::target::ConnectionTarget;
use crate::error::DbError;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Upper bound on the retained error history per target.
pub const MAX_RECENT_ERRORS: usize = 10;

/// Rolling health record for one target.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthRecord {
    pub is_healthy: bool,
    pub last_checked_at: DateTime<Utc>,
    pub consecutive_failures: u32,
    /// Most recent error messages, oldest evicted first.
    pub recent_errors: VecDeque<String>,
}

impl HealthRecord {
    fn healthy() -> Self {
        Self {
            is_healthy: true,
            last_checked_at: Utc::now(),
            consecutive_failures: 0,
            recent_errors: VecDeque::new(),
        }
    }

    fn record_success(&mut self) {
        self.is_healthy = true;
        self.last_checked_at = Utc::now();
        self.consecutive_failures = 0;
        self.recent_errors.clear();
    }

    fn record_failure(&mut self, message: String) {
        self.is_healthy = false;
        self.last_checked_at = Utc::now();
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.recent_errors.len() == MAX_RECENT_ERRORS {
            self.recent_errors.pop_front();
        }
        self.recent_errors.push_back(message);
    }
}

/// Process-wide health state, keyed by normalized target.
///
/// Updates are short critical sections under a `tokio` RwLock; no lock is
/// ever held across driver I/O or a backoff sleep.
#[derive(Debug, Default)]
pub struct HealthTracker {
    records: RwLock<HashMap<ConnectionTarget, HealthRecord>>,
}

impl HealthTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a freshly constructed target as healthy.
    pub async fn init(&self, target: &ConnectionTarget) {
        let mut records = self.records.write().await;
        records
            .entry(target.clone())
            .or_insert_with(HealthRecord::healthy);
    }

    /// Record a successful attempt, clearing the error history.
    pub async fn record_success(&self, target: &ConnectionTarget) {
        let mut records = self.records.write().await;
        records
            .entry(target.clone())
            .or_insert_with(HealthRecord::healthy)
            .record_success();
    }

    /// Record a failed attempt.
    pub async fn record_failure(&self, target: &ConnectionTarget, error: &DbError) {
        let mut records = self.records.write().await;
        let record = records
            .entry(target.clone())
            .or_insert_with(HealthRecord::healthy);
        record.record_failure(error.to_string());
        debug!(
            target = %target,
            consecutive_failures = record.consecutive_failures,
            "Recorded failure"
        );
    }

    /// Whether the target is currently believed healthy. Targets that have
    /// never been used report healthy.
    pub async fn is_healthy(&self, target: &ConnectionTarget) -> bool {
        let records = self.records.read().await;
        records.get(target).is_none_or(|r| r.is_healthy)
    }

    /// A copy of the target's record, if one exists.
    pub async fn snapshot(&self, target: &ConnectionTarget) -> Option<HealthRecord> {
        let records = self.records.read().await;
        records.get(target).cloned()
    }

    /// Copies of all records.
    pub async fn all(&self) -> HashMap<ConnectionTarget, HealthRecord> {
        let records = self.records.read().await;
        records.clone()
    }

    /// Drop the record for a target. Called by the registry on evict.
    pub async fn remove(&self, target: &ConnectionTarget) {
        let mut records = self.records.write().await;
        records.remove(target);
    }

    /// Targets whose consecutive failure count exceeds `threshold`.
    pub async fn targets_exceeding(&self, threshold: u32) -> Vec<ConnectionTarget> {
        let records = self.records.read().await;
        records
            .iter()
            .filter(|(_, r)| r.consecutive_failures > threshold)
            .map(|(t, _)| t.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ConnectionTarget {
        ConnectionTarget::parse("postgres://host/db").unwrap()
    }

    #[tokio::test]
    async fn test_unknown_target_reports_healthy() {
        let tracker = HealthTracker::new();
        assert!(tracker.is_healthy(&target()).await);
        assert!(tracker.snapshot(&target()).await.is_none());
    }

    #[tokio::test]
    async fn test_single_failure_flips_unhealthy() {
        let tracker = HealthTracker::new();
        tracker
            .record_failure(&target(), &DbError::retryable("reset", None))
            .await;

        let record = tracker.snapshot(&target()).await.unwrap();
        assert!(!record.is_healthy);
        assert_eq!(record.consecutive_failures, 1);
        assert_eq!(record.recent_errors.len(), 1);
    }

    #[tokio::test]
    async fn test_success_clears_history() {
        let tracker = HealthTracker::new();
        for _ in 0..4 {
            tracker
                .record_failure(&target(), &DbError::retryable("reset", None))
                .await;
        }
        tracker.record_success(&target()).await;

        let record = tracker.snapshot(&target()).await.unwrap();
        assert!(record.is_healthy);
        assert_eq!(record.consecutive_failures, 0);
        assert!(record.recent_errors.is_empty());
    }

    #[tokio::test]
    async fn test_recent_errors_capped_oldest_evicted() {
        let tracker = HealthTracker::new();
        for i in 0..15 {
            tracker
                .record_failure(&target(), &DbError::retryable(format!("err-{i}"), None))
                .await;
        }

        let record = tracker.snapshot(&target()).await.unwrap();
        assert_eq!(record.consecutive_failures, 15);
        assert_eq!(record.recent_errors.len(), MAX_RECENT_ERRORS);
        // err-0 .. err-4 were evicted; the newest entry is last.
        assert!(record.recent_errors.front().unwrap().contains("err-5"));
        assert!(record.recent_errors.back().unwrap().contains("err-14"));
    }

    #[tokio::test]
    async fn test_targets_exceeding_threshold() {
        let tracker = HealthTracker::new();
        let flaky = ConnectionTarget::parse("postgres://flaky/db").unwrap();
        let fine = ConnectionTarget::parse("postgres://fine/db").unwrap();

        for _ in 0..6 {
            tracker
                .record_failure(&flaky, &DbError::retryable("reset", None))
                .await;
        }
        tracker.record_success(&fine).await;

        let exceeding = tracker.targets_exceeding(5).await;
        assert_eq!(exceeding, vec![flaky]);
        assert!(tracker.targets_exceeding(6).await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_forgets_target() {
        let tracker = HealthTracker::new();
        tracker
            .record_failure(&target(), &DbError::retryable("reset", None))
            .await;
        tracker.remove(&target()).await;
        assert!(tracker.is_healthy(&target()).await);
    }
}
