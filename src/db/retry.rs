//! Retry execution with exponential backoff and a timeout race.
//!
//! `RetryExecutor::run` is the explicit decorator every operation flows
//! through: it resolves the handle fresh on each attempt, races the unit of
//! work against the policy timeout, records the outcome in the health
//! tracker, and sleeps `base_delay * 2^(attempt-1)` between retryable
//! failures. Attempts are strictly sequential - never fired in parallel -
//! to avoid duplicate side effects.
//!
//! A fired timeout cancels this layer's wait, not the in-flight network
//! call: a side-effecting statement may still complete server-side after
//! the client gives up. At-most-once is not guaranteed; operations whose
//! correctness depends on it should be designed idempotent.

use crate::db::health::HealthTracker;
use crate::db::registry::ConnectionRegistry;
use crate::db::target::ConnectionTarget;
use crate::error::{DbError, DbResult, ErrorKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Per-call retry behavior. Immutable once supplied; different callers may
/// use different policies against the same target.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (minimum 1).
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry.
    pub base_delay: Duration,
    /// Per-attempt timeout raced against the unit of work.
    pub timeout: Duration,
    /// Optional cap on the backoff delay. No cap when `None`.
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            timeout: Duration::from_millis(30_000),
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay inserted after failed attempt `attempt` (1-based):
    /// `base_delay * 2^(attempt-1)`, capped by `max_delay` when set.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// Typed result envelope produced once per top-level call. Internal attempts
/// are not separately observable.
#[derive(Debug)]
pub struct OperationResult<T> {
    value: Option<T>,
    error: Option<DbError>,
    duration: Duration,
}

impl<T> OperationResult<T> {
    pub fn success(value: T, duration: Duration) -> Self {
        Self {
            value: Some(value),
            error: None,
            duration,
        }
    }

    pub fn failure(error: DbError, duration: Duration) -> Self {
        Self {
            value: None,
            error: Some(error),
            duration,
        }
    }

    pub fn from_result(result: DbResult<T>, duration: Duration) -> Self {
        match result {
            Ok(value) => Self::success(value, duration),
            Err(error) => Self::failure(error, duration),
        }
    }

    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn error(&self) -> Option<&DbError> {
        self.error.as_ref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(DbError::kind)
    }

    /// Wall-clock duration of the whole call, retries included.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Convert back into a plain result, discarding the duration.
    pub fn into_result(self) -> DbResult<T> {
        match (self.value, self.error) {
            (Some(value), _) => Ok(value),
            (None, Some(error)) => Err(error),
            // Unreachable by construction; surface something sane anyway.
            (None, None) => Err(DbError::retryable("empty operation result", None)),
        }
    }
}

/// Wraps units of work with bounded retries against registry-resolved
/// handles.
pub struct RetryExecutor<H> {
    registry: Arc<ConnectionRegistry<H>>,
    health: Arc<HealthTracker>,
}

impl<H: Clone + Send + Sync + 'static> RetryExecutor<H> {
    pub fn new(registry: Arc<ConnectionRegistry<H>>, health: Arc<HealthTracker>) -> Self {
        Self { registry, health }
    }

    /// Run `work` against `target` under `policy`.
    ///
    /// The handle is resolved from the registry on every attempt - callers
    /// never hold one across retries, so an eviction between attempts picks
    /// up a rebuilt handle. Setup failures and non-retryable errors end the
    /// call immediately; retryable failures back off exponentially until the
    /// attempt budget is spent. Every attempt updates the health record.
    pub async fn run<T, F, W>(
        &self,
        name: &str,
        target: &ConnectionTarget,
        policy: &RetryPolicy,
        factory: F,
        work: W,
    ) -> OperationResult<T>
    where
        F: AsyncFn() -> DbResult<H>,
        W: AsyncFn(&H) -> DbResult<T>,
    {
        let started = Instant::now();
        let max_attempts = policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let handle = match self.registry.resolve(target, &factory).await {
                Ok(handle) => handle,
                Err(err) => {
                    // Fatal to this call; a later call may retry construction.
                    self.health.record_failure(target, &err).await;
                    warn!(operation = name, target = %target, error = %err, "Handle construction failed");
                    return OperationResult::failure(err, started.elapsed());
                }
            };

            let outcome = match tokio::time::timeout(policy.timeout, work(&handle)).await {
                Ok(Ok(value)) => {
                    self.health.record_success(target).await;
                    debug!(operation = name, target = %target, attempt, "Operation succeeded");
                    return OperationResult::success(value, started.elapsed());
                }
                Ok(Err(err)) => err,
                Err(_) => DbError::timeout(name, policy.timeout.as_millis() as u64),
            };

            self.health.record_failure(target, &outcome).await;

            if !outcome.is_retryable() || attempt == max_attempts {
                warn!(
                    operation = name,
                    target = %target,
                    attempt,
                    error = %outcome,
                    "Operation failed terminally"
                );
                return OperationResult::failure(outcome, started.elapsed());
            }

            let delay = policy.backoff_delay(attempt);
            debug!(
                operation = name,
                target = %target,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %outcome,
                "Retrying after backoff"
            );
            tokio::time::sleep(delay).await;
        }

        // The loop always returns from its final attempt.
        unreachable!("retry loop exited without a terminal result")
    }
}
