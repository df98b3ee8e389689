//! Connection registry.
//!
//! Owns the process-wide cache of live connection handles, keyed by
//! normalized target. Handles are created lazily through a caller-supplied
//! factory and reused for the lifetime of the process or until explicitly
//! evicted; concurrent callers configuring the same endpoint always share
//! one handle.

use crate::db::health::HealthTracker;
use crate::db::target::ConnectionTarget;
use crate::error::{DbError, DbResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub struct ConnectionRegistry<H> {
    handles: RwLock<HashMap<ConnectionTarget, H>>,
    health: Arc<HealthTracker>,
}

impl<H: Clone> ConnectionRegistry<H> {
    pub fn new(health: Arc<HealthTracker>) -> Arc<Self> {
        Arc::new(Self {
            handles: RwLock::new(HashMap::new()),
            health,
        })
    }

    /// Return the cached handle for `target`, constructing one via
    /// `factory` on first use.
    ///
    /// Construction runs outside any lock; if a concurrent caller won the
    /// race in the meantime, the losing handle is dropped and the cached one
    /// returned, so the registry never stores two handles for one target.
    /// Construction failures surface as `ConnectionSetupFailed` and are not
    /// retried here - retry is the executor's decision at a higher layer.
    pub async fn resolve<F>(&self, target: &ConnectionTarget, factory: F) -> DbResult<H>
    where
        F: AsyncFnOnce() -> DbResult<H>,
    {
        {
            let handles = self.handles.read().await;
            if let Some(handle) = handles.get(target) {
                return Ok(handle.clone());
            }
        }

        debug!(target = %target, "Constructing handle");
        let handle = factory().await.map_err(|e| match e {
            setup @ DbError::ConnectionSetup { .. } => setup,
            other => DbError::connection_setup(other.to_string()),
        })?;

        // Re-check after the await to prevent a TOCTOU race.
        let mut handles = self.handles.write().await;
        if let Some(existing) = handles.get(target) {
            return Ok(existing.clone());
        }
        handles.insert(target.clone(), handle.clone());
        drop(handles);

        self.health.init(target).await;
        info!(target = %target, "Handle registered");
        Ok(handle)
    }

    /// Remove the cached handle and its health record so the next `resolve`
    /// rebuilds from scratch. Used after sustained unhealthiness.
    pub async fn evict(&self, target: &ConnectionTarget) -> bool {
        let removed = {
            let mut handles = self.handles.write().await;
            handles.remove(target).is_some()
        };
        if removed {
            self.health.remove(target).await;
            info!(target = %target, "Handle evicted");
        }
        removed
    }

    /// Check whether a handle is cached for the target.
    pub async fn contains(&self, target: &ConnectionTarget) -> bool {
        let handles = self.handles.read().await;
        handles.contains_key(target)
    }

    /// Number of cached handles.
    pub async fn len(&self) -> usize {
        let handles = self.handles.read().await;
        handles.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// All registered targets.
    pub async fn targets(&self) -> Vec<ConnectionTarget> {
        let handles = self.handles.read().await;
        handles.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ConnectionTarget {
        ConnectionTarget::parse("postgres://host/db").unwrap()
    }

    fn registry() -> Arc<ConnectionRegistry<Arc<str>>> {
        ConnectionRegistry::new(HealthTracker::new())
    }

    #[tokio::test]
    async fn test_resolve_constructs_once() {
        let registry = registry();
        let first = registry
            .resolve(&target(), || async { Ok(Arc::from("handle")) })
            .await
            .unwrap();
        let second = registry
            .resolve(&target(), || async {
                panic!("factory must not run for a cached target")
            })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_evict_forces_rebuild() {
        let registry = registry();
        let first = registry
            .resolve(&target(), || async { Ok(Arc::from("one")) })
            .await
            .unwrap();
        assert!(registry.evict(&target()).await);
        let second = registry
            .resolve(&target(), || async { Ok(Arc::from("two")) })
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(&*second, "two");
    }

    #[tokio::test]
    async fn test_evict_unknown_target_is_noop() {
        let registry = registry();
        assert!(!registry.evict(&target()).await);
    }

    #[tokio::test]
    async fn test_factory_failure_is_setup_error_and_not_cached() {
        let registry = registry();
        let err = registry
            .resolve(&target(), || async {
                Err::<Arc<str>, _>(DbError::retryable("refused", None))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ConnectionSetup { .. }));
        assert!(!registry.contains(&target()).await);
    }

    #[tokio::test]
    async fn test_resolve_initializes_health() {
        let health = HealthTracker::new();
        let registry = ConnectionRegistry::<Arc<str>>::new(health.clone());
        registry
            .resolve(&target(), || async { Ok(Arc::from("handle")) })
            .await
            .unwrap();
        let record = health.snapshot(&target()).await.unwrap();
        assert!(record.is_healthy);
        assert_eq!(record.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_targets_listing() {
        let registry = registry();
        let other = ConnectionTarget::parse("postgres://other/db").unwrap();
        for t in [&target(), &other] {
            registry
                .resolve(t, || async { Ok(Arc::from("h")) })
                .await
                .unwrap();
        }
        let mut targets = registry.targets().await;
        targets.sort();
        assert_eq!(targets, vec![target(), other]);
        assert_eq!(registry.len().await, 2);
    }
}
