//! Facade for the database access layer.
//!
//! `DbService` is the single entry point collaborators use: `query` for
//! retry-wrapped single operations (optionally read-through cached),
//! `transaction` for atomic multi-step work, `health_check` for
//! liveness/readiness probes, and `connection_stats` for operational
//! dashboards. Composition is explicit: one registry, one health tracker,
//! one retry executor, one transaction coordinator, one query cache.

use crate::config::Config;
use crate::db::cache::{CacheBackend, MemoryCache, QueryCache};
use crate::db::handle::{DatabaseHandle, PgHandle};
use crate::db::health::{HealthRecord, HealthTracker};
use crate::db::registry::ConnectionRegistry;
use crate::db::retry::{OperationResult, RetryExecutor, RetryPolicy};
use crate::db::target::ConnectionTarget;
use crate::db::transaction::TransactionCoordinator;
use crate::error::DbResult;
use futures_util::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Shared, repeatedly-invocable handle constructor.
pub type HandleFactory<H> = Arc<dyn Fn() -> BoxFuture<'static, DbResult<H>> + Send + Sync>;

/// Caching behavior for one `query` call.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    /// Explicit cache key; the layer never derives keys from SQL text.
    pub key: String,
    pub ttl: Duration,
}

/// Per-call options for `query` and `transaction`.
#[derive(Default, Clone)]
pub struct QueryOptions {
    /// Override of the service-wide retry policy.
    pub policy: Option<RetryPolicy>,
    /// Route the read through the query cache.
    pub cache: Option<CachePolicy>,
    /// Skip the cache lookup but still refresh the entry on success.
    pub bypass_cache: bool,
}

impl QueryOptions {
    pub fn cached(key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            cache: Some(CachePolicy {
                key: key.into(),
                ttl,
            }),
            ..Self::default()
        }
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            policy: Some(policy),
            ..Self::default()
        }
    }
}

/// Probe outcome for liveness/readiness endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthCheckReport {
    pub status: HealthStatus,
    pub latency_ms: u64,
    pub stats: ConnectionStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Introspection snapshot for operational dashboards.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub healthy_connections: usize,
    pub per_target: BTreeMap<String, HealthRecord>,
}

pub struct DbService<H: DatabaseHandle, B: CacheBackend = MemoryCache> {
    target: ConnectionTarget,
    factory: HandleFactory<H>,
    registry: Arc<ConnectionRegistry<H>>,
    health: Arc<HealthTracker>,
    executor: Arc<RetryExecutor<H>>,
    coordinator: TransactionCoordinator<H>,
    cache: QueryCache<B>,
    default_policy: RetryPolicy,
    eviction_threshold: u32,
}

impl DbService<PgHandle> {
    /// Build a service for the configured PostgreSQL store. The first
    /// physical connection is established lazily on first use.
    pub fn connect(config: &Config) -> DbResult<Self> {
        let target = ConnectionTarget::parse(&config.database_url)?;
        let factory_config = config.clone();
        let factory: HandleFactory<PgHandle> = Arc::new(move || {
            let config = factory_config.clone();
            Box::pin(async move { PgHandle::connect(&config).await })
        });
        Ok(Self::new(config, target, factory, MemoryCache::new()))
    }
}

impl<H: DatabaseHandle, B: CacheBackend> DbService<H, B> {
    /// Build a service with an injected handle factory and cache backend.
    pub fn new(
        config: &Config,
        target: ConnectionTarget,
        factory: HandleFactory<H>,
        cache_backend: B,
    ) -> Self {
        let health = HealthTracker::new();
        let registry = ConnectionRegistry::new(health.clone());
        let executor = Arc::new(RetryExecutor::new(registry.clone(), health.clone()));
        let coordinator = TransactionCoordinator::new(executor.clone());
        info!(target = %target, "Database service initialized");
        Self {
            target,
            factory,
            registry,
            health,
            executor,
            coordinator,
            cache: QueryCache::new(cache_backend),
            default_policy: config.retry_policy(),
            eviction_threshold: config.eviction_threshold,
        }
    }

    /// The normalized target this service talks to.
    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    /// Run a single read or write through the retry machinery.
    ///
    /// With `options.cache` set, the result flows through the read-through
    /// cache: a hit returns without touching the connection layer, a miss
    /// stores the loaded value best-effort. `bypass_cache` skips the lookup
    /// but still refreshes the entry. A client-side timeout does not cancel
    /// the in-flight statement server-side; design side-effecting
    /// operations idempotent where correctness depends on it.
    pub async fn query<T, W>(&self, name: &str, options: QueryOptions, work: W) -> OperationResult<T>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
        W: AsyncFn(&H) -> DbResult<T>,
    {
        let started = Instant::now();
        let policy = options.policy.as_ref().unwrap_or(&self.default_policy);

        match &options.cache {
            Some(cache_policy) if !options.bypass_cache => {
                let result = self
                    .cache
                    .get_or_load(&cache_policy.key, cache_policy.ttl, async || {
                        self.run_uncached(name, policy, &work).await
                    })
                    .await;
                OperationResult::from_result(result, started.elapsed())
            }
            Some(cache_policy) => {
                let result = self.executor_result(name, policy, &work).await;
                if let Some(value) = result.value() {
                    self.cache
                        .store(&cache_policy.key, value, cache_policy.ttl)
                        .await;
                }
                result
            }
            None => self.executor_result(name, policy, &work).await,
        }
    }

    async fn run_uncached<T, W>(&self, name: &str, policy: &RetryPolicy, work: &W) -> DbResult<T>
    where
        W: AsyncFn(&H) -> DbResult<T>,
    {
        self.executor_result(name, policy, work).await.into_result()
    }

    async fn executor_result<T, W>(
        &self,
        name: &str,
        policy: &RetryPolicy,
        work: &W,
    ) -> OperationResult<T>
    where
        W: AsyncFn(&H) -> DbResult<T>,
    {
        let factory = self.factory.clone();
        self.executor
            .run(name, &self.target, policy, async move || factory().await, work)
            .await
    }

    /// Run multi-statement work atomically through the transaction
    /// coordinator. Retryable failures re-run the whole body on a fresh
    /// handle; non-retryable ones surface rolled back.
    pub async fn transaction<T, Bd>(
        &self,
        name: &str,
        options: QueryOptions,
        body: Bd,
    ) -> OperationResult<T>
    where
        Bd: AsyncFn(&mut H::Tx) -> DbResult<T>,
    {
        let policy = options.policy.as_ref().unwrap_or(&self.default_policy);
        let factory = self.factory.clone();
        self.coordinator
            .transact(
                name,
                &self.target,
                policy,
                async move || factory().await,
                body,
            )
            .await
    }

    /// Issue a trivial round-trip and report the target's current health
    /// record. Intended for liveness/readiness probes.
    pub async fn health_check(&self) -> HealthCheckReport {
        let started = Instant::now();
        let ping = self
            .executor_result("health_check", &self.default_policy, &async |handle: &H| {
                handle.ping().await
            })
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let status = if ping.is_success() && self.health.is_healthy(&self.target).await {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        HealthCheckReport {
            status,
            latency_ms,
            stats: self.connection_stats().await,
        }
    }

    /// Snapshot of registry size and per-target health.
    pub async fn connection_stats(&self) -> ConnectionStats {
        let records = self.health.all().await;
        let healthy_connections = records.values().filter(|r| r.is_healthy).count();
        ConnectionStats {
            total_connections: self.registry.len().await,
            healthy_connections,
            per_target: records
                .into_iter()
                .map(|(target, record)| (target.to_string(), record))
                .collect(),
        }
    }

    /// Maintenance operation: discard handles whose consecutive failure
    /// count exceeds the configured threshold, so the next use rebuilds
    /// from scratch. "Currently failing" alone never evicts - a single
    /// failure marks a target unhealthy, only sustained failure discards it.
    pub async fn evict_unhealthy(&self) -> Vec<ConnectionTarget> {
        let candidates = self.health.targets_exceeding(self.eviction_threshold).await;
        let mut evicted = Vec::with_capacity(candidates.len());
        for target in candidates {
            if self.registry.evict(&target).await {
                info!(target = %target, "Evicted sustained-unhealthy target");
                evicted.push(target);
            } else {
                // Health outlived the handle (already evicted); drop it too.
                self.health.remove(&target).await;
            }
        }
        evicted
    }

    /// Drop a cached read result explicitly.
    pub async fn invalidate_cache_key(&self, key: &str) {
        self.cache.invalidate(key).await;
    }
}
