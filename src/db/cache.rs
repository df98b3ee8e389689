//! Read-through query cache.
//!
//! Advisory cache keyed by explicit caller-chosen strings; never
//! authoritative, safe to evict at any time. A hit returns the decoded
//! value without touching the connection layer at all. Store failures are
//! logged and swallowed - caching is skipped, the operation still succeeds.
//! There is no invalidation-on-write: callers that mutate data choose
//! short TTLs or call `invalidate` for affected keys themselves.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::DbResult;

#[derive(Debug, Error)]
#[error("cache store failed: {0}")]
pub struct CacheError(pub String);

/// Minimal key-value backend; any conforming store (in-process map,
/// distributed cache) may be substituted.
pub trait CacheBackend: Send + Sync {
    /// Fetch the value for `key`, if present and unexpired.
    fn get(&self, key: &str) -> impl Future<Output = Option<serde_json::Value>> + Send;

    /// Store `value` under `key` for `ttl`.
    fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Drop the entry for `key`, if any.
    fn remove(&self, key: &str) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// In-process cache backend. Expired entries are dropped on read; callers
/// running long may also sweep with `purge_expired`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (possibly expired, not yet swept) entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every expired entry.
    pub async fn purge_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
    }
}

impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: evict under the write lock.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.expires_at <= Instant::now()) {
            entries.remove(key);
        }
        None
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }
}

/// Read-through wrapper over a [`CacheBackend`].
pub struct QueryCache<B> {
    backend: B,
}

impl<B: CacheBackend> QueryCache<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Return the cached value for `key` if present and unexpired,
    /// otherwise run `loader`, store its result best-effort, and return it.
    ///
    /// The loader is never invoked on a hit. A value that fails to decode
    /// (schema drift between releases) is treated as a miss.
    pub async fn get_or_load<T, L>(&self, key: &str, ttl: Duration, loader: L) -> DbResult<T>
    where
        T: Serialize + DeserializeOwned,
        L: AsyncFnOnce() -> DbResult<T>,
    {
        if let Some(raw) = self.backend.get(key).await {
            match serde_json::from_value(raw) {
                Ok(value) => {
                    debug!(cache_key = %key, "Cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(cache_key = %key, error = %e, "Cached value failed to decode; reloading");
                    self.backend.remove(key).await;
                }
            }
        }

        let value = loader().await?;
        self.store(key, &value, ttl).await;
        Ok(value)
    }

    /// Store a value best-effort; failures only skip caching.
    pub async fn store<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_value(value) {
            Ok(raw) => {
                if let Err(e) = self.backend.set(key, raw, ttl).await {
                    warn!(cache_key = %key, error = %e, "Cache store failed; skipping");
                }
            }
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Value not cacheable; skipping");
            }
        }
    }

    /// Explicitly drop a key, for callers that just mutated the data it
    /// reflects.
    pub async fn invalidate(&self, key: &str) {
        self.backend.remove(key).await;
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
