//! Resilient database access.
//!
//! This module provides the access-layer core:
//! - Target normalization and the process-wide connection registry
//! - Per-target health tracking
//! - Retry execution with exponential backoff and a timeout race
//! - Atomic transaction coordination
//! - Optional read-through query caching
//! - The `DbService` facade composing all of the above

pub mod cache;
pub mod handle;
pub mod health;
pub mod registry;
pub mod retry;
pub mod service;
pub mod target;
pub mod transaction;

pub use cache::{CacheBackend, CacheError, MemoryCache, QueryCache};
pub use handle::{DatabaseHandle, PgHandle};
pub use health::{HealthRecord, HealthTracker, MAX_RECENT_ERRORS};
pub use registry::ConnectionRegistry;
pub use retry::{OperationResult, RetryExecutor, RetryPolicy};
pub use service::{
    CachePolicy, ConnectionStats, DbService, HandleFactory, HealthCheckReport, HealthStatus,
    QueryOptions,
};
pub use target::ConnectionTarget;
pub use transaction::TransactionCoordinator;
