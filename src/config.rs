//! Configuration handling for the database access layer.
//!
//! Configuration is supplied by the embedding application, typically from
//! the environment; every flag has an env fallback so the probe binary and
//! serverless deployments can run without arguments.

use crate::db::retry::RetryPolicy;
use clap::Parser;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_EVICTION_THRESHOLD: u32 = 5;
pub const DEFAULT_MAX_POOL_CONNECTIONS: u32 = 10;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60;

/// Configuration for the database access layer.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "db-access-layer",
    about = "Resilient database access layer - health probe and connection diagnostics",
    version
)]
pub struct Config {
    /// Connection URL for the remote relational store (sensitive - not logged).
    #[arg(long, value_name = "URL", env = "DATABASE_URL")]
    pub database_url: String,

    /// Maximum attempts per operation (minimum 1).
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES, env = "DB_MAX_RETRIES")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds; doubles after each failed attempt.
    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY_MS, env = "DB_RETRY_DELAY_MS")]
    pub retry_delay_ms: u64,

    /// Connection establishment timeout in milliseconds.
    #[arg(long, default_value_t = DEFAULT_CONNECTION_TIMEOUT_MS, env = "DB_CONNECTION_TIMEOUT_MS")]
    pub connection_timeout_ms: u64,

    /// Per-attempt operation timeout in milliseconds.
    #[arg(long, default_value_t = DEFAULT_QUERY_TIMEOUT_MS, env = "DB_QUERY_TIMEOUT_MS")]
    pub query_timeout_ms: u64,

    /// Consecutive failures before a target becomes eligible for eviction.
    #[arg(long, default_value_t = DEFAULT_EVICTION_THRESHOLD, env = "DB_EVICTION_THRESHOLD")]
    pub eviction_threshold: u32,

    /// Maximum physical connections in the pool behind each handle.
    #[arg(long, default_value_t = DEFAULT_MAX_POOL_CONNECTIONS, env = "DB_MAX_POOL_CONNECTIONS")]
    pub max_pool_connections: u32,

    /// Default TTL in seconds for cached read results.
    #[arg(long, default_value_t = DEFAULT_CACHE_TTL_SECS, env = "DB_CACHE_TTL_SECS")]
    pub cache_ttl_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "DB_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format.
    #[arg(long, env = "DB_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// A configuration with all defaults and the given URL (useful for tests
    /// and for embedding without CLI parsing).
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            eviction_threshold: DEFAULT_EVICTION_THRESHOLD,
            max_pool_connections: DEFAULT_MAX_POOL_CONNECTIONS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// The retry policy derived from this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.max(1),
            base_delay: Duration::from_millis(self.retry_delay_ms),
            timeout: self.query_timeout_duration(),
            max_delay: None,
        }
    }

    /// Get the connection timeout as a Duration.
    pub fn connection_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Get the per-attempt query timeout as a Duration.
    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Get the default cache TTL as a Duration.
    pub fn cache_ttl_duration(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
