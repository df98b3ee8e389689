//! Connection handle abstraction.
//!
//! The registry, retry executor and transaction coordinator are generic over
//! a [`DatabaseHandle`] so the failure semantics can be exercised without a
//! live server. The production implementation is [`PgHandle`], a thin
//! wrapper over an `sqlx::PgPool`; the pool itself is the shareable handle,
//! so many concurrent logical callers ride a small bounded set of physical
//! connections.

use crate::config::Config;
use crate::error::{DbError, DbResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

/// A live, reusable connection handle for one target.
///
/// Implementations must be cheap to clone and safe for concurrent use; a
/// pooled driver satisfies both. A handle type that cannot be shared must
/// wrap its own pool instead.
pub trait DatabaseHandle: Clone + Send + Sync + 'static {
    /// An open transaction on this handle.
    type Tx: Send;

    /// Begin a transaction.
    fn begin(&self) -> impl Future<Output = DbResult<Self::Tx>> + Send;

    /// Commit an open transaction, consuming it.
    fn commit(tx: Self::Tx) -> impl Future<Output = DbResult<()>> + Send;

    /// Roll back an open transaction, consuming it.
    fn rollback(tx: Self::Tx) -> impl Future<Output = DbResult<()>> + Send;

    /// Issue a trivial round-trip to verify the target is serving requests.
    fn ping(&self) -> impl Future<Output = DbResult<()>> + Send;
}

/// PostgreSQL handle backed by a shared `PgPool`.
#[derive(Debug, Clone)]
pub struct PgHandle {
    pool: PgPool,
}

impl PgHandle {
    /// Connect to the configured store and wrap the pool.
    pub async fn connect(config: &Config) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_pool_connections)
            .acquire_timeout(config.connection_timeout_duration())
            .connect(&config.database_url)
            .await
            .map_err(|e| DbError::connection_setup(format!("failed to connect: {e}")))?;

        debug!(
            max_connections = config.max_pool_connections,
            "Connected to database"
        );
        Ok(Self { pool })
    }

    /// The underlying pool, for callers issuing sqlx queries inside a unit
    /// of work.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the pool. The registry rebuilds the handle on next resolve.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl DatabaseHandle for PgHandle {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> DbResult<Self::Tx> {
        self.pool.begin().await.map_err(DbError::from)
    }

    async fn commit(tx: Self::Tx) -> DbResult<()> {
        tx.commit().await.map_err(DbError::from)
    }

    async fn rollback(tx: Self::Tx) -> DbResult<()> {
        tx.rollback().await.map_err(DbError::from)
    }

    async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(DbError::from)
    }
}
