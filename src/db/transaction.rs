//! Transaction coordination.
//!
//! Executes a body of multi-statement work atomically on one handle:
//! begin, run the body, commit on success, roll back on failure. Because
//! relational transactions are all-or-nothing, a transaction that failed
//! with a retryable error leaves no visible side effects and is safe to
//! re-run from scratch - so the whole begin/body/commit sequence is handed
//! to the retry executor as a single unit of work, on a fresh handle each
//! attempt. Non-retryable failures surface immediately with the
//! transaction already rolled back.

use crate::db::handle::DatabaseHandle;
use crate::db::retry::{OperationResult, RetryExecutor, RetryPolicy};
use crate::db::target::ConnectionTarget;
use crate::error::{DbError, DbResult};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct TransactionCoordinator<H> {
    executor: Arc<RetryExecutor<H>>,
}

impl<H: DatabaseHandle> TransactionCoordinator<H> {
    pub fn new(executor: Arc<RetryExecutor<H>>) -> Self {
        Self { executor }
    }

    /// Run `body` atomically against `target` under `policy`.
    ///
    /// The body receives the open transaction and may issue any number of
    /// operations through it. On a retryable failure the body is re-executed
    /// from scratch; bodies must not capture state that assumes a single
    /// invocation.
    pub async fn transact<T, F, B>(
        &self,
        name: &str,
        target: &ConnectionTarget,
        policy: &RetryPolicy,
        factory: F,
        body: B,
    ) -> OperationResult<T>
    where
        F: AsyncFn() -> DbResult<H>,
        B: AsyncFn(&mut H::Tx) -> DbResult<T>,
    {
        // Correlation id for log lines only; never part of the protocol.
        let tx_id = format!("tx_{}", uuid::Uuid::new_v4().simple());

        self.executor
            .run(name, target, policy, factory, async |handle| {
                run_transaction(handle, &tx_id, &body).await
            })
            .await
    }
}

/// One attempt: begin, body, commit. Rollback on body failure is
/// best-effort; the body's error wins over a rollback error.
async fn run_transaction<H, T, B>(handle: &H, tx_id: &str, body: &B) -> DbResult<T>
where
    H: DatabaseHandle,
    B: AsyncFn(&mut H::Tx) -> DbResult<T>,
{
    let mut tx = handle.begin().await?;
    debug!(transaction_id = %tx_id, "Transaction started");

    match body(&mut tx).await {
        Ok(value) => {
            H::commit(tx).await?;
            debug!(transaction_id = %tx_id, "Transaction committed");
            Ok(value)
        }
        Err(err) => {
            if let Err(rb_err) = H::rollback(tx).await {
                warn!(
                    transaction_id = %tx_id,
                    error = %rb_err,
                    "Rollback failed after body error"
                );
            } else {
                debug!(transaction_id = %tx_id, error = %err, "Transaction rolled back");
            }
            if err.is_retryable() {
                // Nothing committed; the executor may safely re-run us.
                Err(err)
            } else {
                Err(DbError::transaction_aborted(&err))
            }
        }
    }
}
