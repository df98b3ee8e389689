//! Test doubles for exercising the access layer without a live server.
//!
//! `MockHandle` implements `DatabaseHandle` over shared in-memory state:
//! call counters, scriptable begin/ping outcomes, and a tiny staged-write
//! store so rollback visibility can be asserted the way a real re-query
//! would.

#![allow(dead_code)]

use db_access_layer::db::{DatabaseHandle, HandleFactory};
use db_access_layer::error::{DbError, DbResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MockState {
    pub begin_calls: AtomicU32,
    pub commit_calls: AtomicU32,
    pub rollback_calls: AtomicU32,
    pub ping_calls: AtomicU32,
    /// Scripted outcomes consumed front-first; empty means `Ok`.
    pub begin_script: Mutex<VecDeque<DbResult<()>>>,
    /// Scripted outcomes consumed front-first; empty means `Ok`.
    pub ping_script: Mutex<VecDeque<DbResult<()>>>,
    /// Rows visible outside any transaction. Commits append staged rows;
    /// rollbacks discard them.
    pub store: Mutex<Vec<String>>,
}

impl MockState {
    pub fn begin_count(&self) -> u32 {
        self.begin_calls.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> u32 {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> u32 {
        self.rollback_calls.load(Ordering::SeqCst)
    }

    pub fn ping_count(&self) -> u32 {
        self.ping_calls.load(Ordering::SeqCst)
    }

    pub fn visible_rows(&self) -> Vec<String> {
        self.store.lock().unwrap().clone()
    }

    pub fn script_pings(&self, outcomes: impl IntoIterator<Item = DbResult<()>>) {
        self.ping_script.lock().unwrap().extend(outcomes);
    }

    pub fn script_begins(&self, outcomes: impl IntoIterator<Item = DbResult<()>>) {
        self.begin_script.lock().unwrap().extend(outcomes);
    }
}

#[derive(Clone, Default)]
pub struct MockHandle {
    pub state: Arc<MockState>,
}

impl MockHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reference identity of the shared state, for handle-reuse assertions.
    pub fn same_handle(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// An open mock transaction holding staged rows until commit.
pub struct MockTx {
    state: Arc<MockState>,
    staged: Vec<String>,
}

impl MockTx {
    /// Simulate a side-effecting statement inside the transaction.
    pub fn stage(&mut self, row: impl Into<String>) {
        self.staged.push(row.into());
    }
}

impl DatabaseHandle for MockHandle {
    type Tx = MockTx;

    async fn begin(&self) -> DbResult<MockTx> {
        self.state.begin_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.state.begin_script.lock().unwrap().pop_front() {
            outcome?;
        }
        Ok(MockTx {
            state: self.state.clone(),
            staged: Vec::new(),
        })
    }

    async fn commit(tx: MockTx) -> DbResult<()> {
        tx.state.commit_calls.fetch_add(1, Ordering::SeqCst);
        tx.state.store.lock().unwrap().extend(tx.staged);
        Ok(())
    }

    async fn rollback(tx: MockTx) -> DbResult<()> {
        tx.state.rollback_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> DbResult<()> {
        self.state.ping_calls.fetch_add(1, Ordering::SeqCst);
        match self.state.ping_script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(()),
        }
    }
}

/// A boxed factory returning clones of the given handle, for `DbService`.
pub fn mock_factory(handle: &MockHandle) -> HandleFactory<MockHandle> {
    let handle = handle.clone();
    let factory: HandleFactory<MockHandle> = Arc::new(move || {
        let handle = handle.clone();
        Box::pin(async move { Ok(handle) })
    });
    factory
}

/// A transient error of the shape a flaky network produces.
pub fn network_reset() -> DbError {
    DbError::retryable("connection reset by peer", None)
}

/// A unique-constraint violation, the canonical non-retryable failure.
pub fn unique_violation() -> DbError {
    DbError::non_retryable(
        "duplicate key value violates unique constraint",
        Some("23505".to_string()),
    )
}
