//! Resilient Database Access Layer
//!
//! Connection reuse, transient-failure retries with exponential backoff,
//! per-target health tracking, atomic transactions and advisory read
//! caching for relational stores reachable over the network. The layer
//! treats units of work as opaque: callers supply a query or transaction
//! body and this crate is only concerned with how reliably it reaches the
//! store and comes back.

pub mod config;
pub mod db;
pub mod error;

pub use config::Config;
pub use db::{DbService, OperationResult, QueryOptions, RetryPolicy};
pub use error::{DbError, DbResult, ErrorKind};
