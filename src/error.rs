//! Error types for the database access layer.
//!
//! This module defines all error types using `thiserror` and the binary
//! retryable/non-retryable classification the retry machinery relies on.
//! Classification prefers structured SQLSTATE codes from the driver and
//! falls back to message substrings only when no code is available; the
//! fallback is a known source of misclassification for exotic drivers.

use thiserror::Error;

/// Terminal error category surfaced to callers in an `OperationResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Constructing a connection handle failed. Fatal to the current call.
    ConnectionSetupFailed,
    /// The per-attempt timer fired before the operation completed.
    Timeout,
    /// A transient failure; the retry budget was exhausted by the time the
    /// caller sees this kind.
    Retryable,
    /// The request itself is wrong (auth, syntax, undefined object,
    /// constraint violation). Retrying cannot help.
    NonRetryable,
    /// A transaction body failed non-retryably; rollback already happened.
    TransactionAborted,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection setup failed: {message}")]
    ConnectionSetup { message: String },

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Transient database error: {message}")]
    Retryable {
        message: String,
        /// SQLSTATE code when the driver supplied one, e.g. "40001".
        sql_state: Option<String>,
    },

    #[error("Database rejected the request: {message}")]
    NonRetryable {
        message: String,
        /// SQLSTATE code when the driver supplied one, e.g. "23505".
        sql_state: Option<String>,
    },

    #[error("Transaction aborted and rolled back: {message}")]
    TransactionAborted { message: String },
}

/// SQLSTATE classes that indicate the request itself is wrong: data
/// exceptions, constraint violations, auth failures, undefined
/// database/schema, and syntax or access-rule violations.
const NON_RETRYABLE_SQLSTATE_CLASSES: &[&str] = &["22", "23", "28", "3D", "3F", "42"];

/// Message fragments used only when the driver gives us no SQLSTATE.
const NON_RETRYABLE_MESSAGE_FRAGMENTS: &[&str] = &[
    "authentication failed",
    "password authentication",
    "permission denied",
    "syntax error",
    "does not exist",
    "duplicate key",
    "violates",
];

impl DbError {
    /// Create a connection setup error.
    pub fn connection_setup(message: impl Into<String>) -> Self {
        Self::ConnectionSetup {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    /// Create a transient error.
    pub fn retryable(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Retryable {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a non-retryable error.
    pub fn non_retryable(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::NonRetryable {
            message: message.into(),
            sql_state,
        }
    }

    /// Wrap the failure that aborted a transaction. The rollback has already
    /// been issued by the time this is constructed.
    pub fn transaction_aborted(cause: &DbError) -> Self {
        Self::TransactionAborted {
            message: cause.to_string(),
        }
    }

    /// The terminal category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionSetup { .. } => ErrorKind::ConnectionSetupFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Retryable { .. } => ErrorKind::Retryable,
            Self::NonRetryable { .. } => ErrorKind::NonRetryable,
            Self::TransactionAborted { .. } => ErrorKind::TransactionAborted,
        }
    }

    /// Whether re-attempting the same operation is safe and potentially
    /// productive. Setup failures and aborted transactions are fatal to the
    /// current call; only `Retryable` and `Timeout` have backoff-and-retry
    /// semantics.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. } | Self::Timeout { .. })
    }

    /// The SQLSTATE code, when the underlying driver supplied one.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Retryable { sql_state, .. } | Self::NonRetryable { sql_state, .. } => {
                sql_state.as_deref()
            }
            _ => None,
        }
    }
}

/// Classify a driver-level database error by SQLSTATE class, falling back to
/// message substrings when no code is available.
fn classify_database_error(message: &str, sql_state: Option<String>) -> DbError {
    if let Some(code) = &sql_state {
        let class = &code[..code.len().min(2)];
        if NON_RETRYABLE_SQLSTATE_CLASSES.contains(&class) {
            return DbError::non_retryable(message, sql_state);
        }
        return DbError::retryable(message, sql_state);
    }

    let lowered = message.to_lowercase();
    if NON_RETRYABLE_MESSAGE_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
    {
        return DbError::non_retryable(message, None);
    }
    DbError::retryable(message, None)
}

/// Convert sqlx errors into the layer's taxonomy.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection_setup(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                classify_database_error(db_err.message(), code)
            }
            sqlx::Error::PoolTimedOut => {
                DbError::retryable("connection pool acquire timed out", None)
            }
            sqlx::Error::PoolClosed => DbError::retryable("connection pool is closed", None),
            sqlx::Error::Io(io_err) => DbError::retryable(format!("I/O error: {io_err}"), None),
            sqlx::Error::Tls(tls_err) => DbError::retryable(format!("TLS error: {tls_err}"), None),
            sqlx::Error::Protocol(msg) => DbError::retryable(format!("protocol error: {msg}"), None),
            sqlx::Error::WorkerCrashed => DbError::retryable("database worker crashed", None),
            sqlx::Error::RowNotFound => DbError::non_retryable("no rows returned", None),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::non_retryable(format!("column not found: {col}"), None)
            }
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::non_retryable(format!("type not found: {type_name}"), None)
            }
            other => DbError::retryable(format!("database error: {other}"), None),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
