use thiserror::Error;

use crate::types::TableId;

/// Convenience alias for `Result<T, DbError>`.
pub type DbResult<T> = Result<T, DbError>;

/// Convenience alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Key–value substrate errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("map not found: {0}")]
    MapNotFound(String),

    #[error("map already exists with a different kind: {0}")]
    MapKindMismatch(String),

    #[error("transaction closed")]
    TransactionClosed,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt map entry in {map}: {detail}")]
    Corrupt { map: String, detail: String },
}

/// Table-core error taxonomy.
///
/// Classification for callers:
/// - `LockTimeout`, `Deadlock`, `ConcurrentUpdate` — retryable; the failed
///   statement left the table unchanged.
/// - `DuplicateKey`, `ColumnNotNullable`, `UnsupportedScan` — user errors.
/// - `InternalCheck` — invariant violation, always fatal.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("timeout trying to lock table {0}")]
    LockTimeout(String),

    #[error("deadlock detected:{0}")]
    Deadlock(String),

    #[error("duplicate key in unique index {index}: {key}")]
    DuplicateKey { index: String, key: String },

    #[error("concurrent update in unique index {0}: conflicting key is uncommitted in another session")]
    ConcurrentUpdate(String),

    #[error("primary key column {0} must not be nullable")]
    ColumnNotNullable(String),

    #[error("hash index {0} does not support range scans")]
    UnsupportedScan(String),

    #[error("transaction closed")]
    TransactionClosed,

    #[error("table not found: {0}")]
    TableNotFound(TableId),

    #[error("internal check failed: {0}")]
    InternalCheck(String),

    #[error("storage error: {0}")]
    Store(StoreError),
}

/// Substrate errors convert into the core taxonomy by hand so that the
/// closed-transaction case keeps its own kind instead of hiding behind
/// a generic storage error.
impl From<StoreError> for DbError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TransactionClosed => DbError::TransactionClosed,
            other => DbError::Store(other),
        }
    }
}

impl DbError {
    /// True when retrying the statement may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::LockTimeout(_) | DbError::Deadlock(_) | DbError::ConcurrentUpdate(_)
        )
    }

    /// True for invariant violations that must never occur. These indicate
    /// a bug in the engine, not in the statement.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DbError::InternalCheck(_))
    }

    /// Construct an internal-check failure and log it before returning.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!("internal check failed: {}", message);
        DbError::InternalCheck(message)
    }
}
