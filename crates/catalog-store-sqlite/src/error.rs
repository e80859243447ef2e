// crates/catalog-store-sqlite/src/error.rs
// ============================================================================
// Module: Store Error
// Description: SQLite-specific failure kinds, collapsed to `CoreError` at the
// trait boundary.
// Purpose: Keep `rusqlite`/`r2d2` error types out of `catalog-core` while
// still distinguishing "locked, retry" from "malformed data" internally.
// Dependencies: thiserror, catalog-core
// ============================================================================

use catalog_core::CoreError;
use thiserror::Error;

/// Errors raised by the SQLite-backed stores.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// The database file could not be opened or a pragma could not be set.
    #[error("sqlite store io error: {0}")]
    Io(String),

    /// `SQLite` returned `SQLITE_BUSY`/`SQLITE_LOCKED` and retries were
    /// exhausted.
    #[error("sqlite store busy: {0}")]
    Busy(String),

    /// A query or statement failed for a reason other than lock contention.
    #[error("sqlite store db error: {0}")]
    Db(String),

    /// A row's JSON payload or id failed to decode.
    #[error("sqlite store decode error: {0}")]
    Decode(String),

    /// The referenced upload, catalog table, or snapshot does not exist.
    #[error("sqlite store not found: {0}")]
    NotFound(String),

    /// Caller-supplied input is invalid (e.g. duplicate snapshot name).
    #[error("sqlite store invalid input: {0}")]
    Invalid(String),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(sqlite_error, _) = &error
            && matches!(
                sqlite_error.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
        {
            return Self::Busy(error.to_string());
        }
        Self::Db(error.to_string())
    }
}

impl From<r2d2::Error> for SqliteStoreError {
    fn from(error: r2d2::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<SqliteStoreError> for CoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Busy(message) => Self::Busy(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
            SqliteStoreError::Invalid(message) => Self::Validation(message),
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) | SqliteStoreError::Decode(message) => {
                Self::Internal(message)
            }
        }
    }
}
