// crates/catalog-store-sqlite/src/pool.rs
// ============================================================================
// Module: Connection Pooling
// Description: Opens the single writer connection and the `r2d2` read pool
// sharing one `SQLite` file under WAL.
// Purpose: Give every store one place that applies pragmas consistently,
// instead of repeating `PRAGMA` calls at every open site.
// Dependencies: rusqlite, r2d2, r2d2_sqlite
// ============================================================================

//! ## Overview
//! `SQLite`'s single-writer model means a pooled write connection buys
//! nothing: only one writer transaction can hold the reserved lock at a time
//! regardless of pool size. We open exactly one writer connection, guarded by
//! a [`std::sync::Mutex`], and pool only the read-only connections through
//! `r2d2`/`r2d2_sqlite`, matching the way the wider example corpus pairs
//! `r2d2` with a non-Postgres backend: one manager, one pool, sized from
//! `AppConfig`.

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use rusqlite::OpenFlags;

use crate::error::SqliteStoreError;

/// Busy timeout applied to every connection, in milliseconds.
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Opens the single writer connection for a store file, creating the parent
/// directory if needed, and applies the pragmas every writer depends on.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Io`] if the file cannot be opened or a pragma
/// fails.
pub fn open_writer(path: &Path) -> Result<Arc<Mutex<Connection>>, SqliteStoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    }
    let connection = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    apply_pragmas(&connection)?;
    Ok(Arc::new(Mutex::new(connection)))
}

/// Builds the read-only connection pool for a store file.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Io`] if the pool cannot be built.
pub fn build_read_pool(
    path: &Path,
    max_open_conns: u32,
    max_idle_conns: u32,
    conn_max_lifetime: Duration,
) -> Result<Pool<SqliteConnectionManager>, SqliteStoreError> {
    let manager = SqliteConnectionManager::file(path).with_flags(
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    );
    Pool::builder()
        .max_size(max_open_conns)
        .min_idle(Some(max_idle_conns))
        .max_lifetime(Some(conn_max_lifetime))
        .connection_customizer(Box::new(ReadConnectionCustomizer))
        .build(manager)
        .map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Applies WAL + busy-timeout pragmas to every pooled read connection as it
/// is created.
#[derive(Debug)]
struct ReadConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ReadConnectionCustomizer {
    fn on_acquire(&self, connection: &mut Connection) -> Result<(), rusqlite::Error> {
        connection.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        connection.pragma_update(None, "journal_mode", "WAL")?;
        Ok(())
    }
}

/// Applies the writer pragmas: WAL journaling, `NORMAL` sync, a busy
/// timeout, and foreign-key enforcement.
fn apply_pragmas(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS)).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    connection.pragma_update(None, "journal_mode", "WAL").map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    connection.pragma_update(None, "synchronous", "NORMAL").map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    connection.pragma_update(None, "foreign_keys", true).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    Ok(())
}
