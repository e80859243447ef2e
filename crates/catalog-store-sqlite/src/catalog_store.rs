// crates/catalog-store-sqlite/src/catalog_store.rs
// ============================================================================
// Module: Catalog Store
// Description: `CatalogStore` implementation over a single `SQLite` file:
// uploads, constants, dynamic catalog tables, nomenclature, normalized
// output, snapshots, and quality rows.
// Purpose: The only crate that knows the physical schema; every other crate
// programs against `catalog_core::interfaces::CatalogStore`.
// Dependencies: rusqlite, r2d2, r2d2_sqlite, catalog-core
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use catalog_core::CoreError;
use catalog_core::domain::CatalogItem;
use catalog_core::domain::ItemAttribute;
use catalog_core::domain::ItemAttributeType;
use catalog_core::domain::NomenclatureItem;
use catalog_core::domain::NormalizedData;
use catalog_core::domain::ProcessingLevel;
use catalog_core::domain::Snapshot;
use catalog_core::domain::SnapshotType;
use catalog_core::domain::Upload;
use catalog_core::domain::UploadCounters;
use catalog_core::domain::UploadStatus;
use catalog_core::hashing::catalog_table_name;
use catalog_core::identifiers::CatalogRowId;
use catalog_core::identifiers::ClientId;
use catalog_core::identifiers::ConstantId;
use catalog_core::identifiers::IcCode;
use catalog_core::identifiers::NormalizedDataId;
use catalog_core::identifiers::ProjectDatabaseId;
use catalog_core::identifiers::ProjectId;
use catalog_core::identifiers::SnapshotId;
use catalog_core::identifiers::UploadRowId;
use catalog_core::identifiers::UploadUuid;
use catalog_core::interfaces::BatchOutcome;
use catalog_core::interfaces::CatalogStore;
use catalog_core::interfaces::IcPendingGroup;
use catalog_core::interfaces::SourceRow;
use catalog_core::interfaces::UploadDraft;
use catalog_core::time::Timestamp;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use time::OffsetDateTime;

use crate::error::SqliteStoreError;
use crate::pool as store_pool;
use crate::schema;

/// Fixed physical table nomenclature items are stored in; unlike catalog
/// items, nomenclature has one known shape and needs no dynamic table.
const NOMENCLATURE_TABLE: &str = "nomenclature_items";

/// `SQLite`-backed unified catalog store.
///
/// # Invariants
/// - All writes go through `write`, serialized by its mutex; `SQLite`'s
///   single-writer model means a connection pool would not add write
///   concurrency, only contention.
/// - Reads that do not participate in a write use `read_pool` so they are
///   not blocked behind an in-flight write transaction under WAL.
pub struct SqliteCatalogStore {
    write: Arc<Mutex<Connection>>,
    read_pool: Pool<SqliteConnectionManager>,
}

impl SqliteCatalogStore {
    /// Opens (creating if needed) the unified catalog store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Io`] if the file cannot be opened or
    /// pooled, [`SqliteStoreError::Db`] if schema migration fails.
    pub fn open(
        path: &Path,
        max_open_conns: u32,
        max_idle_conns: u32,
        conn_max_lifetime: Duration,
    ) -> Result<Self, SqliteStoreError> {
        let write = store_pool::open_writer(path)?;
        schema::migrate_catalog_schema(&lock(&write))?;
        let read_pool = store_pool::build_read_pool(path, max_open_conns, max_idle_conns, conn_max_lifetime)?;
        Ok(Self { write, read_pool })
    }

    fn read_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, SqliteStoreError> {
        self.read_pool.get().map_err(Into::into)
    }

    fn find_upload_id(connection: &Connection, uuid: UploadUuid) -> Result<UploadRowId, SqliteStoreError> {
        connection
            .query_row("SELECT id FROM uploads WHERE uuid = ?1", params![uuid.to_string()], |row| row.get(0))
            .optional()?
            .map(UploadRowId)
            .ok_or_else(|| SqliteStoreError::NotFound(format!("upload {uuid} not found")))
    }
}

/// Locks `mutex`, recovering the inner guard if a prior holder panicked
/// rather than poisoning every subsequent access.
pub(crate) fn lock(mutex: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl CatalogStore for SqliteCatalogStore {
    fn create_upload(&self, draft: UploadDraft) -> Result<Upload, CoreError> {
        let uuid = UploadUuid::new_v4();
        let started_at = Timestamp::from_offset_date_time(OffsetDateTime::now_utc());
        let connection = lock(&self.write);
        connection.execute(
            "INSERT INTO uploads (
                uuid, started_at, completed_at, status, version_erp, config_name,
                iteration_number, iteration_label, programmer, purpose, parent_upload_id,
                database_id, client_id, project_id, computer_name, user_name, config_version,
                total_constants, total_catalogs, total_items
            ) VALUES (?1, ?2, NULL, 'in_progress', ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, 0, 0, 0)",
            params![
                uuid.to_string(),
                started_at.to_rfc3339().map_err(|err| CoreError::Internal(err.to_string()))?,
                draft.version_erp,
                draft.config_name,
                draft.iteration_number,
                draft.iteration_label,
                draft.programmer,
                draft.purpose,
                draft.parent_upload_id.map(UploadRowId::get),
                draft.database_id.map(ProjectDatabaseId::get),
                draft.client_id.map(ClientId::get),
                draft.project_id.map(ProjectId::get),
                draft.computer_name,
                draft.user_name,
                draft.config_version,
            ],
        ).map_err(SqliteStoreError::from)?;
        let id = UploadRowId(connection.last_insert_rowid());
        Ok(Upload {
            id,
            uuid,
            started_at,
            completed_at: None,
            status: UploadStatus::InProgress,
            version_erp: draft.version_erp,
            config_name: draft.config_name,
            iteration_number: draft.iteration_number,
            iteration_label: draft.iteration_label,
            programmer: draft.programmer,
            purpose: draft.purpose,
            parent_upload_id: draft.parent_upload_id,
            database_id: draft.database_id,
            client_id: draft.client_id,
            project_id: draft.project_id,
            computer_name: draft.computer_name,
            user_name: draft.user_name,
            config_version: draft.config_version,
            counters: UploadCounters::default(),
        })
    }

    fn get_upload(&self, uuid: UploadUuid) -> Result<Option<Upload>, CoreError> {
        let connection = self.read_conn().map_err(SqliteStoreError::from)?;
        connection
            .query_row("SELECT * FROM uploads WHERE uuid = ?1", params![uuid.to_string()], row_to_upload)
            .optional()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))
    }

    fn complete_upload(&self, uuid: UploadUuid) -> Result<Upload, CoreError> {
        let connection = lock(&self.write);
        let existing = connection
            .query_row("SELECT * FROM uploads WHERE uuid = ?1", params![uuid.to_string()], row_to_upload)
            .optional()
            .map_err(SqliteStoreError::from)?
            .ok_or_else(|| CoreError::NotFound(format!("upload {uuid} not found")))?;
        if existing.status == UploadStatus::Completed {
            return Ok(existing);
        }
        let completed_at = Timestamp::from_offset_date_time(OffsetDateTime::now_utc());
        connection
            .execute(
                "UPDATE uploads SET status = 'completed', completed_at = ?1 WHERE uuid = ?2",
                params![completed_at.to_rfc3339().map_err(|err| CoreError::Internal(err.to_string()))?, uuid.to_string()],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(Upload { status: UploadStatus::Completed, completed_at: Some(completed_at), ..existing })
    }

    fn insert_constant(&self, upload: UploadUuid, constant: catalog_core::domain::Constant) -> Result<(), CoreError> {
        let connection = lock(&self.write);
        let upload_id = SqliteCatalogStore::find_upload_id(&connection, upload)?;
        connection.execute(
            "INSERT INTO constants (upload_id, name, synonym, type, value, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                upload_id.get(),
                constant.name,
                constant.synonym,
                constant.r#type,
                constant.value,
                constant.created_at.to_rfc3339().map_err(|err| CoreError::Internal(err.to_string()))?,
            ],
        ).map_err(SqliteStoreError::from)?;
        connection
            .execute("UPDATE uploads SET total_constants = total_constants + 1 WHERE id = ?1", params![upload_id.get()])
            .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    fn ensure_catalog_table(&self, upload: UploadUuid, catalog_name: &str) -> Result<String, CoreError> {
        let table_name = catalog_table_name(catalog_name);
        let connection = lock(&self.write);
        let upload_id = SqliteCatalogStore::find_upload_id(&connection, upload)?;
        let already_exists: Option<String> = connection
            .query_row("SELECT table_name FROM catalog_tables WHERE catalog_name = ?1", params![catalog_name], |row| row.get(0))
            .optional()
            .map_err(SqliteStoreError::from)?;
        if let Some(existing) = already_exists {
            return Ok(existing);
        }
        connection
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{table_name}\" (
                    id                  INTEGER PRIMARY KEY,
                    upload_id           INTEGER NOT NULL REFERENCES uploads (id),
                    reference           TEXT NOT NULL,
                    code                TEXT NOT NULL,
                    name                TEXT NOT NULL,
                    attributes_payload  TEXT NOT NULL,
                    table_parts_payload TEXT NOT NULL,
                    created_at          TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS \"idx_{table_name}_reference\" ON \"{table_name}\" (reference);"
            ))
            .map_err(SqliteStoreError::from)?;
        connection
            .execute("INSERT INTO catalog_tables (catalog_name, table_name) VALUES (?1, ?2)", params![catalog_name, table_name])
            .map_err(SqliteStoreError::from)?;
        connection
            .execute("UPDATE uploads SET total_catalogs = total_catalogs + 1 WHERE id = ?1", params![upload_id.get()])
            .map_err(SqliteStoreError::from)?;
        Ok(table_name)
    }

    fn insert_catalog_items(&self, upload: UploadUuid, table_name: &str, items: Vec<CatalogItem>) -> Result<BatchOutcome, CoreError> {
        let connection = lock(&self.write);
        let upload_id = SqliteCatalogStore::find_upload_id(&connection, upload)?;
        ensure_registered_table(&connection, table_name)?;
        let mut outcome = BatchOutcome::default();
        let sql = format!(
            "INSERT INTO \"{table_name}\" (upload_id, reference, code, name, attributes_payload, table_parts_payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        );
        for item in items {
            let created_at = match item.created_at.to_rfc3339() {
                Ok(text) => text,
                Err(_) => {
                    outcome.failed_count += 1;
                    continue;
                }
            };
            let result = connection.execute(
                &sql,
                params![upload_id.get(), item.reference, item.code, item.name, item.attributes_payload, item.table_parts_payload, created_at],
            );
            match result {
                Ok(_) => outcome.processed_count += 1,
                Err(_) => outcome.failed_count += 1,
            }
        }
        connection
            .execute(
                "UPDATE uploads SET total_items = total_items + ?1 WHERE id = ?2",
                params![to_i64(outcome.processed_count), upload_id.get()],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(outcome)
    }

    fn insert_nomenclature_items(&self, upload: UploadUuid, items: Vec<NomenclatureItem>) -> Result<BatchOutcome, CoreError> {
        let connection = lock(&self.write);
        let upload_id = SqliteCatalogStore::find_upload_id(&connection, upload)?;
        let mut outcome = BatchOutcome::default();
        for item in items {
            let result = connection.execute(
                "INSERT INTO nomenclature_items (
                    upload_id, nomenclature_reference, nomenclature_code, nomenclature_name,
                    characteristic_reference, characteristic_name, attributes_payload, table_parts_payload
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    upload_id.get(),
                    item.nomenclature_reference,
                    item.nomenclature_code,
                    item.nomenclature_name,
                    item.characteristic_reference,
                    item.characteristic_name,
                    item.attributes_payload,
                    item.table_parts_payload,
                ],
            );
            match result {
                Ok(_) => outcome.processed_count += 1,
                Err(_) => outcome.failed_count += 1,
            }
        }
        connection
            .execute(
                "UPDATE uploads SET total_items = total_items + ?1 WHERE id = ?2",
                params![to_i64(outcome.processed_count), upload_id.get()],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(outcome)
    }

    fn read_source_rows(&self, table_name: &str) -> Result<Vec<SourceRow>, CoreError> {
        let connection = self.read_conn().map_err(SqliteStoreError::from)?;
        let sql = if table_name == NOMENCLATURE_TABLE {
            "SELECT nomenclature_reference, nomenclature_code, COALESCE(characteristic_name, nomenclature_name) FROM nomenclature_items".to_string()
        } else {
            ensure_registered_table(&connection, table_name)?;
            format!("SELECT reference, code, name FROM \"{table_name}\"")
        };
        let mut statement = connection.prepare(&sql).map_err(SqliteStoreError::from)?;
        let rows = statement
            .query_map([], |row| {
                Ok(SourceRow { reference: row.get(0)?, code: row.get(1)?, name: row.get(2)? })
            })
            .map_err(SqliteStoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(SqliteStoreError::from)?;
        Ok(rows)
    }

    fn insert_normalized_rows(&self, rows: Vec<NormalizedData>, attributes: Vec<ItemAttribute>) -> Result<(), CoreError> {
        let mut connection = lock(&self.write);
        let transaction = connection.transaction().map_err(SqliteStoreError::from)?;
        // Rows arrive with a caller-assigned placeholder id (NRM mints one per
        // group before the real autoincremented id exists); attributes carry
        // that same placeholder in `normalized_item_id`. Remap placeholder ->
        // real rowid here so attribute FKs land on the row SQLite actually
        // assigned, not the placeholder.
        let mut id_map: std::collections::HashMap<i64, i64> = std::collections::HashMap::with_capacity(rows.len());
        for row in rows {
            let placeholder = row.id.get();
            transaction.execute(
                "INSERT INTO normalized_data (
                    source_reference, source_name, code, normalized_name, normalized_reference, category,
                    merged_count, ai_confidence, ai_reasoning, processing_level, ic_code, ic_name, ic_confidence,
                    created_at, source_database_id, source_iteration_number
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    row.source_reference,
                    row.source_name,
                    row.code,
                    row.normalized_name,
                    row.normalized_reference,
                    row.category,
                    to_i64(row.merged_count),
                    row.ai_confidence,
                    row.ai_reasoning,
                    processing_level_str(row.processing_level),
                    row.ic_code.as_ref().map(IcCode::as_str),
                    row.ic_name,
                    row.ic_confidence,
                    row.created_at.to_rfc3339().map_err(|err| CoreError::Internal(err.to_string()))?,
                    row.source_database_id.map(ProjectDatabaseId::get),
                    row.source_iteration_number,
                ],
            ).map_err(SqliteStoreError::from)?;
            id_map.insert(placeholder, transaction.last_insert_rowid());
        }
        for attribute in attributes {
            let Some(&real_id) = id_map.get(&attribute.normalized_item_id.get()) else { continue };
            transaction.execute(
                "INSERT INTO normalized_item_attributes (
                    normalized_item_id, attribute_type, attribute_name, attribute_value, unit, original_text, confidence
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    real_id,
                    attribute_type_str(attribute.attribute_type),
                    attribute.attribute_name,
                    attribute.attribute_value,
                    attribute.unit,
                    attribute.original_text,
                    attribute.confidence,
                ],
            ).map_err(SqliteStoreError::from)?;
        }
        transaction.commit().map_err(SqliteStoreError::from)?;
        Ok(())
    }

    fn list_ic_pending_groups(&self) -> Result<Vec<IcPendingGroup>, CoreError> {
        let connection = self.read_conn().map_err(SqliteStoreError::from)?;
        let mut statement = connection
            .prepare(
                "SELECT normalized_name, category, SUM(merged_count) FROM normalized_data
                 WHERE ic_code IS NULL GROUP BY normalized_name, category",
            )
            .map_err(SqliteStoreError::from)?;
        let rows = statement
            .query_map([], |row| {
                Ok(IcPendingGroup {
                    normalized_name: row.get(0)?,
                    category: row.get(1)?,
                    merged_count: to_u64(row.get(2)?),
                })
            })
            .map_err(SqliteStoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(SqliteStoreError::from)?;
        Ok(rows)
    }

    fn write_ic_classification(
        &self,
        normalized_name: &str,
        category: &str,
        ic_code: IcCode,
        ic_name: String,
        ic_confidence: f64,
    ) -> Result<u64, CoreError> {
        let connection = lock(&self.write);
        let changed = connection
            .execute(
                "UPDATE normalized_data SET ic_code = ?1, ic_name = ?2, ic_confidence = ?3
                 WHERE normalized_name = ?4 AND category = ?5 AND ic_code IS NULL",
                params![ic_code.as_str(), ic_name, ic_confidence, normalized_name, category],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(u64::try_from(changed).unwrap_or(u64::MAX))
    }

    fn create_snapshot(&self, snapshot: Snapshot) -> Result<Snapshot, CoreError> {
        let mut connection = lock(&self.write);
        let transaction = connection.transaction().map_err(SqliteStoreError::from)?;
        transaction
            .execute(
                "INSERT INTO data_snapshots (name, type, project_id, client_id) VALUES (?1, ?2, ?3, ?4)",
                params![
                    snapshot.name,
                    snapshot_type_str(snapshot.r#type),
                    snapshot.project_id.map(ProjectId::get),
                    snapshot.client_id.map(ClientId::get),
                ],
            )
            .map_err(|err| {
                if is_unique_violation(&err) {
                    CoreError::Conflict(format!("snapshot {} already exists", snapshot.name))
                } else {
                    CoreError::from(SqliteStoreError::from(err))
                }
            })?;
        let id = SnapshotId(transaction.last_insert_rowid());
        for (ordinal, upload_id) in snapshot.included_uploads.iter().enumerate() {
            transaction.execute(
                "INSERT INTO snapshot_uploads (snapshot_id, upload_id, ordinal) VALUES (?1, ?2, ?3)",
                params![id.get(), upload_id.get(), to_i64(ordinal)],
            ).map_err(SqliteStoreError::from)?;
        }
        transaction.commit().map_err(SqliteStoreError::from)?;
        Ok(Snapshot { id, ..snapshot })
    }

    fn list_snapshots(&self) -> Result<Vec<Snapshot>, CoreError> {
        let connection = self.read_conn().map_err(SqliteStoreError::from)?;
        let mut statement = connection
            .prepare("SELECT id, name, type, project_id, client_id FROM data_snapshots ORDER BY id")
            .map_err(SqliteStoreError::from)?;
        let mut snapshots = statement
            .query_map([], |row| {
                Ok(Snapshot {
                    id: SnapshotId(row.get(0)?),
                    name: row.get(1)?,
                    r#type: parse_snapshot_type(&row.get::<_, String>(2)?),
                    project_id: row.get::<_, Option<i64>>(3)?.map(ProjectId),
                    client_id: row.get::<_, Option<i64>>(4)?.map(ClientId),
                    included_uploads: Vec::new(),
                })
            })
            .map_err(SqliteStoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(SqliteStoreError::from)?;
        for snapshot in &mut snapshots {
            let mut uploads_statement = connection
                .prepare("SELECT upload_id FROM snapshot_uploads WHERE snapshot_id = ?1 ORDER BY ordinal")
                .map_err(SqliteStoreError::from)?;
            snapshot.included_uploads = uploads_statement
                .query_map(params![snapshot.id.get()], |row| Ok(UploadRowId(row.get(0)?)))
                .map_err(SqliteStoreError::from)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(SqliteStoreError::from)?;
        }
        Ok(snapshots)
    }

    fn count_upload_rows(&self, upload: UploadUuid) -> Result<catalog_core::interfaces::UploadRowCounts, CoreError> {
        let connection = self.read_conn().map_err(SqliteStoreError::from)?;
        let upload_id = SqliteCatalogStore::find_upload_id(&connection, upload)?;
        let constants: i64 = connection
            .query_row("SELECT COUNT(*) FROM constants WHERE upload_id = ?1", params![upload_id.get()], |row| row.get(0))
            .map_err(SqliteStoreError::from)?;
        let nomenclature: i64 = connection
            .query_row("SELECT COUNT(*) FROM nomenclature_items WHERE upload_id = ?1", params![upload_id.get()], |row| row.get(0))
            .map_err(SqliteStoreError::from)?;
        let mut tables_statement =
            connection.prepare("SELECT table_name FROM catalog_tables").map_err(SqliteStoreError::from)?;
        let table_names = tables_statement
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(SqliteStoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(SqliteStoreError::from)?;
        let mut catalog_items = 0_i64;
        for table_name in table_names {
            let count: i64 = connection
                .query_row(&format!("SELECT COUNT(*) FROM \"{table_name}\" WHERE upload_id = ?1"), params![upload_id.get()], |row| {
                    row.get(0)
                })
                .map_err(SqliteStoreError::from)?;
            catalog_items += count;
        }
        Ok(catalog_core::interfaces::UploadRowCounts {
            constants: u64::try_from(constants).unwrap_or(0),
            items: u64::try_from(catalog_items + nomenclature).unwrap_or(0),
        })
    }

    fn record_quality_metric(&self, upload: UploadUuid, metric_name: &str, metric_value: f64) -> Result<(), CoreError> {
        let connection = lock(&self.write);
        let upload_id = SqliteCatalogStore::find_upload_id(&connection, upload)?;
        let recorded_at =
            Timestamp::from_offset_date_time(OffsetDateTime::now_utc()).to_rfc3339().map_err(|err| CoreError::Internal(err.to_string()))?;
        connection
            .execute(
                "INSERT INTO quality_metrics (upload_id, metric_name, metric_value, recorded_at) VALUES (?1, ?2, ?3, ?4)",
                params![upload_id.get(), metric_name, metric_value, recorded_at],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    fn record_quality_issue(
        &self,
        upload: UploadUuid,
        severity: &str,
        description: &str,
        sample_reference: Option<&str>,
    ) -> Result<(), CoreError> {
        let connection = lock(&self.write);
        let upload_id = SqliteCatalogStore::find_upload_id(&connection, upload)?;
        let recorded_at =
            Timestamp::from_offset_date_time(OffsetDateTime::now_utc()).to_rfc3339().map_err(|err| CoreError::Internal(err.to_string()))?;
        connection
            .execute(
                "INSERT INTO quality_issues (upload_id, severity, description, sample_reference, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![upload_id.get(), severity, description, sample_reference, recorded_at],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    fn save_job_checkpoint(&self, job_kind: &str, cursor_payload: &str) -> Result<(), CoreError> {
        let connection = lock(&self.write);
        let updated_at =
            Timestamp::from_offset_date_time(OffsetDateTime::now_utc()).to_rfc3339().map_err(|err| CoreError::Internal(err.to_string()))?;
        connection
            .execute(
                "INSERT INTO job_checkpoint (job_kind, cursor_payload, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(job_kind) DO UPDATE SET cursor_payload = excluded.cursor_payload, updated_at = excluded.updated_at",
                params![job_kind, cursor_payload, updated_at],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    fn load_job_checkpoint(&self, job_kind: &str) -> Result<Option<catalog_core::interfaces::JobCheckpoint>, CoreError> {
        let connection = self.read_conn().map_err(SqliteStoreError::from)?;
        let found: Option<(String, String)> = connection
            .query_row(
                "SELECT cursor_payload, updated_at FROM job_checkpoint WHERE job_kind = ?1",
                params![job_kind],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(SqliteStoreError::from)?;
        found
            .map(|(cursor_payload, updated_at)| {
                Ok(catalog_core::interfaces::JobCheckpoint {
                    cursor_payload,
                    updated_at: Timestamp::parse_rfc3339(&updated_at).map_err(|err| CoreError::Internal(err.to_string()))?,
                })
            })
            .transpose()
    }
}

/// Returns whether `error` is a `SQLite` `UNIQUE`/`PRIMARY KEY` constraint
/// violation, as opposed to any other database failure.
fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(sqlite_error, _)
            if sqlite_error.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Confirms `table_name` is a physical table minted by
/// [`catalog_core::hashing::catalog_table_name`] and registered in
/// `catalog_tables`, so it is safe to splice into SQL text: this is the only
/// place identifiers travel into a query string rather than a bound
/// parameter, and rejecting unregistered names closes the injection surface.
fn ensure_registered_table(connection: &Connection, table_name: &str) -> Result<(), CoreError> {
    let registered: Option<String> = connection
        .query_row("SELECT table_name FROM catalog_tables WHERE table_name = ?1", params![table_name], |row| row.get(0))
        .optional()
        .map_err(SqliteStoreError::from)?;
    if registered.is_none() {
        return Err(CoreError::NotFound(format!("catalog table {table_name} not found")));
    }
    Ok(())
}

fn row_to_upload(row: &Row<'_>) -> rusqlite::Result<Upload> {
    let uuid_text: String = row.get("uuid")?;
    let status_text: String = row.get("status")?;
    let started_at_text: String = row.get("started_at")?;
    let completed_at_text: Option<String> = row.get("completed_at")?;
    Ok(Upload {
        id: UploadRowId(row.get("id")?),
        uuid: UploadUuid::parse(&uuid_text).map_err(|_| rusqlite::Error::InvalidColumnType(0, "uuid".into(), rusqlite::types::Type::Text))?,
        started_at: Timestamp::parse_rfc3339(&started_at_text).map_err(|_| rusqlite::Error::InvalidColumnType(0, "started_at".into(), rusqlite::types::Type::Text))?,
        completed_at: completed_at_text
            .map(|text| {
                Timestamp::parse_rfc3339(&text).map_err(|_| rusqlite::Error::InvalidColumnType(0, "completed_at".into(), rusqlite::types::Type::Text))
            })
            .transpose()?,
        status: parse_upload_status(&status_text),
        version_erp: row.get("version_erp")?,
        config_name: row.get("config_name")?,
        iteration_number: row.get("iteration_number")?,
        iteration_label: row.get("iteration_label")?,
        programmer: row.get("programmer")?,
        purpose: row.get("purpose")?,
        parent_upload_id: row.get::<_, Option<i64>>("parent_upload_id")?.map(UploadRowId),
        database_id: row.get::<_, Option<i64>>("database_id")?.map(ProjectDatabaseId),
        client_id: row.get::<_, Option<i64>>("client_id")?.map(ClientId),
        project_id: row.get::<_, Option<i64>>("project_id")?.map(ProjectId),
        computer_name: row.get("computer_name")?,
        user_name: row.get("user_name")?,
        config_version: row.get("config_version")?,
        counters: UploadCounters {
            total_constants: to_u64(row.get("total_constants")?),
            total_catalogs: to_u64(row.get("total_catalogs")?),
            total_items: to_u64(row.get("total_items")?),
        },
    })
}

/// Converts a non-negative `u64` count to the `i64` `SQLite` binds require;
/// counts never approach `i64::MAX` in practice, so saturating is a safe
/// fallback rather than a silent wraparound.
const fn to_i64(value: u64) -> i64 {
    if value > i64::MAX as u64 { i64::MAX } else { value as i64 }
}

/// Converts a stored `i64` count column back to `u64`, saturating at zero
/// for the (never expected) negative case.
const fn to_u64(value: i64) -> u64 {
    if value < 0 { 0 } else { value as u64 }
}

fn parse_upload_status(text: &str) -> UploadStatus {
    match text {
        "completed" => UploadStatus::Completed,
        "failed" => UploadStatus::Failed,
        _ => UploadStatus::InProgress,
    }
}

fn parse_snapshot_type(text: &str) -> SnapshotType {
    if text == "auto_latest" { SnapshotType::AutoLatest } else { SnapshotType::Manual }
}

const fn snapshot_type_str(kind: SnapshotType) -> &'static str {
    match kind {
        SnapshotType::Manual => "manual",
        SnapshotType::AutoLatest => "auto_latest",
    }
}

const fn processing_level_str(level: ProcessingLevel) -> &'static str {
    match level {
        ProcessingLevel::Basic => "basic",
        ProcessingLevel::AiEnhanced => "ai_enhanced",
        ProcessingLevel::Benchmark => "benchmark",
    }
}

const fn attribute_type_str(kind: ItemAttributeType) -> &'static str {
    match kind {
        ItemAttributeType::TextValue => "text_value",
        ItemAttributeType::NumericValue => "numeric_value",
        ItemAttributeType::Dimension => "dimension",
        ItemAttributeType::ArticleCode => "article_code",
        ItemAttributeType::TechnicalCode => "technical_code",
    }
}

#[cfg(test)]
mod tests {
    use catalog_core::domain::Constant;

    use super::*;

    fn open_temp() -> (tempfile::TempDir, SqliteCatalogStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("catalog.db");
        let store = SqliteCatalogStore::open(&path, 4, 2, Duration::from_secs(60)).expect("open store");
        (dir, store)
    }

    fn sample_draft() -> UploadDraft {
        UploadDraft {
            version_erp: "1.0".into(),
            config_name: "Trade".into(),
            computer_name: "WS-1".into(),
            user_name: "erp".into(),
            config_version: "2.1".into(),
            iteration_number: 1,
            iteration_label: "initial".into(),
            programmer: "ivanov".into(),
            purpose: "sync".into(),
            parent_upload_id: None,
            database_id: None,
            client_id: None,
            project_id: None,
        }
    }

    #[test]
    fn create_and_fetch_upload_round_trips() {
        let (_dir, store) = open_temp();
        let created = store.create_upload(sample_draft()).expect("create");
        let fetched = store.get_upload(created.uuid).expect("get").expect("present");
        assert_eq!(fetched.uuid, created.uuid);
        assert_eq!(fetched.status, UploadStatus::InProgress);
    }

    #[test]
    fn complete_upload_is_idempotent() {
        let (_dir, store) = open_temp();
        let created = store.create_upload(sample_draft()).expect("create");
        let first = store.complete_upload(created.uuid).expect("complete");
        let second = store.complete_upload(created.uuid).expect("complete again");
        assert_eq!(first.completed_at, second.completed_at);
        assert_eq!(second.status, UploadStatus::Completed);
    }

    #[test]
    fn complete_unknown_upload_is_not_found() {
        let (_dir, store) = open_temp();
        let err = store.complete_upload(UploadUuid::new_v4()).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn insert_constant_increments_counter() {
        let (_dir, store) = open_temp();
        let upload = store.create_upload(sample_draft()).expect("create");
        let constant = Constant {
            id: ConstantId(0),
            upload_id: upload.id,
            name: "ФормаОрганизации".into(),
            synonym: String::new(),
            r#type: "string".into(),
            value: "ООО".into(),
            created_at: upload.started_at,
        };
        store.insert_constant(upload.uuid, constant).expect("insert");
        let refreshed = store.get_upload(upload.uuid).expect("get").expect("present");
        assert_eq!(refreshed.counters.total_constants, 1);
    }

    #[test]
    fn ensure_catalog_table_is_idempotent() {
        let (_dir, store) = open_temp();
        let upload = store.create_upload(sample_draft()).expect("create");
        let first = store.ensure_catalog_table(upload.uuid, "Номенклатура").expect("ensure");
        let second = store.ensure_catalog_table(upload.uuid, "Номенклатура").expect("ensure again");
        assert_eq!(first, second);
        let refreshed = store.get_upload(upload.uuid).expect("get").expect("present");
        assert_eq!(refreshed.counters.total_catalogs, 1);
    }

    #[test]
    fn insert_catalog_items_reports_batch_outcome() {
        let (_dir, store) = open_temp();
        let upload = store.create_upload(sample_draft()).expect("create");
        let table = store.ensure_catalog_table(upload.uuid, "Контрагенты").expect("ensure");
        let item = CatalogItem {
            id: CatalogRowId(0),
            upload_id: upload.id,
            table_name: table.clone(),
            reference: "r1".into(),
            code: "c1".into(),
            name: "ООО Ромашка".into(),
            attributes_payload: String::new(),
            table_parts_payload: String::new(),
            created_at: upload.started_at,
        };
        let outcome = store.insert_catalog_items(upload.uuid, &table, vec![item]).expect("insert");
        assert_eq!(outcome.processed_count, 1);
        assert_eq!(outcome.failed_count, 0);
    }

    #[test]
    fn read_source_rows_rejects_unregistered_table() {
        let (_dir, store) = open_temp();
        let err = store.read_source_rows("cat_not_registered").unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn ic_pending_groups_and_write_back() {
        let (_dir, store) = open_temp();
        let row = NormalizedData {
            id: NormalizedDataId(0),
            source_reference: "r1".into(),
            source_name: "Молоток 500г".into(),
            code: "c1".into(),
            normalized_name: "молоток".into(),
            normalized_reference: "ref-1".into(),
            category: "tools".into(),
            merged_count: 3,
            ai_confidence: None,
            ai_reasoning: None,
            processing_level: ProcessingLevel::Basic,
            ic_code: None,
            ic_name: None,
            ic_confidence: None,
            created_at: Timestamp::from_offset_date_time(OffsetDateTime::now_utc()),
            source_database_id: None,
            source_iteration_number: None,
        };
        store.insert_normalized_rows(vec![row], Vec::new()).expect("insert");
        let pending = store.list_ic_pending_groups().expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].merged_count, 3);
        let changed = store
            .write_ic_classification("молоток", "tools", IcCode::new("28.29.11"), "Hand tools".into(), 0.91)
            .expect("write back");
        assert_eq!(changed, 1);
        assert!(store.list_ic_pending_groups().expect("pending again").is_empty());
    }

    #[test]
    fn snapshot_round_trips_included_uploads() {
        let (_dir, store) = open_temp();
        let upload = store.create_upload(sample_draft()).expect("create");
        let snapshot = Snapshot {
            id: SnapshotId(0),
            name: "q1-2026".into(),
            r#type: SnapshotType::Manual,
            project_id: None,
            client_id: None,
            included_uploads: vec![upload.id],
        };
        let created = store.create_snapshot(snapshot).expect("create snapshot");
        let listed = store.list_snapshots().expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert_eq!(listed[0].included_uploads, vec![upload.id]);
    }

    #[test]
    fn duplicate_snapshot_name_is_conflict() {
        let (_dir, store) = open_temp();
        let make = |name: &str| Snapshot {
            id: SnapshotId(0),
            name: name.to_string(),
            r#type: SnapshotType::Manual,
            project_id: None,
            client_id: None,
            included_uploads: Vec::new(),
        };
        store.create_snapshot(make("q1-2026")).expect("first");
        let err = store.create_snapshot(make("q1-2026")).unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn count_upload_rows_matches_inserted_rows() {
        let (_dir, store) = open_temp();
        let upload = store.create_upload(sample_draft()).expect("create");
        let constant = Constant {
            id: ConstantId(0),
            upload_id: upload.id,
            name: "ФормаОрганизации".into(),
            synonym: String::new(),
            r#type: "string".into(),
            value: "ООО".into(),
            created_at: upload.started_at,
        };
        store.insert_constant(upload.uuid, constant).expect("insert constant");
        let table_name = store.ensure_catalog_table(upload.uuid, "Номенклатура").expect("ensure");
        let item = CatalogItem {
            id: CatalogRowId(0),
            upload_id: upload.id,
            table_name: table_name.clone(),
            reference: "r1".into(),
            code: "c1".into(),
            name: "молоток".into(),
            attributes_payload: "<a/>".into(),
            table_parts_payload: "<t/>".into(),
            created_at: upload.started_at,
        };
        store.insert_catalog_items(upload.uuid, &table_name, vec![item]).expect("insert items");
        let counts = store.count_upload_rows(upload.uuid).expect("count");
        assert_eq!(counts.constants, 1);
        assert_eq!(counts.items, 1);
    }

    #[test]
    fn record_quality_metric_and_issue_do_not_fail_on_unknown_upload() {
        let (_dir, store) = open_temp();
        let upload = store.create_upload(sample_draft()).expect("create");
        store.record_quality_metric(upload.uuid, "count_mismatch_ratio", 0.0).expect("record metric");
        store.record_quality_issue(upload.uuid, "warning", "constants count mismatch", Some("constants")).expect("record issue");
        let err = store.record_quality_metric(UploadUuid::new_v4(), "x", 0.0).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
