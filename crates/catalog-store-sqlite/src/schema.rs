// crates/catalog-store-sqlite/src/schema.rs
// ============================================================================
// Module: Schema
// Description: DDL and `PRAGMA user_version`-gated migration for both the
// unified catalog store and the service store.
// Purpose: Keep schema creation idempotent and versioned so repeated opens of
// the same file are cheap no-ops.
// Dependencies: rusqlite
// ============================================================================

use rusqlite::Connection;

use crate::error::SqliteStoreError;

/// Schema version for the unified catalog store.
const CATALOG_SCHEMA_VERSION: i64 = 1;
/// Schema version for the service store.
const SERVICE_SCHEMA_VERSION: i64 = 2;

/// Creates (or verifies) the unified catalog store schema: uploads,
/// constants, nomenclature, normalized output, snapshots, and quality
/// tables. Dynamic per-catalog tables are created on demand by
/// [`crate::catalog_store::SqliteCatalogStore::ensure_catalog_table`], not
/// here.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] if any statement fails.
pub fn migrate_catalog_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    let current: i64 = connection.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current >= CATALOG_SCHEMA_VERSION {
        return Ok(());
    }
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS uploads (
            id                  INTEGER PRIMARY KEY,
            uuid                TEXT NOT NULL UNIQUE,
            started_at          TEXT NOT NULL,
            completed_at        TEXT,
            status              TEXT NOT NULL,
            version_erp         TEXT NOT NULL,
            config_name         TEXT NOT NULL,
            iteration_number    INTEGER NOT NULL,
            iteration_label     TEXT NOT NULL,
            programmer          TEXT NOT NULL,
            purpose             TEXT NOT NULL,
            parent_upload_id    INTEGER,
            database_id         INTEGER,
            client_id           INTEGER,
            project_id          INTEGER,
            computer_name       TEXT NOT NULL,
            user_name           TEXT NOT NULL,
            config_version      TEXT NOT NULL,
            total_constants     INTEGER NOT NULL DEFAULT 0,
            total_catalogs      INTEGER NOT NULL DEFAULT 0,
            total_items         INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_uploads_uuid ON uploads (uuid);
        CREATE INDEX IF NOT EXISTS idx_uploads_config_name ON uploads (config_name, iteration_number);

        CREATE TABLE IF NOT EXISTS constants (
            id          INTEGER PRIMARY KEY,
            upload_id   INTEGER NOT NULL REFERENCES uploads (id),
            name        TEXT NOT NULL,
            synonym     TEXT NOT NULL,
            type        TEXT NOT NULL,
            value       TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_constants_upload ON constants (upload_id);

        CREATE TABLE IF NOT EXISTS catalog_tables (
            catalog_name    TEXT NOT NULL PRIMARY KEY,
            table_name      TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS nomenclature_items (
            id                          INTEGER PRIMARY KEY,
            upload_id                   INTEGER NOT NULL REFERENCES uploads (id),
            nomenclature_reference      TEXT NOT NULL,
            nomenclature_code           TEXT NOT NULL,
            nomenclature_name           TEXT NOT NULL,
            characteristic_reference    TEXT,
            characteristic_name         TEXT,
            attributes_payload          TEXT NOT NULL,
            table_parts_payload         TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_nomenclature_upload ON nomenclature_items (upload_id);
        CREATE INDEX IF NOT EXISTS idx_nomenclature_reference ON nomenclature_items (nomenclature_reference);

        CREATE TABLE IF NOT EXISTS normalized_data (
            id                          INTEGER PRIMARY KEY,
            source_reference            TEXT NOT NULL,
            source_name                 TEXT NOT NULL,
            code                        TEXT NOT NULL,
            normalized_name             TEXT NOT NULL,
            normalized_reference        TEXT NOT NULL,
            category                    TEXT NOT NULL,
            merged_count                INTEGER NOT NULL,
            ai_confidence               REAL,
            ai_reasoning                TEXT,
            processing_level            TEXT NOT NULL,
            ic_code                     TEXT,
            ic_name                     TEXT,
            ic_confidence               REAL,
            created_at                  TEXT NOT NULL,
            source_database_id          INTEGER,
            source_iteration_number     INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_normalized_group ON normalized_data (normalized_name, category);
        CREATE INDEX IF NOT EXISTS idx_normalized_pending_ic ON normalized_data (ic_code) WHERE ic_code IS NULL;

        CREATE TABLE IF NOT EXISTS normalized_item_attributes (
            id                  INTEGER PRIMARY KEY,
            normalized_item_id  INTEGER NOT NULL REFERENCES normalized_data (id),
            attribute_type      TEXT NOT NULL,
            attribute_name      TEXT NOT NULL,
            attribute_value     TEXT NOT NULL,
            unit                TEXT,
            original_text       TEXT NOT NULL,
            confidence          REAL NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_attributes_normalized_item ON normalized_item_attributes (normalized_item_id);

        CREATE TABLE IF NOT EXISTS data_snapshots (
            id          INTEGER PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            type        TEXT NOT NULL,
            project_id  INTEGER,
            client_id   INTEGER
        );

        CREATE TABLE IF NOT EXISTS snapshot_uploads (
            snapshot_id     INTEGER NOT NULL REFERENCES data_snapshots (id),
            upload_id       INTEGER NOT NULL REFERENCES uploads (id),
            ordinal         INTEGER NOT NULL,
            PRIMARY KEY (snapshot_id, ordinal)
        );

        CREATE TABLE IF NOT EXISTS quality_metrics (
            id              INTEGER PRIMARY KEY,
            upload_id       INTEGER NOT NULL REFERENCES uploads (id),
            metric_name     TEXT NOT NULL,
            metric_value    REAL NOT NULL,
            recorded_at     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_quality_metrics_upload ON quality_metrics (upload_id);

        CREATE TABLE IF NOT EXISTS quality_issues (
            id              INTEGER PRIMARY KEY,
            upload_id       INTEGER NOT NULL REFERENCES uploads (id),
            severity        TEXT NOT NULL,
            description     TEXT NOT NULL,
            sample_reference TEXT,
            recorded_at     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_quality_issues_upload ON quality_issues (upload_id);

        CREATE TABLE IF NOT EXISTS metrics_snapshots (
            id                  INTEGER PRIMARY KEY,
            recorded_at         TEXT NOT NULL,
            normalized_rate     REAL NOT NULL,
            ic_classified_rate  REAL NOT NULL,
            active_job_count    INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS job_checkpoint (
            job_kind        TEXT NOT NULL PRIMARY KEY,
            cursor_payload  TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );
        ",
    )?;
    connection.pragma_update(None, "user_version", CATALOG_SCHEMA_VERSION)?;
    Ok(())
}

/// Creates (or verifies) the service store schema: tenancy, classifier tree,
/// normalization configuration, and client benchmarks.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] if any statement fails.
pub fn migrate_service_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    let current: i64 = connection.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current >= SERVICE_SCHEMA_VERSION {
        return Ok(());
    }
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS clients (
            id      INTEGER PRIMARY KEY,
            name    TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS client_projects (
            id          INTEGER PRIMARY KEY,
            client_id   INTEGER NOT NULL REFERENCES clients (id),
            name        TEXT NOT NULL,
            UNIQUE (client_id, name)
        );

        CREATE TABLE IF NOT EXISTS project_databases (
            id              INTEGER PRIMARY KEY,
            project_id      INTEGER NOT NULL REFERENCES client_projects (id),
            name            TEXT NOT NULL,
            file_path       TEXT NOT NULL,
            computer_name   TEXT,
            user_name       TEXT,
            config_name     TEXT,
            version_erp     TEXT,
            config_version  TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_project_databases_fingerprint
            ON project_databases (computer_name, user_name, config_name, version_erp, config_version);

        CREATE TABLE IF NOT EXISTS classifier_nodes (
            code        TEXT NOT NULL PRIMARY KEY,
            name        TEXT NOT NULL,
            parent_code TEXT,
            level       INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS normalization_config (
            singleton_id    INTEGER PRIMARY KEY CHECK (singleton_id = 1),
            config_json     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS client_benchmarks (
            id                  INTEGER PRIMARY KEY,
            client_id           INTEGER NOT NULL REFERENCES clients (id),
            source_name_pattern TEXT NOT NULL,
            normalized_name     TEXT NOT NULL,
            category            TEXT NOT NULL,
            ic_code             TEXT,
            ic_name             TEXT,
            usage_count         INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL DEFAULT '1970-01-01T00:00:00Z'
        );
        CREATE INDEX IF NOT EXISTS idx_client_benchmarks_client ON client_benchmarks (client_id);
        CREATE INDEX IF NOT EXISTS idx_client_benchmarks_pattern ON client_benchmarks (source_name_pattern);
        ",
    )?;
    if current < 2 {
        let mut has_usage_count = false;
        connection.pragma(None, "table_info", "client_benchmarks", |row| {
            let column_name: String = row.get("name")?;
            if column_name == "usage_count" {
                has_usage_count = true;
            }
            Ok(())
        })?;
        if !has_usage_count {
            connection.execute_batch(
                "ALTER TABLE client_benchmarks ADD COLUMN usage_count INTEGER NOT NULL DEFAULT 0;
                 ALTER TABLE client_benchmarks ADD COLUMN created_at TEXT NOT NULL DEFAULT '1970-01-01T00:00:00Z';",
            )?;
        }
    }
    connection.pragma_update(None, "user_version", SERVICE_SCHEMA_VERSION)?;
    Ok(())
}
