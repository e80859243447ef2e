// crates/catalog-store-sqlite/src/service_store.rs
// ============================================================================
// Module: Service Store
// Description: `ServiceStore` implementation over a single `SQLite` file:
// tenancy (clients/projects/databases), the classifier tree, normalization
// config, and client benchmarks.
// Purpose: Keep tenancy/configuration data in its own store file so it can be
// deployed, backed up, and scaled independently of the (much larger) unified
// catalog store.
// Dependencies: rusqlite, r2d2, r2d2_sqlite, catalog-core
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use catalog_core::CoreError;
use catalog_core::domain::ClassifierNode;
use catalog_core::domain::Client;
use catalog_core::domain::ClientBenchmark;
use catalog_core::domain::Project;
use catalog_core::domain::ProjectDatabase;
use catalog_core::identifiers::ClientId;
use catalog_core::identifiers::IcCode;
use catalog_core::identifiers::ProjectDatabaseId;
use catalog_core::identifiers::ProjectId;
use catalog_core::interfaces::DatabaseFingerprint;
use catalog_core::interfaces::ServiceStore;
use catalog_core::time::Timestamp;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;

use crate::catalog_store::lock;
use crate::error::SqliteStoreError;
use crate::pool as store_pool;
use crate::schema;

/// `SQLite`-backed service store: tenancy metadata, the classifier tree, and
/// client benchmarks.
///
/// # Invariants
/// - Same single-writer + read-pool split as [`crate::catalog_store::SqliteCatalogStore`].
pub struct SqliteServiceStore {
    write: Arc<Mutex<Connection>>,
    read_pool: Pool<SqliteConnectionManager>,
}

impl SqliteServiceStore {
    /// Opens (creating if needed) the service store at `path`.
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
        schema::migrate_service_schema(&lock(&write))?;
        let read_pool = store_pool::build_read_pool(path, max_open_conns, max_idle_conns, conn_max_lifetime)?;
        Ok(Self { write, read_pool })
    }

    /// Replaces the classifier tree wholesale, used when loading the
    /// authoritative IC tree file at startup.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    pub fn replace_classifier_tree(&self, nodes: &[ClassifierNode]) -> Result<(), CoreError> {
        let mut connection = lock(&self.write);
        let transaction = connection.transaction().map_err(SqliteStoreError::from)?;
        transaction.execute("DELETE FROM classifier_nodes", []).map_err(SqliteStoreError::from)?;
        for node in nodes {
            transaction
                .execute(
                    "INSERT INTO classifier_nodes (code, name, parent_code, level) VALUES (?1, ?2, ?3, ?4)",
                    params![node.code.as_str(), node.name, node.parent_code.as_ref().map(IcCode::as_str), node.level],
                )
                .map_err(SqliteStoreError::from)?;
        }
        transaction.commit().map_err(SqliteStoreError::from)?;
        Ok(())
    }

    /// Upserts a project database's observed fingerprint fields, used after a
    /// handshake resolves (or creates) the database for an upload.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    pub fn upsert_database_fingerprint(
        &self,
        id: ProjectDatabaseId,
        fingerprint: &DatabaseFingerprint,
    ) -> Result<(), CoreError> {
        let connection = lock(&self.write);
        connection
            .execute(
                "UPDATE project_databases SET computer_name = ?1, user_name = ?2, config_name = ?3,
                 version_erp = ?4, config_version = ?5 WHERE id = ?6",
                params![
                    fingerprint.computer_name,
                    fingerprint.user_name,
                    fingerprint.config_name,
                    fingerprint.version_erp,
                    fingerprint.config_version,
                    id.get(),
                ],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    /// Registers a new project database under `project_id`, returning its
    /// assigned id. Used by the broker when a handshake's fingerprint does
    /// not match any known database and a new one must be created.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    pub fn create_database(
        &self,
        project_id: ProjectId,
        name: &str,
        file_path: &str,
        fingerprint: &DatabaseFingerprint,
    ) -> Result<ProjectDatabase, CoreError> {
        let connection = lock(&self.write);
        connection
            .execute(
                "INSERT INTO project_databases (
                    project_id, name, file_path, computer_name, user_name, config_name, version_erp, config_version
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    project_id.get(),
                    name,
                    file_path,
                    fingerprint.computer_name,
                    fingerprint.user_name,
                    fingerprint.config_name,
                    fingerprint.version_erp,
                    fingerprint.config_version,
                ],
            )
            .map_err(SqliteStoreError::from)?;
        let id = ProjectDatabaseId(connection.last_insert_rowid());
        Ok(ProjectDatabase {
            id,
            project_id,
            name: name.to_string(),
            file_path: file_path.to_string(),
            computer_name: Some(fingerprint.computer_name.clone()),
            user_name: Some(fingerprint.user_name.clone()),
            config_name: Some(fingerprint.config_name.clone()),
            version_erp: Some(fingerprint.version_erp.clone()),
            config_version: Some(fingerprint.config_version.clone()),
        })
    }
}

impl ServiceStore for SqliteServiceStore {
    fn get_database(&self, id: ProjectDatabaseId) -> Result<Option<ProjectDatabase>, CoreError> {
        let connection = self.read_pool.get().map_err(SqliteStoreError::from)?;
        connection
            .query_row("SELECT * FROM project_databases WHERE id = ?1", params![id.get()], row_to_database)
            .optional()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))
    }

    fn match_database(&self, fingerprint: &DatabaseFingerprint) -> Result<Option<ProjectDatabase>, CoreError> {
        let connection = self.read_pool.get().map_err(SqliteStoreError::from)?;
        connection
            .query_row(
                "SELECT * FROM project_databases
                 WHERE computer_name = ?1 AND user_name = ?2 AND config_name = ?3
                   AND version_erp = ?4 AND config_version = ?5
                 ORDER BY id DESC LIMIT 1",
                params![
                    fingerprint.computer_name,
                    fingerprint.user_name,
                    fingerprint.config_name,
                    fingerprint.version_erp,
                    fingerprint.config_version,
                ],
                row_to_database,
            )
            .optional()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))
    }

    fn load_classifier_tree(&self) -> Result<Vec<ClassifierNode>, CoreError> {
        let connection = self.read_pool.get().map_err(SqliteStoreError::from)?;
        let mut statement = connection
            .prepare("SELECT code, name, parent_code, level FROM classifier_nodes")
            .map_err(SqliteStoreError::from)?;
        let nodes = statement
            .query_map([], |row| {
                Ok(ClassifierNode {
                    code: IcCode::new(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    parent_code: row.get::<_, Option<String>>(2)?.map(IcCode::new),
                    level: row.get(3)?,
                })
            })
            .map_err(SqliteStoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(SqliteStoreError::from)?;
        Ok(nodes)
    }

    fn lookup_benchmark(
        &self,
        client_id: ClientId,
        normalized_source_name: &str,
    ) -> Result<Option<ClientBenchmark>, CoreError> {
        let connection = self.read_pool.get().map_err(SqliteStoreError::from)?;
        connection
            .query_row(
                "SELECT * FROM client_benchmarks WHERE client_id = ?1 AND source_name_pattern = ?2",
                params![client_id.get(), normalized_source_name],
                row_to_benchmark,
            )
            .optional()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))
    }

    fn record_benchmark_usage(&self, benchmark_id: i64) -> Result<(), CoreError> {
        let connection = lock(&self.write);
        let affected = connection
            .execute(
                "UPDATE client_benchmarks SET usage_count = usage_count + 1 WHERE id = ?1",
                params![benchmark_id],
            )
            .map_err(SqliteStoreError::from)?;
        if affected == 0 {
            return Err(CoreError::NotFound(format!("client benchmark {benchmark_id}")));
        }
        Ok(())
    }

    fn get_client(&self, id: ClientId) -> Result<Option<Client>, CoreError> {
        let connection = self.read_pool.get().map_err(SqliteStoreError::from)?;
        connection
            .query_row(
                "SELECT id, name FROM clients WHERE id = ?1",
                params![id.get()],
                |row| Ok(Client { id: ClientId(row.get("id")?), name: row.get("name")? }),
            )
            .optional()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))
    }

    fn get_project(&self, id: ProjectId) -> Result<Option<Project>, CoreError> {
        let connection = self.read_pool.get().map_err(SqliteStoreError::from)?;
        connection
            .query_row(
                "SELECT id, client_id, name FROM client_projects WHERE id = ?1",
                params![id.get()],
                |row| {
                    Ok(Project {
                        id: ProjectId(row.get("id")?),
                        client_id: ClientId(row.get("client_id")?),
                        name: row.get("name")?,
                    })
                },
            )
            .optional()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))
    }
}

fn row_to_benchmark(row: &Row<'_>) -> rusqlite::Result<ClientBenchmark> {
    let created_at_text: String = row.get("created_at")?;
    let created_at = Timestamp::parse_rfc3339(&created_at_text)
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "created_at".into(), rusqlite::types::Type::Text))?;
    Ok(ClientBenchmark {
        id: row.get("id")?,
        client_id: ClientId(row.get("client_id")?),
        source_name_pattern: row.get("source_name_pattern")?,
        normalized_name: row.get("normalized_name")?,
        category: row.get("category")?,
        ic_code: row.get("ic_code")?,
        ic_name: row.get("ic_name")?,
        usage_count: u64::try_from(row.get::<_, i64>("usage_count")?).unwrap_or(0),
        created_at,
    })
}

fn row_to_database(row: &Row<'_>) -> rusqlite::Result<ProjectDatabase> {
    Ok(ProjectDatabase {
        id: ProjectDatabaseId(row.get("id")?),
        project_id: ProjectId(row.get("project_id")?),
        name: row.get("name")?,
        file_path: row.get("file_path")?,
        computer_name: row.get("computer_name")?,
        user_name: row.get("user_name")?,
        config_name: row.get("config_name")?,
        version_erp: row.get("version_erp")?,
        config_version: row.get("config_version")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, SqliteServiceStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("service.db");
        let store = SqliteServiceStore::open(&path, 4, 2, Duration::from_secs(60)).expect("open store");
        (dir, store)
    }

    fn sample_fingerprint() -> DatabaseFingerprint {
        DatabaseFingerprint {
            computer_name: "WS-1".into(),
            user_name: "erp".into(),
            config_name: "Trade".into(),
            version_erp: "1.0".into(),
            config_version: "2.1".into(),
        }
    }

    #[test]
    fn create_and_match_database_round_trips() {
        let (_dir, store) = open_temp();
        // A project row is required by the foreign key; the service store
        // does not expose project CRUD (spec Non-goal), so tests seed it
        // directly.
        {
            let connection = lock(&store.write);
            connection.execute("INSERT INTO clients (name) VALUES ('Acme')", []).expect("client");
            connection.execute("INSERT INTO client_projects (client_id, name) VALUES (1, 'Main')", []).expect("project");
        }
        let fingerprint = sample_fingerprint();
        let created = store.create_database(ProjectId(1), "prod-db", "/data/prod.db", &fingerprint).expect("create");
        let matched = store.match_database(&fingerprint).expect("match").expect("present");
        assert_eq!(matched.id, created.id);
        let fetched = store.get_database(created.id).expect("get").expect("present");
        assert_eq!(fetched.file_path, "/data/prod.db");
    }

    #[test]
    fn match_database_returns_none_when_unknown() {
        let (_dir, store) = open_temp();
        let matched = store.match_database(&sample_fingerprint()).expect("match");
        assert!(matched.is_none());
    }

    #[test]
    fn classifier_tree_round_trips() {
        let (_dir, store) = open_temp();
        let nodes = vec![
            ClassifierNode { code: IcCode::new("28"), name: "Machinery".into(), parent_code: None, level: 1 },
            ClassifierNode { code: IcCode::new("28.29"), name: "Other machinery".into(), parent_code: Some(IcCode::new("28")), level: 2 },
        ];
        store.replace_classifier_tree(&nodes).expect("replace");
        let loaded = store.load_classifier_tree().expect("load");
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().any(|node| node.code.as_str() == "28.29" && !node.is_root()));
    }

    #[test]
    fn lookup_benchmark_matches_by_client_and_pattern() {
        let (_dir, store) = open_temp();
        {
            let connection = lock(&store.write);
            connection.execute("INSERT INTO clients (name) VALUES ('Acme')", []).expect("client");
            connection
                .execute(
                    "INSERT INTO client_benchmarks
                     (client_id, source_name_pattern, normalized_name, category, created_at)
                     VALUES (1, 'молоток 500г', 'молоток', 'tools', '2026-01-01T00:00:00Z')",
                    [],
                )
                .expect("benchmark");
        }
        let found = store.lookup_benchmark(ClientId(1), "молоток 500г").expect("lookup").expect("present");
        assert_eq!(found.normalized_name, "молоток");
        assert_eq!(found.usage_count, 0);

        store.record_benchmark_usage(found.id).expect("record usage");
        let refreshed = store.lookup_benchmark(ClientId(1), "молоток 500г").expect("lookup").expect("present");
        assert_eq!(refreshed.usage_count, 1);
    }

    #[test]
    fn lookup_benchmark_returns_none_when_no_match() {
        let (_dir, store) = open_temp();
        assert!(store.lookup_benchmark(ClientId(1), "anything").expect("lookup").is_none());
    }

    #[test]
    fn record_benchmark_usage_on_unknown_id_is_not_found() {
        let (_dir, store) = open_temp();
        let err = store.record_benchmark_usage(999).expect_err("should fail");
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn get_client_and_project_round_trip() {
        let (_dir, store) = open_temp();
        {
            let connection = lock(&store.write);
            connection.execute("INSERT INTO clients (name) VALUES ('Acme')", []).expect("client");
            connection.execute("INSERT INTO client_projects (client_id, name) VALUES (1, 'Main')", []).expect("project");
        }
        let client = store.get_client(ClientId(1)).expect("get client").expect("present");
        assert_eq!(client.name, "Acme");
        let project = store.get_project(ProjectId(1)).expect("get project").expect("present");
        assert_eq!(project.name, "Main");
        assert_eq!(project.client_id, ClientId(1));
    }

    #[test]
    fn get_client_returns_none_when_unknown() {
        let (_dir, store) = open_temp();
        assert!(store.get_client(ClientId(999)).expect("get client").is_none());
    }
}
