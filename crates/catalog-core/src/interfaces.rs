// crates/catalog-core/src/interfaces.rs
// ============================================================================
// Module: Store & Provider Interfaces
// Description: The trait seams every other crate programs against.
// Purpose: Let `catalog-broker`, `catalog-normalize`, and `catalog-classify`
// depend on behavior, not on `catalog-store-sqlite`/`catalog-providers`
// directly, so stores and providers stay swappable and mockable in tests.
// Dependencies: crate::domain, crate::error, crate::identifiers
// ============================================================================

//! ## Overview
//! These traits are intentionally synchronous: the store is backed by
//! `SQLite`, whose single-writer model does not benefit from an async
//! interface, and callers that run inside an async runtime wrap calls in
//! `tokio::task::spawn_blocking`. The AI provider trait is async because the
//! AI client is a network client whose latency dominates job wall-time.

use crate::domain::CatalogItem;
use crate::domain::ClassifierNode;
use crate::domain::Client;
use crate::domain::ClientBenchmark;
use crate::domain::Constant;
use crate::domain::ItemAttribute;
use crate::domain::NomenclatureItem;
use crate::domain::NormalizedData;
use crate::domain::Project;
use crate::domain::ProjectDatabase;
use crate::domain::Snapshot;
use crate::domain::Upload;
use crate::error::CoreError;
use crate::identifiers::ClientId;
use crate::identifiers::IcCode;
use crate::identifiers::ProjectDatabaseId;
use crate::identifiers::ProjectId;
use crate::identifiers::UploadUuid;

/// Input to [`CatalogStore::create_upload`]: the handshake fields plus
/// whatever tenancy ids the caller (the broker, consulting
/// [`ServiceStore::match_database`]) already resolved. The store itself does
/// not perform fuzzy matching — that is cross-store orchestration owned by
/// the broker, not a concern of either store.
#[derive(Debug, Clone)]
pub struct UploadDraft {
    /// ERP version string.
    pub version_erp: String,
    /// Configuration name.
    pub config_name: String,
    /// Reporting workstation name.
    pub computer_name: String,
    /// Reporting OS user name.
    pub user_name: String,
    /// ERP configuration version.
    pub config_version: String,
    /// 1-based iteration number.
    pub iteration_number: u32,
    /// Iteration label.
    pub iteration_label: String,
    /// Operator/programmer identity.
    pub programmer: String,
    /// Free-text purpose.
    pub purpose: String,
    /// Parent upload this one supersedes, if any.
    pub parent_upload_id: Option<crate::identifiers::UploadRowId>,
    /// Resolved database id, if a match was found.
    pub database_id: Option<ProjectDatabaseId>,
    /// Resolved client id, if a match was found.
    pub client_id: Option<ClientId>,
    /// Resolved project id, if a match was found.
    pub project_id: Option<ProjectId>,
}

/// The unified catalog store: uploads, constants, dynamic catalog tables,
/// nomenclature, and normalized output.
///
/// # Invariants
/// - Batch methods are all-or-nothing per row: a failing row is counted, not
///   fatal to the batch (spec §4.1).
/// - `ensure_catalog_table` is idempotent (spec §3 Catalog invariant).
pub trait CatalogStore: Send + Sync {
    /// Creates a new upload from an already-resolved draft, minting its
    /// UUID and `started_at` timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    fn create_upload(&self, draft: UploadDraft) -> Result<Upload, CoreError>;

    /// Looks up an upload by its producer-facing UUID.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    fn get_upload(&self, uuid: UploadUuid) -> Result<Option<Upload>, CoreError>;

    /// Marks an upload `completed`. Idempotent: completing twice succeeds
    /// without changing counters (spec §8.9).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the upload does not exist,
    /// [`CoreError::Internal`] on store failure.
    fn complete_upload(&self, uuid: UploadUuid) -> Result<Upload, CoreError>;

    /// Appends one constant to an in-progress upload.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the upload does not exist,
    /// [`CoreError::Internal`] on store failure.
    fn insert_constant(&self, upload: UploadUuid, constant: Constant) -> Result<(), CoreError>;

    /// Ensures the dynamic table for `catalog_name` exists, creating it if
    /// necessary, and returns its physical table name. Increments the
    /// upload's `total_catalogs` counter only on first creation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the upload does not exist,
    /// [`CoreError::Internal`] on store failure.
    fn ensure_catalog_table(&self, upload: UploadUuid, catalog_name: &str) -> Result<String, CoreError>;

    /// Inserts catalog items into their dynamic table, returning the number
    /// of rows that failed (spec §4.1 batch contract).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the upload does not exist,
    /// [`CoreError::Internal`] only for failures affecting the whole batch.
    fn insert_catalog_items(
        &self,
        upload: UploadUuid,
        table_name: &str,
        items: Vec<CatalogItem>,
    ) -> Result<BatchOutcome, CoreError>;

    /// Inserts nomenclature items, returning the number of rows that failed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the upload does not exist,
    /// [`CoreError::Internal`] only for failures affecting the whole batch.
    fn insert_nomenclature_items(
        &self,
        upload: UploadUuid,
        items: Vec<NomenclatureItem>,
    ) -> Result<BatchOutcome, CoreError>;

    /// Reads all rows from a source table/column triple for normalization
    /// (spec §4.8 step 1). Source rows are `(reference, code, name)`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the table does not exist,
    /// [`CoreError::Internal`] on store failure.
    fn read_source_rows(&self, table_name: &str) -> Result<Vec<SourceRow>, CoreError>;

    /// Inserts grouped normalized rows and their extracted attributes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    fn insert_normalized_rows(
        &self,
        rows: Vec<NormalizedData>,
        attributes: Vec<ItemAttribute>,
    ) -> Result<(), CoreError>;

    /// Lists normalized groups lacking an IC code, one entry per
    /// `(normalized_name, category)` group.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    fn list_ic_pending_groups(&self) -> Result<Vec<IcPendingGroup>, CoreError>;

    /// Writes `(ic_code, ic_name, ic_confidence)` to every normalized row
    /// matching `(normalized_name, category)` in one statement (spec §4.10
    /// write-back, §8.6).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Busy`] if the store is locked after retries are
    /// exhausted, [`CoreError::Internal`] on other store failure.
    fn write_ic_classification(
        &self,
        normalized_name: &str,
        category: &str,
        ic_code: IcCode,
        ic_name: String,
        ic_confidence: f64,
    ) -> Result<u64, CoreError>;

    /// Creates a snapshot from an ordered set of uploads.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    fn create_snapshot(&self, snapshot: Snapshot) -> Result<Snapshot, CoreError>;

    /// Lists all snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    fn list_snapshots(&self) -> Result<Vec<Snapshot>, CoreError>;

    /// Counts rows actually present for an upload's constants and catalog
    /// items, independent of the `Upload.counters` maintained incrementally
    /// at insert time (SPEC_FULL §2 "Quality analysis job").
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the upload does not exist,
    /// [`CoreError::Internal`] on store failure.
    fn count_upload_rows(&self, upload: UploadUuid) -> Result<UploadRowCounts, CoreError>;

    /// Persists a quality metric sample for an upload.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    fn record_quality_metric(&self, upload: UploadUuid, metric_name: &str, metric_value: f64) -> Result<(), CoreError>;

    /// Records a quality issue discovered for an upload.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    fn record_quality_issue(
        &self,
        upload: UploadUuid,
        severity: &str,
        description: &str,
        sample_reference: Option<&str>,
    ) -> Result<(), CoreError>;

    /// Persists (upserting) a job's resumability cursor (SPEC_FULL §2
    /// "Checkpoint/resume"). `cursor_payload` is an opaque, job-defined
    /// string (e.g. the last processed row index as text).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    fn save_job_checkpoint(&self, job_kind: &str, cursor_payload: &str) -> Result<(), CoreError>;

    /// Loads the last persisted checkpoint for `job_kind`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    fn load_job_checkpoint(&self, job_kind: &str) -> Result<Option<JobCheckpoint>, CoreError>;
}

/// A job's last-known progress cursor, read back at process start so a
/// crash mid-run surfaces as `stopped` rather than silently resuming
/// (SPEC_FULL §2 "Checkpoint/resume", Design Notes §9 "5 minutes idle").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCheckpoint {
    /// Opaque job-defined cursor (e.g. last processed row index).
    pub cursor_payload: String,
    /// When this checkpoint was last written.
    pub updated_at: crate::time::Timestamp,
}

/// Rows actually present for an upload, recounted from the physical tables
/// rather than read from `Upload.counters` (SPEC_FULL §2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadRowCounts {
    /// Constants physically present for this upload.
    pub constants: u64,
    /// Catalog + nomenclature items physically present for this upload.
    pub items: u64,
}

/// Outcome of a batch insert: how many rows succeeded vs. failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows successfully inserted.
    pub processed_count: u64,
    /// Rows that failed and were skipped.
    pub failed_count: u64,
}

/// One row read from a source table for normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// Source-system reference.
    pub reference: String,
    /// Source-system code.
    pub code: String,
    /// Source-system name.
    pub name: String,
}

/// One `(normalized_name, category)` group still lacking an IC code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcPendingGroup {
    /// Normalized name shared by the group.
    pub normalized_name: String,
    /// Category shared by the group.
    pub category: String,
    /// Number of rows in the group.
    pub merged_count: u64,
}

/// The service store: tenancy metadata, worker configuration, the IC tree,
/// and normalization configuration.
pub trait ServiceStore: Send + Sync {
    /// Resolves a database by direct id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    fn get_database(&self, id: ProjectDatabaseId) -> Result<Option<ProjectDatabase>, CoreError>;

    /// Fuzzy-matches a database by `(computer_name, user_name, config_name,
    /// version_erp, config_version)` against prior uploads (spec §4.1).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    fn match_database(&self, fingerprint: &DatabaseFingerprint) -> Result<Option<ProjectDatabase>, CoreError>;

    /// Loads the full IC tree.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    fn load_classifier_tree(&self) -> Result<Vec<ClassifierNode>, CoreError>;

    /// Looks up a client benchmark whose `source_name_pattern` matches
    /// `normalized_source_name` (spec §4.8 step 4, consulted before NN/AIN
    /// run). `client_id` scopes the lookup to one tenant's curated set.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    fn lookup_benchmark(
        &self,
        client_id: ClientId,
        normalized_source_name: &str,
    ) -> Result<Option<ClientBenchmark>, CoreError>;

    /// Increments a benchmark's usage counter after it is used by NRM.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the benchmark does not exist,
    /// [`CoreError::Internal`] on store failure.
    fn record_benchmark_usage(&self, benchmark_id: i64) -> Result<(), CoreError>;

    /// Looks up a client by id, used to populate `client_name` in the
    /// handshake response once a database resolves (spec §6).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    fn get_client(&self, id: ClientId) -> Result<Option<Client>, CoreError>;

    /// Looks up a project by id, used to populate `project_name` in the
    /// handshake response once a database resolves (spec §6).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] on store failure.
    fn get_project(&self, id: ProjectId) -> Result<Option<Project>, CoreError>;
}

/// Fields used to fuzzy-match a prior upload's resolved database (spec
/// §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseFingerprint {
    /// Reporting workstation name.
    pub computer_name: String,
    /// Reporting OS user name.
    pub user_name: String,
    /// ERP configuration name.
    pub config_name: String,
    /// ERP version string.
    pub version_erp: String,
    /// ERP configuration version.
    pub config_version: String,
}
