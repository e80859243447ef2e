// crates/catalog-core/src/domain/upload.rs
// ============================================================================
// Module: Upload
// Description: A single ingestion session from the ERP producer (spec §3).
// Purpose: Model upload lifecycle and the counters the handshake/complete
// protocol maintains.
// Dependencies: serde, crate::identifiers, crate::time
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::ClientId;
use crate::identifiers::ProjectDatabaseId;
use crate::identifiers::ProjectId;
use crate::identifiers::UploadRowId;
use crate::identifiers::UploadUuid;
use crate::time::Timestamp;

/// Upload lifecycle status.
///
/// # Invariants
/// - Transitions only `in_progress -> completed` or `in_progress -> failed`;
///   never reverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Handshake has run; ingestion calls may still arrive.
    InProgress,
    /// `complete` has run successfully.
    Completed,
    /// The upload was abandoned by the producer or failed irrecoverably.
    Failed,
}

/// Monotonic counters tracked while an upload is `in_progress`.
///
/// # Invariants
/// - Never decrease while the owning upload is `in_progress`.
/// - Frozen once the upload transitions out of `in_progress`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCounters {
    /// Number of constants ingested.
    pub total_constants: u64,
    /// Number of distinct dynamic catalog tables created or touched.
    pub total_catalogs: u64,
    /// Number of catalog/nomenclature item rows ingested.
    pub total_items: u64,
}

/// An ingestion session from the ERP producer.
///
/// # Invariants
/// - `id`/`uuid` are assigned once at handshake and never change.
/// - `counters` only mutate while `status == InProgress`.
/// - `completed_at` is `Some` iff `status == Completed`.
/// - `iteration_number >= 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    /// Row identifier in the unified store.
    pub id: UploadRowId,
    /// Producer-facing upload identifier, minted at handshake.
    pub uuid: UploadUuid,
    /// Time the handshake was accepted.
    pub started_at: Timestamp,
    /// Time `complete` was accepted, if it has run.
    pub completed_at: Option<Timestamp>,
    /// Lifecycle status.
    pub status: UploadStatus,
    /// ERP version string reported at handshake.
    pub version_erp: String,
    /// Configuration name reported at handshake.
    pub config_name: String,
    /// 1-based iteration number within `config_name`.
    pub iteration_number: u32,
    /// Human-readable iteration label.
    pub iteration_label: String,
    /// Identity of the operator/programmer who triggered the upload.
    pub programmer: String,
    /// Free-text purpose supplied by the producer.
    pub purpose: String,
    /// Parent upload this one supersedes or continues, if any.
    pub parent_upload_id: Option<UploadRowId>,
    /// Resolved database identifier, if one could be matched.
    pub database_id: Option<ProjectDatabaseId>,
    /// Resolved client identifier, cached from the database match.
    pub client_id: Option<ClientId>,
    /// Resolved project identifier, cached from the database match.
    pub project_id: Option<ProjectId>,
    /// Reporting workstation name.
    pub computer_name: String,
    /// Reporting OS user name.
    pub user_name: String,
    /// ERP configuration version string.
    pub config_version: String,
    /// Ingestion counters.
    pub counters: UploadCounters,
}

impl Upload {
    /// Returns whether ingestion calls may still be accepted for this
    /// upload.
    #[must_use]
    pub const fn accepts_ingestion(&self) -> bool {
        matches!(self.status, UploadStatus::InProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Upload {
        Upload {
            id: UploadRowId(1),
            uuid: UploadUuid::new_v4(),
            started_at: Timestamp::parse_rfc3339("2026-01-01T00:00:00Z").expect("valid"),
            completed_at: None,
            status: UploadStatus::InProgress,
            version_erp: "1.0".into(),
            config_name: "Trade".into(),
            iteration_number: 1,
            iteration_label: "initial".into(),
            programmer: "ivanov".into(),
            purpose: "sync".into(),
            parent_upload_id: None,
            database_id: None,
            client_id: None,
            project_id: None,
            computer_name: "WS-1".into(),
            user_name: "erp".into(),
            config_version: "2.1".into(),
            counters: UploadCounters::default(),
        }
    }

    #[test]
    fn in_progress_accepts_ingestion() {
        assert!(sample().accepts_ingestion());
    }

    #[test]
    fn completed_rejects_ingestion() {
        let mut upload = sample();
        upload.status = UploadStatus::Completed;
        assert!(!upload.accepts_ingestion());
    }
}
