// crates/catalog-core/src/domain/snapshot.rs
// ============================================================================
// Module: Snapshot
// Description: A named, ordered set of uploads for cross-iteration analysis
// (spec §3; SPEC_FULL §2 Snapshot CRUD).
// Purpose: Let reporting/comparison tools scope queries to a fixed set of
// uploads instead of "everything ingested so far".
// Dependencies: serde, crate::identifiers
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::ClientId;
use crate::identifiers::ProjectId;
use crate::identifiers::SnapshotId;
use crate::identifiers::UploadRowId;

/// How a snapshot came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotType {
    /// Created explicitly by an operator.
    Manual,
    /// Maintained automatically to always point at the latest upload per
    /// iteration.
    AutoLatest,
}

/// A named, ordered set of uploads.
///
/// # Invariants
/// - `included_uploads` preserves insertion order; it is not deduplicated by
///   this type (callers insert an upload at most once by construction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Row identifier.
    pub id: SnapshotId,
    /// Snapshot name.
    pub name: String,
    /// Snapshot kind.
    pub r#type: SnapshotType,
    /// Owning project, if scoped.
    pub project_id: Option<ProjectId>,
    /// Owning client, if scoped.
    pub client_id: Option<ClientId>,
    /// Uploads included in this snapshot, in order.
    pub included_uploads: Vec<UploadRowId>,
}
