// crates/catalog-core/src/domain/tenancy.rs
// ============================================================================
// Module: Tenancy
// Description: Client/Project/ProjectDatabase metadata (spec §3).
// Purpose: Model the tenancy scaffolding the ingestion handshake resolves
// `database_id` against; CRUD for these lives outside the core (spec §1
// Non-goals).
// Dependencies: serde, crate::identifiers
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::ClientId;
use crate::identifiers::ProjectDatabaseId;
use crate::identifiers::ProjectId;
use crate::time::Timestamp;

/// A tenant client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Row identifier.
    pub id: ClientId,
    /// Client display name.
    pub name: String,
}

/// A project owned by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Row identifier.
    pub id: ProjectId,
    /// Owning client.
    pub client_id: ClientId,
    /// Project display name.
    pub name: String,
}

/// One database entry within a project, pointing at a store file on disk.
///
/// # Invariants
/// - `file_path` locates exactly one store file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDatabase {
    /// Row identifier.
    pub id: ProjectDatabaseId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Display name.
    pub name: String,
    /// Path to the store file on disk.
    pub file_path: String,
    /// Workstation name last observed reporting to this database.
    pub computer_name: Option<String>,
    /// OS user name last observed reporting to this database.
    pub user_name: Option<String>,
    /// ERP configuration name last observed.
    pub config_name: Option<String>,
    /// ERP version last observed.
    pub version_erp: Option<String>,
    /// ERP configuration version last observed.
    pub config_version: Option<String>,
}

/// A curated client benchmark consulted by NRM before NN/AIN run (spec
/// §4.8 step 4, SPEC_FULL §2 "Client benchmark store").
///
/// # Invariants
/// - `source_name_pattern` is matched against a source row's trimmed,
///   lowercased name, the same normalization [`crate::hashing::fingerprint`]
///   applies, so matching is case/whitespace-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientBenchmark {
    /// Row identifier.
    pub id: i64,
    /// Owning client.
    pub client_id: ClientId,
    /// Pattern matched against a trimmed, lowercased source name.
    pub source_name_pattern: String,
    /// Normalized name to use when this benchmark matches.
    pub normalized_name: String,
    /// Category to use when this benchmark matches.
    pub category: String,
    /// Pre-assigned IC code, if this benchmark already carries one.
    pub ic_code: Option<String>,
    /// Pre-assigned IC name, if this benchmark already carries one.
    pub ic_name: Option<String>,
    /// Number of times this benchmark has been used.
    pub usage_count: u64,
    /// Time this benchmark was created.
    pub created_at: Timestamp,
}
