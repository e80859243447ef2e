// crates/catalog-core/src/domain/mod.rs
// ============================================================================
// Module: Domain Model
// Description: Entities ingested, normalized, and classified by the pipeline
// (spec §3).
// Purpose: Re-export the per-entity submodules as one `domain::*` surface.
// ============================================================================

mod cache_entry;
mod catalog;
mod classifier;
mod normalized;
mod snapshot;
mod tenancy;
mod upload;

pub use cache_entry::CacheEntry;
pub use catalog::CatalogItem;
pub use catalog::Constant;
pub use catalog::NomenclatureItem;
pub use classifier::ClassifierNode;
pub use normalized::DuplicateType;
pub use normalized::ItemAttribute;
pub use normalized::ItemAttributeType;
pub use normalized::NormalizedData;
pub use normalized::ProcessingLevel;
pub use snapshot::Snapshot;
pub use snapshot::SnapshotType;
pub use tenancy::Client;
pub use tenancy::ClientBenchmark;
pub use tenancy::Project;
pub use tenancy::ProjectDatabase;
pub use upload::Upload;
pub use upload::UploadCounters;
pub use upload::UploadStatus;
