// crates/catalog-store-sqlite/src/lib.rs
// ============================================================================
// Crate: catalog-store-sqlite
// Description: `SQLite`-backed implementations of `catalog_core`'s
// `CatalogStore` and `ServiceStore` traits.
// Purpose: The only crate that knows the physical schema; every other crate
// in the workspace programs against the trait seam in `catalog-core`.
// ============================================================================

pub mod catalog_store;
pub mod error;
pub mod pool;
pub mod schema;
pub mod service_store;

pub use catalog_store::SqliteCatalogStore;
pub use error::SqliteStoreError;
pub use service_store::SqliteServiceStore;
