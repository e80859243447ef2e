// crates/catalog-config/src/lib.rs
// ============================================================================
// Crate: catalog-config
// Description: Canonical configuration model: load (TOML + env overlay) and
// validate.
// Purpose: Give every binary and long-running job one validated source of
// truth for ports, store paths, pool sizing, and pipeline tunables.
// ============================================================================

pub mod app;
pub mod classifier_tree;
pub mod error;
pub mod normalization;

pub use app::AppConfig;
pub use classifier_tree::load_classifier_tree_file;
pub use classifier_tree::parse_classifier_tree;
pub use error::ConfigError;
pub use normalization::ClassifierConfig;
pub use normalization::DuplicateAnalysisConfig;
pub use normalization::NormalizationConfig;
