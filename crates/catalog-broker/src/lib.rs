// crates/catalog-broker/src/lib.rs
// ============================================================================
// Module: Catalog Broker Library
// Description: The ERP producer's XML wire protocol and Ingestion State
// Machine (spec §4.1, §6), plus the post-completion quality analyzer
// (SPEC_FULL §2).
// Purpose: Turn raw XML request bodies into store calls against
// `catalog-core`'s `CatalogStore`/`ServiceStore` seams, independent of
// whatever transport (HTTP today) carries the bytes.
// Dependencies: catalog-core, quick-xml, thiserror, time, tracing
// ============================================================================

//! ## Overview
//! [`ism::IngestionStateMachine`] is the entry point: one method per
//! protocol step (spec §6), each parsing its request via [`protocol`] and
//! calling into the stores. [`quality::QualityAnalyzer`] runs once an
//! upload completes, reconciling the counters the state machine maintained
//! incrementally against a fresh recount.
//!
//! Security posture: request bodies originate from the ERP producer network,
//! a semi-trusted source; XML is parsed with bounded per-element scans, no
//! external entity resolution.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod ism;
pub mod protocol;
pub mod quality;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::BrokerError;
pub use ism::IngestionStateMachine;
pub use quality::QualityAnalyzer;
pub use quality::QualityReport;
