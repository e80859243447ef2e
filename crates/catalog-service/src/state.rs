// crates/catalog-service/src/state.rs
// ============================================================================
// Module: Application State
// Description: The shared collaborators every HTTP handler closes over
// (spec §4.11, §6; SPEC_FULL §0 "process wiring").
// Purpose: One struct built once in `main`, wrapped in an `Arc`, and passed
// to the router so handlers never reach for a global.
// Dependencies: catalog-broker, catalog-classify, catalog-core,
// catalog-normalize, catalog-providers, tokio
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use catalog_broker::IngestionStateMachine;
use catalog_broker::QualityAnalyzer;
use catalog_classify::ClassifierJob;
use catalog_core::identifiers::ClientId;
use catalog_core::interfaces::CatalogStore;
use catalog_core::interfaces::ServiceStore;
use catalog_normalize::NormalizerJob;

use crate::events::EventBus;
use crate::metrics::MetricsCollector;

/// Name of the source rows table the normalizer reads from. Every upload's
/// catalog items land in their own dynamically named table (spec §4.2), but
/// normalization always runs over the one combined source-rows view the
/// store exposes for that purpose.
pub const SOURCE_TABLE_NAME: &str = "normalized_source";

/// Tenancy scope used for benchmark lookups when a request does not name a
/// specific database (spec §4.8 "scoped to `client_id`"); most deployments
/// operate a single client, so this is a deliberately fixed fallback rather
/// than a lookup that could itself fail.
pub const DEFAULT_CLIENT_ID: ClientId = ClientId(1);

/// Everything a control-plane handler needs, bundled once at startup.
pub struct AppState {
    /// ERP ingestion state machine (spec §6 Producer protocol).
    pub ism: Arc<IngestionStateMachine>,
    /// Post-ingestion quality analyzer, run automatically after `/complete`
    /// (SPEC_FULL §2).
    pub quality: Arc<QualityAnalyzer>,
    /// Normalizer (NRM) job orchestrator (spec §4.8).
    pub normalizer: Arc<NormalizerJob>,
    /// Hierarchical classifier (HC/IC) job orchestrator (spec §4.10).
    pub classifier: Arc<ClassifierJob>,
    /// Unified catalog store, for handlers that need direct reads (e.g.
    /// snapshot listing) rather than going through a job.
    pub catalog_store: Arc<dyn CatalogStore>,
    /// Service store, for tenancy/config reads.
    pub service_store: Arc<dyn ServiceStore>,
    /// The SSE event bus every job and the metrics collector publish onto.
    pub events: EventBus,
    /// The metrics snapshot collector (spec §4.11).
    pub metrics: Arc<MetricsCollector>,
    /// Process start time, for `/metrics` and status `elapsed`/`uptime`
    /// fields.
    pub started_at: Instant,
}

impl AppState {
    /// Builds application state from the already-constructed collaborators.
    #[must_use]
    pub fn new(
        catalog_store: Arc<dyn CatalogStore>,
        service_store: Arc<dyn ServiceStore>,
        ism: Arc<IngestionStateMachine>,
        quality: Arc<QualityAnalyzer>,
        normalizer: Arc<NormalizerJob>,
        classifier: Arc<ClassifierJob>,
        metrics: Arc<MetricsCollector>,
        events: EventBus,
    ) -> Self {
        Self {
            ism,
            quality,
            normalizer,
            classifier,
            catalog_store,
            service_store,
            events,
            metrics,
            started_at: Instant::now(),
        }
    }

    /// Seconds elapsed since the process started.
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
