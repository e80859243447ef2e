// crates/catalog-service/src/lib.rs
// ============================================================================
// Crate: catalog-service
// Description: Wires every collaborator crate into one `AppState`, builds the
// axum router, and serves the HTTP control plane (spec §4.11, §6).
// Purpose: The library half of the control plane; both the `catalog-service`
// binary and `catalog-cli serve` call [`run`] so there is exactly one place
// that constructs the pipeline end to end.
// Dependencies: axum, catalog-broker, catalog-classify, catalog-config,
// catalog-core, catalog-normalize, catalog-providers, catalog-store-sqlite,
// tokio, tower-http
// ============================================================================

//! ## Overview
//! Startup order follows the dependency order spec §2 lists leaves-first:
//! open the stores, build the reliability substrate (cache/breaker/batch/AI
//! client), build the normalizer and classifier jobs on top of it, build the
//! ingestion broker, then the HTTP router. The metrics snapshot collector is
//! spawned once as a background task for the life of the process (spec
//! §4.11, Design Notes §9 "Global mutable state").

pub mod erp;
pub mod error;
pub mod events;
pub mod jobs;
pub mod metrics;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use axum::routing::post;
use catalog_broker::IngestionStateMachine;
use catalog_broker::QualityAnalyzer;
use catalog_classify::ClassifierJob;
use catalog_config::AppConfig;
use catalog_config::ClassifierConfig;
use catalog_config::NormalizationConfig;
use catalog_core::interfaces::CatalogStore;
use catalog_core::interfaces::ServiceStore;
use catalog_core::providers::AiProvider;
use catalog_core::time::Timestamp;
use catalog_normalize::AiNormalizer;
use catalog_normalize::NormalizerJob;
use catalog_providers::BatchProcessor;
use catalog_providers::registry::ProviderBundle;
use catalog_store_sqlite::SqliteCatalogStore;
use catalog_store_sqlite::SqliteServiceStore;
use time::OffsetDateTime;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::events::EventBus;
use crate::metrics::MetricsCollector;
use crate::state::AppState;

/// Current time as the `catalog_core::time::Timestamp` the rest of the
/// crate uses for job progress and status timestamps.
pub(crate) fn now() -> Timestamp {
    Timestamp::from_offset_date_time(OffsetDateTime::now_utc())
}

/// Builds the axum router over every control-plane endpoint (spec §6).
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Producer (ERP) protocol, spec §6.
        .route("/handshake", post(erp::handshake))
        .route("/metadata", post(erp::metadata))
        .route("/constant", post(erp::constant))
        .route("/catalog/meta", post(erp::catalog_meta))
        .route("/catalog/item", post(erp::catalog_item))
        .route("/catalog/items", post(erp::catalog_items))
        .route("/nomenclature/batch", post(erp::nomenclature_batch))
        .route("/complete", post(erp::complete))
        // Control-plane JSON API, spec §6.
        .route("/jobs/normalization/start", post(jobs::start_normalization))
        .route("/jobs/normalization/stop", post(jobs::stop_normalization))
        .route("/jobs/normalization/status", get(jobs::normalization_status))
        .route("/jobs/classification/start", post(jobs::start_classification))
        .route("/jobs/classification/stop", post(jobs::stop_classification))
        .route("/jobs/classification/status", get(jobs::classification_status))
        .route("/jobs/classification/current-tasks", get(jobs::current_tasks))
        .route("/metrics", get(jobs::metrics))
        .route("/snapshots", post(jobs::create_snapshot).get(jobs::list_snapshots))
        .route("/snapshots/{id}", get(jobs::get_snapshot))
        // SSE stream (spec §4.11, §6).
        .route("/events", get(events::stream))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Builds every collaborator and returns the shared application state, ready
/// to be handed to [`build_router`] or driven directly by an offline job
/// (spec §2 dependency order).
///
/// # Errors
///
/// Returns a boxed error if a store cannot be opened/migrated.
pub fn build_state(config: &AppConfig, normalization: NormalizationConfig, classifier_config: ClassifierConfig) -> Result<Arc<AppState>, Box<dyn std::error::Error>> {
    let catalog_store: Arc<dyn CatalogStore> = Arc::new(SqliteCatalogStore::open(
        &config.unified_catalogs_db_path,
        config.max_open_conns,
        config.max_idle_conns,
        config.conn_max_lifetime,
    )?);
    let service_store: Arc<dyn ServiceStore> = Arc::new(SqliteServiceStore::open(
        &config.service_database_path,
        config.max_open_conns,
        config.max_idle_conns,
        config.conn_max_lifetime,
    )?);

    let providers = ProviderBundle::build(config, &normalization);

    let batch = if providers.is_some() && normalization.batch_size > 1 {
        Some(Arc::new(BatchProcessor::new(
            normalization.batch_size,
            time::Duration::milliseconds(i64::try_from(normalization.flush_interval_ms).unwrap_or(i64::MAX)),
        )))
    } else {
        None
    };

    let ai_normalizer = providers.as_ref().map(|bundle| {
        let ai_provider: Arc<dyn AiProvider> = Arc::clone(&bundle.ai_client) as Arc<dyn AiProvider>;
        Arc::new(AiNormalizer::new(Arc::clone(&bundle.cache), ai_provider, batch.clone()))
    });

    reconcile_stale_checkpoints(catalog_store.as_ref());

    let ism = Arc::new(IngestionStateMachine::new(Arc::clone(&catalog_store), Arc::clone(&service_store)));
    let quality = Arc::new(QualityAnalyzer::new(Arc::clone(&catalog_store)));
    let normalizer = Arc::new(NormalizerJob::new(Arc::clone(&catalog_store), Arc::clone(&service_store), ai_normalizer, normalization));
    let classifier_ai: Option<Arc<dyn AiProvider>> = providers.as_ref().map(|bundle| Arc::clone(&bundle.ai_client) as Arc<dyn AiProvider>);
    let classifier = Arc::new(ClassifierJob::new(Arc::clone(&catalog_store), Arc::clone(&service_store), classifier_ai, classifier_config));
    let metrics = Arc::new(
        MetricsCollector::new(providers)
            .with_jobs(Arc::clone(&normalizer), Arc::clone(&classifier))
            .with_batch(batch),
    );
    let events = EventBus::new();

    Ok(Arc::new(AppState::new(catalog_store, service_store, ism, quality, normalizer, classifier, metrics, events)))
}

/// Builds the pipeline from `config` and serves the control plane until a
/// shutdown signal arrives (spec §4.11, §6). This is the single entry point
/// both the `catalog-service` binary and `catalog-cli serve` call.
///
/// # Errors
///
/// Returns a boxed error if a store cannot be opened or the listener cannot
/// bind `config.port`.
pub async fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(config, NormalizationConfig::default(), ClassifierConfig::default())?;
    tokio::spawn(Arc::clone(&state.metrics).run(state.events.clone()));

    let router = build_router(Arc::clone(&state));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "catalog-service listening");

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

/// Resolves when the process receives `SIGINT`/ctrl-c, for graceful
/// shutdown (spec §5 "cooperative cancellation").
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

/// Checkpoint-backed job kinds, read once at startup (SPEC_FULL §2
/// "Checkpoint/resume").
const CHECKPOINT_JOB_KINDS: [&str; 2] = ["normalize", "classify"];

/// Logs, but does not resume, any job whose last checkpoint is not `"done"`
/// — a crash mid-run looks like a cooperative stop (spec §5), not a signal
/// to silently pick back up where a prior process left off (Design Notes
/// §9 "5 minutes idle" is explicitly rejected in favor of this explicit
/// check run once at process start).
fn reconcile_stale_checkpoints(catalog_store: &dyn catalog_core::interfaces::CatalogStore) {
    for job_kind in CHECKPOINT_JOB_KINDS {
        match catalog_store.load_job_checkpoint(job_kind) {
            Ok(Some(checkpoint)) if checkpoint.cursor_payload != "done" => {
                tracing::warn!(
                    job_kind,
                    cursor = %checkpoint.cursor_payload,
                    updated_at = ?checkpoint.updated_at,
                    "found a checkpoint from a run that did not finish cleanly; surfacing as stopped, not resuming"
                );
            }
            Ok(_) => {}
            Err(error) => tracing::warn!(job_kind, %error, "failed to read job checkpoint at startup"),
        }
    }
}
