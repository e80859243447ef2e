// crates/catalog-normalize/src/nrm.rs
// ============================================================================
// Module: Normalizer Job (NRM)
// Description: End-to-end job reading source rows, running CAT+NN (with an
// optional benchmark short-circuit and optional AIN enrichment), grouping
// into normalized output, and persisting it (spec §4.8).
// Purpose: The one orchestrator that ties the rest of `catalog-normalize`
// together into a long-running, cancelable, progress-reporting job.
// Dependencies: catalog-core, catalog-config, tokio, tracing, uuid
// ============================================================================

//! ## Overview
//! Per spec §4.8, for each source row:
//! 1. Run [`crate::categorizer::categorize`] and [`crate::name_normalizer::normalize`].
//! 2. Consult [`catalog_core::interfaces::ServiceStore::lookup_benchmark`]; a
//!    hit short-circuits CAT/NN/AIN entirely (spec §4.8 step 4, SPEC_FULL §2).
//! 3. If no benchmark hit and [`crate::ain::requires_ai`] says so, call AIN;
//!    its result replaces the rule-based name/category only if
//!    `ai_confidence >= min_confidence` (spec §4.8 step 3).
//! 4. Group rows by `(category, normalized_name)`, minting one
//!    `normalized_reference` UUID per group with `merged_count` set to the
//!    group size (spec §8.1).
//!
//! The job reports progress via a [`tokio::sync::watch`] channel using
//! [`catalog_core::job::JobProgress`]/[`JobState`] and is cooperatively
//! cancellable: [`NormalizerJob::request_stop`] flips a flag the row loop
//! checks every iteration, so a stop request drains nothing but simply
//! stops consuming new rows and flushes what has already been grouped.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use catalog_config::NormalizationConfig;
use catalog_core::domain::ItemAttribute;
use catalog_core::domain::NormalizedData;
use catalog_core::domain::ProcessingLevel;
use catalog_core::identifiers::ClientId;
use catalog_core::identifiers::NormalizedDataId;
use catalog_core::interfaces::CatalogStore;
use catalog_core::interfaces::ServiceStore;
use catalog_core::job::JobProgress;
use catalog_core::job::JobState;
use catalog_core::time::Timestamp;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::info;
use tracing::warn;

use crate::ain::AiNormalizer;
use crate::categorizer;
use crate::name_normalizer;

/// `job_kind` key this job persists its checkpoint under (SPEC_FULL §2
/// "Checkpoint/resume").
const JOB_KIND: &str = "normalize";

/// Outcome of one key collected per source row before grouping.
struct RowResult {
    source_reference: String,
    source_code: String,
    source_name: String,
    normalized_name: String,
    category: String,
    processing_level: ProcessingLevel,
    ai_confidence: Option<f64>,
    ai_reasoning: Option<String>,
    extraction: name_normalizer::NormalizationResult,
}

/// Summary returned once a normalization run ends (spec §4.8, §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizerSummary {
    /// Rows read from the source table.
    pub total_rows: u64,
    /// Rows successfully grouped and persisted.
    pub success: u64,
    /// Rows that errored and were skipped (spec §7: counted, not fatal).
    pub errors: u64,
    /// Distinct `(category, normalized_name)` groups produced.
    pub groups: u64,
    /// Whether the run was stopped before exhausting its source rows.
    pub stopped_early: bool,
}

/// The Normalizer job orchestrator (spec §4.8).
pub struct NormalizerJob {
    catalog_store: Arc<dyn CatalogStore>,
    service_store: Arc<dyn ServiceStore>,
    ai_normalizer: Option<Arc<AiNormalizer>>,
    config: NormalizationConfig,
    stop_requested: AtomicBool,
    progress: watch::Sender<JobProgress>,
}

impl NormalizerJob {
    /// Builds a job instance. `ai_normalizer` is `None` when no AI provider
    /// is configured (spec §4.7 "AI unavailable" falls back to rule-based
    /// output only).
    #[must_use]
    pub fn new(
        catalog_store: Arc<dyn CatalogStore>,
        service_store: Arc<dyn ServiceStore>,
        ai_normalizer: Option<Arc<AiNormalizer>>,
        config: NormalizationConfig,
    ) -> Self {
        let (progress, _receiver) = watch::channel(JobProgress::idle());
        Self { catalog_store, service_store, ai_normalizer, config, stop_requested: AtomicBool::new(false), progress }
    }

    /// Subscribes to progress updates (spec §4.11, §6 SSE `log`/status
    /// events).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<JobProgress> {
        self.progress.subscribe()
    }

    /// Requests cooperative cancellation; the run loop observes this at the
    /// next row boundary (spec §5).
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Runs the normalizer end to end over `table_name`'s source rows,
    /// scoped to `client_id` for benchmark lookups (spec §4.8).
    ///
    /// # Errors
    ///
    /// Returns [`catalog_core::CoreError`] if the source table cannot be
    /// read or the final group insert fails; per-row AI/benchmark failures
    /// are counted as row errors, not propagated (spec §7).
    pub async fn run(&self, table_name: &str, client_id: ClientId) -> Result<NormalizerSummary, catalog_core::CoreError> {
        self.stop_requested.store(false, Ordering::SeqCst);
        let source_rows = self.catalog_store.read_source_rows(table_name)?;
        let total = source_rows.len() as u64;
        self.publish(JobProgress { state: JobState::Running, processed: 0, total, success: 0, errors: 0, started_at: Some(now()) });

        let mut results: Vec<RowResult> = Vec::with_capacity(source_rows.len());
        let mut processed = 0u64;
        let mut success = 0u64;
        let mut errors = 0u64;
        let mut stopped_early = false;

        for source_row in source_rows {
            if self.stop_requested.load(Ordering::SeqCst) {
                stopped_early = true;
                break;
            }

            match self.process_row(&source_row.name, client_id).await {
                Ok(result) => {
                    success += 1;
                    results.push(RowResult {
                        source_reference: source_row.reference,
                        source_code: source_row.code,
                        source_name: source_row.name,
                        normalized_name: result.normalized_name,
                        category: result.category,
                        processing_level: result.processing_level,
                        ai_confidence: result.ai_confidence,
                        ai_reasoning: result.ai_reasoning,
                        extraction: result.extraction,
                    });
                }
                Err(reason) => {
                    errors += 1;
                    warn!(source_reference = %source_row.reference, %reason, "normalizer row failed, skipping");
                }
            }
            processed += 1;

            if processed % self.config.progress_event_interval == 0 {
                self.publish(JobProgress { state: JobState::Running, processed, total, success, errors, started_at: None });
                if let Err(error) = self.catalog_store.save_job_checkpoint(JOB_KIND, &processed.to_string()) {
                    warn!(%error, "failed to persist normalizer checkpoint");
                }
            }
        }

        if stopped_early {
            self.publish(JobProgress { state: JobState::Stopping, processed, total, success, errors, started_at: None });
        }

        let groups = self.persist_groups(results)?;

        let final_cursor = if stopped_early { processed.to_string() } else { "done".to_string() };
        if let Err(error) = self.catalog_store.save_job_checkpoint(JOB_KIND, &final_cursor) {
            warn!(%error, "failed to persist final normalizer checkpoint");
        }

        self.publish(JobProgress {
            state: JobState::Stopped,
            processed,
            total,
            success,
            errors,
            started_at: None,
        });
        info!(total, success, errors, groups, stopped_early, "normalizer run finished");

        Ok(NormalizerSummary { total_rows: total, success, errors, groups: groups as u64, stopped_early })
    }

    /// Runs CAT+NN (and the benchmark/AIN short-circuits) for one source
    /// name (spec §4.8 steps 2-4).
    async fn process_row(&self, source_name: &str, client_id: ClientId) -> Result<ProcessedRow, String> {
        let rule_category = categorizer::categorize(source_name);
        let rule_result = name_normalizer::normalize(source_name);

        if let Some(benchmark) = self
            .service_store
            .lookup_benchmark(client_id, &rule_result.normalized_name)
            .map_err(|err| err.to_string())?
        {
            self.service_store.record_benchmark_usage(benchmark.id).map_err(|err| err.to_string())?;
            return Ok(ProcessedRow {
                normalized_name: benchmark.normalized_name,
                category: benchmark.category,
                processing_level: ProcessingLevel::Benchmark,
                ai_confidence: None,
                ai_reasoning: None,
                extraction: rule_result,
            });
        }

        if let Some(ai_normalizer) = &self.ai_normalizer {
            if crate::ain::requires_ai(source_name, rule_category) {
                match ai_normalizer.normalize(source_name).await {
                    Ok(ai_result) if ai_result.confidence >= self.config.min_confidence && !ai_result.normalized_name.is_empty() => {
                        return Ok(ProcessedRow {
                            normalized_name: ai_result.normalized_name,
                            category: ai_result.category,
                            processing_level: ProcessingLevel::AiEnhanced,
                            ai_confidence: Some(ai_result.confidence),
                            ai_reasoning: Some(ai_result.reasoning),
                            extraction: rule_result,
                        });
                    }
                    Ok(_) => {}
                    Err(error) => warn!(%error, "AIN call failed, falling back to rule-based output"),
                }
            }
        }

        Ok(ProcessedRow {
            normalized_name: rule_result.normalized_name.clone(),
            category: rule_category.to_string(),
            processing_level: ProcessingLevel::Basic,
            ai_confidence: None,
            ai_reasoning: None,
            extraction: rule_result,
        })
    }

    /// Groups processed rows by `(category, normalized_name)` and persists
    /// them, returning the number of groups written (spec §8.1).
    fn persist_groups(&self, results: Vec<RowResult>) -> Result<usize, catalog_core::CoreError> {
        if results.is_empty() {
            return Ok(0);
        }

        let mut groups: HashMap<(String, String), Vec<RowResult>> = HashMap::new();
        for result in results {
            groups.entry((result.category.clone(), result.normalized_name.clone())).or_default().push(result);
        }

        let mut rows = Vec::new();
        let mut attributes = Vec::new();
        let created_at = now();

        for (placeholder, ((category, normalized_name), members)) in groups.into_iter().enumerate() {
            let normalized_reference = uuid::Uuid::new_v4().to_string();
            let merged_count = members.len() as u64;
            let placeholder_id = NormalizedDataId(i64::try_from(placeholder).unwrap_or(i64::MAX).saturating_add(1));

            let representative = members.first().expect("group is non-empty");
            rows.push(NormalizedData {
                id: placeholder_id,
                source_reference: representative.source_reference.clone(),
                source_name: representative.source_name.clone(),
                code: representative.source_code.clone(),
                normalized_name: normalized_name.clone(),
                normalized_reference,
                category: category.clone(),
                merged_count,
                ai_confidence: representative.ai_confidence,
                ai_reasoning: representative.ai_reasoning.clone(),
                processing_level: representative.processing_level,
                ic_code: None,
                ic_name: None,
                ic_confidence: None,
                created_at,
                source_database_id: None,
                source_iteration_number: None,
            });

            for member in &members {
                for extracted in &member.extraction.attributes {
                    attributes.push(ItemAttribute {
                        id: catalog_core::identifiers::ItemAttributeId(0),
                        normalized_item_id: placeholder_id,
                        attribute_type: extracted.attribute_type,
                        attribute_name: extracted.attribute_name.clone(),
                        attribute_value: extracted.attribute_value.clone(),
                        unit: extracted.unit.clone(),
                        original_text: extracted.original_text.clone(),
                        confidence: extracted.confidence,
                    });
                }
            }
        }

        let group_count = rows.len();
        self.catalog_store.insert_normalized_rows(rows, attributes)?;
        Ok(group_count)
    }

    fn publish(&self, progress: JobProgress) {
        let _ = self.progress.send(progress);
    }
}

/// Internal result of [`NormalizerJob::process_row`], pre-grouping.
struct ProcessedRow {
    normalized_name: String,
    category: String,
    processing_level: ProcessingLevel,
    ai_confidence: Option<f64>,
    ai_reasoning: Option<String>,
    extraction: name_normalizer::NormalizationResult,
}

fn now() -> Timestamp {
    Timestamp::from_offset_date_time(OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::domain::ClientBenchmark;
    use catalog_core::domain::ClassifierNode;
    use catalog_core::domain::NormalizedData as CoreNormalizedData;
    use catalog_core::domain::ProjectDatabase;
    use catalog_core::domain::Snapshot;
    use catalog_core::domain::Upload;
    use catalog_core::domain::CatalogItem as CoreCatalogItem;
    use catalog_core::interfaces::BatchOutcome;
    use catalog_core::interfaces::DatabaseFingerprint;
    use catalog_core::interfaces::IcPendingGroup;
    use catalog_core::interfaces::SourceRow;
    use catalog_core::interfaces::UploadDraft;
    use catalog_core::identifiers::IcCode;
    use catalog_core::identifiers::ProjectDatabaseId;
    use catalog_core::identifiers::UploadUuid;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCatalogStore {
        source_rows: Vec<SourceRow>,
        inserted: Mutex<Vec<(Vec<NormalizedData>, Vec<ItemAttribute>)>>,
        checkpoints: Mutex<Vec<(String, String)>>,
    }

    impl CatalogStore for FakeCatalogStore {
        fn create_upload(&self, _draft: UploadDraft) -> Result<Upload, catalog_core::CoreError> {
            unimplemented!("not exercised by NRM tests")
        }
        fn get_upload(&self, _uuid: UploadUuid) -> Result<Option<Upload>, catalog_core::CoreError> {
            unimplemented!("not exercised by NRM tests")
        }
        fn complete_upload(&self, _uuid: UploadUuid) -> Result<Upload, catalog_core::CoreError> {
            unimplemented!("not exercised by NRM tests")
        }
        fn insert_constant(&self, _upload: UploadUuid, _constant: catalog_core::domain::Constant) -> Result<(), catalog_core::CoreError> {
            unimplemented!("not exercised by NRM tests")
        }
        fn ensure_catalog_table(&self, _upload: UploadUuid, _catalog_name: &str) -> Result<String, catalog_core::CoreError> {
            unimplemented!("not exercised by NRM tests")
        }
        fn insert_catalog_items(&self, _upload: UploadUuid, _table_name: &str, _items: Vec<CoreCatalogItem>) -> Result<BatchOutcome, catalog_core::CoreError> {
            unimplemented!("not exercised by NRM tests")
        }
        fn insert_nomenclature_items(&self, _upload: UploadUuid, _items: Vec<catalog_core::domain::NomenclatureItem>) -> Result<BatchOutcome, catalog_core::CoreError> {
            unimplemented!("not exercised by NRM tests")
        }
        fn read_source_rows(&self, _table_name: &str) -> Result<Vec<SourceRow>, catalog_core::CoreError> {
            Ok(self.source_rows.clone())
        }
        fn insert_normalized_rows(&self, rows: Vec<CoreNormalizedData>, attributes: Vec<ItemAttribute>) -> Result<(), catalog_core::CoreError> {
            self.inserted.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push((rows, attributes));
            Ok(())
        }
        fn list_ic_pending_groups(&self) -> Result<Vec<IcPendingGroup>, catalog_core::CoreError> {
            Ok(Vec::new())
        }
        fn write_ic_classification(&self, _normalized_name: &str, _category: &str, _ic_code: IcCode, _ic_name: String, _ic_confidence: f64) -> Result<u64, catalog_core::CoreError> {
            Ok(0)
        }
        fn create_snapshot(&self, snapshot: Snapshot) -> Result<Snapshot, catalog_core::CoreError> {
            Ok(snapshot)
        }
        fn list_snapshots(&self) -> Result<Vec<Snapshot>, catalog_core::CoreError> {
            Ok(Vec::new())
        }
        fn count_upload_rows(&self, _upload: UploadUuid) -> Result<catalog_core::interfaces::UploadRowCounts, catalog_core::CoreError> {
            unimplemented!("not exercised by NRM tests")
        }
        fn record_quality_metric(&self, _upload: UploadUuid, _metric_name: &str, _metric_value: f64) -> Result<(), catalog_core::CoreError> {
            unimplemented!("not exercised by NRM tests")
        }
        fn record_quality_issue(
            &self,
            _upload: UploadUuid,
            _severity: &str,
            _description: &str,
            _sample_reference: Option<&str>,
        ) -> Result<(), catalog_core::CoreError> {
            unimplemented!("not exercised by NRM tests")
        }
        fn save_job_checkpoint(&self, job_kind: &str, cursor_payload: &str) -> Result<(), catalog_core::CoreError> {
            self.checkpoints
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((job_kind.to_string(), cursor_payload.to_string()));
            Ok(())
        }
        fn load_job_checkpoint(&self, _job_kind: &str) -> Result<Option<catalog_core::interfaces::JobCheckpoint>, catalog_core::CoreError> {
            Ok(None)
        }
    }

    struct FakeServiceStore;

    impl ServiceStore for FakeServiceStore {
        fn get_database(&self, _id: ProjectDatabaseId) -> Result<Option<ProjectDatabase>, catalog_core::CoreError> {
            Ok(None)
        }
        fn match_database(&self, _fingerprint: &DatabaseFingerprint) -> Result<Option<ProjectDatabase>, catalog_core::CoreError> {
            Ok(None)
        }
        fn load_classifier_tree(&self) -> Result<Vec<ClassifierNode>, catalog_core::CoreError> {
            Ok(Vec::new())
        }
        fn lookup_benchmark(&self, _client_id: ClientId, _normalized_source_name: &str) -> Result<Option<ClientBenchmark>, catalog_core::CoreError> {
            Ok(None)
        }
        fn record_benchmark_usage(&self, _benchmark_id: i64) -> Result<(), catalog_core::CoreError> {
            Ok(())
        }
        fn get_client(&self, _id: catalog_core::identifiers::ClientId) -> Result<Option<catalog_core::domain::Client>, catalog_core::CoreError> {
            unimplemented!("not exercised by NRM tests")
        }
        fn get_project(&self, _id: catalog_core::identifiers::ProjectId) -> Result<Option<catalog_core::domain::Project>, catalog_core::CoreError> {
            unimplemented!("not exercised by NRM tests")
        }
    }

    #[tokio::test]
    async fn run_groups_identical_normalized_names_together() {
        let source_rows = vec![
            SourceRow { reference: "r1".into(), code: "c1".into(), name: "Молоток 500г".into() },
            SourceRow { reference: "r2".into(), code: "c2".into(), name: "МОЛОТОК 600Г".into() },
        ];
        let catalog_store = Arc::new(FakeCatalogStore { source_rows, inserted: Mutex::new(Vec::new()), checkpoints: Mutex::new(Vec::new()) });
        let job = NormalizerJob::new(catalog_store.clone(), Arc::new(FakeServiceStore), None, NormalizationConfig::default());

        let summary = job.run("source_table", ClientId(1)).await.expect("run succeeds");
        assert_eq!(summary.total_rows, 2);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.groups, 1, "both rows normalize to the same name+category");

        let inserted = catalog_store.inserted.lock().unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].0[0].merged_count, 2);
    }

    #[tokio::test]
    async fn stop_request_halts_before_exhausting_rows() {
        let source_rows = vec![
            SourceRow { reference: "r1".into(), code: "c1".into(), name: "Молоток".into() },
            SourceRow { reference: "r2".into(), code: "c2".into(), name: "Кабель".into() },
        ];
        let catalog_store = Arc::new(FakeCatalogStore { source_rows, inserted: Mutex::new(Vec::new()), checkpoints: Mutex::new(Vec::new()) });
        let job = NormalizerJob::new(catalog_store, Arc::new(FakeServiceStore), None, NormalizationConfig::default());
        job.request_stop();

        let summary = job.run("source_table", ClientId(1)).await.expect("run succeeds");
        assert!(summary.stopped_early);
        assert_eq!(summary.success, 0);
    }

    #[tokio::test]
    async fn completed_run_persists_a_done_checkpoint() {
        let source_rows = vec![SourceRow { reference: "r1".into(), code: "c1".into(), name: "Молоток".into() }];
        let catalog_store = Arc::new(FakeCatalogStore { source_rows, inserted: Mutex::new(Vec::new()), checkpoints: Mutex::new(Vec::new()) });
        let job = NormalizerJob::new(catalog_store.clone(), Arc::new(FakeServiceStore), None, NormalizationConfig::default());

        job.run("source_table", ClientId(1)).await.expect("run succeeds");

        let checkpoints = catalog_store.checkpoints.lock().unwrap();
        assert_eq!(checkpoints.last(), Some(&(JOB_KIND.to_string(), "done".to_string())));
    }
}
