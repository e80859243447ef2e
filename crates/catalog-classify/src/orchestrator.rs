// crates/catalog-classify/src/orchestrator.rs
// ============================================================================
// Module: Classifier Orchestrator
// Description: Worker-pool orchestration around the per-group descent
// algorithm (spec §4.10 Orchestration, §5, §8.7).
// Purpose: Turn `descend` (one group, one walk) into a bounded-concurrency
// job over every pending group, with a pacing producer, a stop flag, a
// published `current_tasks` map, progress events, and the IC write-back
// retry policy.
// Dependencies: catalog-core, catalog-config, tokio, tracing
// ============================================================================

//! ## Overview
//! Shaped after [`crate::tree`]/[`crate::descent`] plus the `NormalizerJob`
//! orchestration pattern in `catalog-normalize::nrm`: a producer task feeds a
//! bounded `mpsc` channel (capacity `2*W`, spec §4.10) pacing itself every
//! `dispatch_pace_every` sends, while `W` worker tasks pull groups and run
//! [`crate::descent::descend`] concurrently. Each worker publishes its
//! current group into a shared `current_tasks` map for observability (spec
//! §5 "process-wide `current_tasks` map"), clearing the entry once the group
//! is done. A stop flag is checked by both the producer (stop enqueuing) and
//! workers (stop dequeuing) between tasks only — an in-flight descent always
//! finishes or errors out before a worker exits (spec §5 cancellation
//! semantics).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use catalog_config::ClassifierConfig;
use catalog_core::identifiers::IcCode;
use catalog_core::interfaces::CatalogStore;
use catalog_core::interfaces::IcPendingGroup;
use catalog_core::interfaces::ServiceStore;
use catalog_core::job::JobProgress;
use catalog_core::job::JobState;
use catalog_core::providers::AiProvider;
use catalog_core::time::Timestamp;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::info;
use tracing::warn;

use crate::descent;
use crate::error::ClassifyError;
use crate::tree::ClassifierTree;

/// `job_kind` key this job persists its checkpoint under (SPEC_FULL §2
/// "Checkpoint/resume").
const JOB_KIND: &str = "classify";

/// One worker's currently in-flight group, published for observability
/// (spec §5 "process-wide `current_tasks` map", §6 "Current IC tasks").
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CurrentTask {
    /// Index of the worker running this group.
    pub worker_id: usize,
    /// The group's normalized name.
    pub normalized_name: String,
    /// The group's category.
    pub category: String,
    /// Number of source rows merged into the group.
    pub merged_count: u64,
    /// The group's position in the dispatch order.
    pub index: usize,
}

/// Summary returned once an IC classification run ends (spec §4.10 "Output
/// summary", §6 "IC reclassify").
#[derive(Debug, Clone)]
pub struct ClassifierSummary {
    /// Groups successfully classified and written back.
    pub classified: u64,
    /// Groups that failed (descent exhausted its backoff, or nothing in the
    /// tree was judged to fit).
    pub failed: u64,
    /// Total groups considered this run.
    pub total_groups: u64,
    /// Wall time for the whole run.
    pub total_duration: Duration,
    /// Mean wall time per classified group.
    pub avg_duration: Duration,
    /// Mean accepted-step count per classified group.
    pub avg_steps: f64,
    /// Mean AI-call count per classified group.
    pub avg_ai_calls: f64,
    /// Up to 10 sampled error messages (spec §7).
    pub error_samples: Vec<String>,
    /// Localized human-readable summary (spec §7 "every job's final status
    /// carries a message").
    pub message: String,
}

/// The Hierarchical Classifier job orchestrator (spec §4.10).
pub struct ClassifierJob {
    catalog_store: Arc<dyn CatalogStore>,
    service_store: Arc<dyn ServiceStore>,
    ai: Option<Arc<dyn AiProvider>>,
    config: ClassifierConfig,
    stop_requested: Arc<AtomicBool>,
    current_tasks: Arc<Mutex<HashMap<usize, CurrentTask>>>,
    progress: watch::Sender<JobProgress>,
}

impl ClassifierJob {
    /// Builds a job instance. `ai` is `None` when no AI provider is
    /// configured; `run` then fails fast with [`ClassifyError::Precondition`]
    /// rather than starting any worker (spec §4.10 preconditions).
    #[must_use]
    pub fn new(
        catalog_store: Arc<dyn CatalogStore>,
        service_store: Arc<dyn ServiceStore>,
        ai: Option<Arc<dyn AiProvider>>,
        config: ClassifierConfig,
    ) -> Self {
        let (progress, _receiver) = watch::channel(JobProgress::idle());
        Self {
            catalog_store,
            service_store,
            ai,
            config,
            stop_requested: Arc::new(AtomicBool::new(false)),
            current_tasks: Arc::new(Mutex::new(HashMap::new())),
            progress,
        }
    }

    /// Subscribes to progress updates (spec §4.11, §6 status/SSE events).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<JobProgress> {
        self.progress.subscribe()
    }

    /// Requests cooperative cancellation (spec §5, §4.10 "stop flag").
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Returns a snapshot of every worker's current group (spec §6 "Current
    /// IC tasks").
    #[must_use]
    pub fn current_tasks(&self) -> Vec<CurrentTask> {
        let guard = self.current_tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut tasks: Vec<CurrentTask> = guard.values().cloned().collect();
        tasks.sort_by_key(|task| task.worker_id);
        tasks
    }

    /// Runs IC classification over up to `limit` pending groups (`0` means
    /// all, spec §6 "IC reclassify"), reducing the worker pool by one if
    /// `normalizer_running` (spec §4.10, §5).
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::Precondition`] if the IC tree is empty or no
    /// AI provider is configured; returns [`ClassifyError::Store`] if
    /// reading pending groups or the classifier tree fails. Per-group
    /// descent/write-back failures are counted in the returned summary, not
    /// propagated (spec §7).
    pub async fn run(&self, limit: usize, normalizer_running: bool) -> Result<ClassifierSummary, ClassifyError> {
        self.stop_requested.store(false, Ordering::SeqCst);
        let Some(ai) = self.ai.clone() else {
            return Err(ClassifyError::Precondition(
                "no AI provider configured; set AI_API_KEY before starting IC classification".to_string(),
            ));
        };

        let tree_nodes = self.service_store.load_classifier_tree()?;
        let tree = Arc::new(ClassifierTree::build(tree_nodes));
        if tree.is_empty() {
            return Err(ClassifyError::Precondition(
                "IC classifier tree is empty; load the classifier file before starting IC classification".to_string(),
            ));
        }

        let mut groups = self.catalog_store.list_ic_pending_groups()?;
        if limit > 0 {
            groups.truncate(limit);
        }
        let total_groups = u64::try_from(groups.len()).unwrap_or(u64::MAX);
        self.publish(JobProgress {
            state: JobState::Running,
            processed: 0,
            total: total_groups,
            success: 0,
            errors: 0,
            started_at: Some(now()),
        });

        if groups.is_empty() {
            self.publish(JobProgress::idle());
            return Ok(ClassifierSummary {
                classified: 0,
                failed: 0,
                total_groups: 0,
                total_duration: Duration::ZERO,
                avg_duration: Duration::ZERO,
                avg_steps: 0.0,
                avg_ai_calls: 0.0,
                error_samples: Vec::new(),
                message: "no groups pending IC classification".to_string(),
            });
        }

        let worker_count = self.config.effective_workers(normalizer_running).max(1);
        let queue_capacity = (2 * worker_count).max(1);
        let (sender, receiver) = mpsc::channel::<(usize, IcPendingGroup)>(queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let start = Instant::now();
        let results = Arc::new(Mutex::new(Vec::<WorkerOutcome>::with_capacity(groups.len())));
        let completed = Arc::new(std::sync::atomic::AtomicU64::new(0));

        let producer_stop = Arc::clone(&self.stop_requested);
        let dispatch_pace_every = self.config.dispatch_pace_every.max(1);
        let dispatch_pace_ms = self.config.dispatch_pace_ms;
        let producer = tokio::spawn(async move {
            for (index, group) in groups.into_iter().enumerate() {
                if producer_stop.load(Ordering::SeqCst) {
                    break;
                }
                if sender.send((index, group)).await.is_err() {
                    break;
                }
                if (index + 1) % usize::try_from(dispatch_pace_every).unwrap_or(usize::MAX) == 0 {
                    tokio::time::sleep(Duration::from_millis(dispatch_pace_ms)).await;
                }
            }
        });

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let receiver = Arc::clone(&receiver);
            let tree = Arc::clone(&tree);
            let ai = Arc::clone(&ai);
            let catalog_store = Arc::clone(&self.catalog_store);
            let stop_requested = Arc::clone(&self.stop_requested);
            let current_tasks = Arc::clone(&self.current_tasks);
            let results = Arc::clone(&results);
            let completed = Arc::clone(&completed);
            let progress = self.progress.clone();
            let progress_interval = self.config.progress_event_interval.max(1);
            let total = total_groups;

            workers.push(tokio::spawn(async move {
                loop {
                    if stop_requested.load(Ordering::SeqCst) {
                        break;
                    }
                    let next = { receiver.lock().await.recv().await };
                    let Some((index, group)) = next else { break };

                    {
                        let mut guard = current_tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                        guard.insert(
                            worker_id,
                            CurrentTask {
                                worker_id,
                                normalized_name: group.normalized_name.clone(),
                                category: group.category.clone(),
                                merged_count: group.merged_count,
                                index,
                            },
                        );
                    }

                    let outcome = classify_one(&tree, ai.as_ref(), &catalog_store, &group).await;

                    {
                        let mut guard = current_tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                        guard.remove(&worker_id);
                    }

                    results.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(outcome);
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if done % progress_interval == 0 {
                        let success = results
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner)
                            .iter()
                            .filter(|outcome| outcome.error.is_none())
                            .count();
                        let success = u64::try_from(success).unwrap_or(u64::MAX);
                        let _ = progress.send(JobProgress {
                            state: JobState::Running,
                            processed: done,
                            total,
                            success,
                            errors: done - success,
                            started_at: None,
                        });
                        if let Err(error) = catalog_store.save_job_checkpoint(JOB_KIND, &done.to_string()) {
                            warn!(%error, "failed to persist classifier checkpoint");
                        }
                    }
                }
            }));
        }

        let _ = producer.await;
        for worker in workers {
            let _ = worker.await;
        }

        let stopped_early = self.stop_requested.load(Ordering::SeqCst);
        let total_duration = start.elapsed();
        let results: Vec<WorkerOutcome> = results.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();

        let mut classified = 0u64;
        let mut failed = 0u64;
        let mut step_total = 0u64;
        let mut ai_call_total = 0u64;
        let mut error_samples = Vec::new();
        for outcome in &results {
            if let Some(reason) = &outcome.error {
                failed += 1;
                if error_samples.len() < 10 {
                    error_samples.push(reason.clone());
                }
            } else {
                classified += 1;
                step_total += u64::from(outcome.steps);
                ai_call_total += u64::from(outcome.ai_calls);
            }
        }

        self.publish(JobProgress {
            state: JobState::Stopped,
            processed: u64::try_from(results.len()).unwrap_or(u64::MAX),
            total: total_groups,
            success: classified,
            errors: failed,
            started_at: None,
        });

        let avg_duration = if classified > 0 { total_duration / u32::try_from(classified).unwrap_or(1) } else { Duration::ZERO };
        let avg_steps = if classified > 0 { step_total as f64 / classified as f64 } else { 0.0 };
        let avg_ai_calls = if classified > 0 { ai_call_total as f64 / classified as f64 } else { 0.0 };

        let message = if stopped_early {
            format!("IC classification stopped: {classified} classified, {failed} failed before the stop request")
        } else if classified == 0 {
            format!("IC classification found no acceptable classification for any of {total_groups} groups")
        } else {
            format!("IC classification finished: {classified} of {total_groups} groups classified, {failed} failed")
        };

        let final_cursor = if stopped_early { results.len().to_string() } else { "done".to_string() };
        if let Err(error) = self.catalog_store.save_job_checkpoint(JOB_KIND, &final_cursor) {
            warn!(%error, "failed to persist final classifier checkpoint");
        }

        info!(classified, failed, total_groups, stopped_early, "IC classification run finished");

        Ok(ClassifierSummary {
            classified,
            failed,
            total_groups,
            total_duration,
            avg_duration,
            avg_steps,
            avg_ai_calls,
            error_samples,
            message,
        })
    }

    fn publish(&self, progress: JobProgress) {
        let _ = self.progress.send(progress);
    }
}

/// Per-group outcome collected from a worker before the run summary is
/// computed.
#[derive(Debug, Clone)]
struct WorkerOutcome {
    steps: u32,
    ai_calls: u32,
    error: Option<String>,
}

/// Runs [`descend`] for one group and, on success, writes the result back
/// with the retry policy spec §4.10 "Write-back" specifies.
async fn classify_one(
    tree: &ClassifierTree,
    ai: &dyn AiProvider,
    catalog_store: &Arc<dyn CatalogStore>,
    group: &IcPendingGroup,
) -> WorkerOutcome {
    match descent::descend(tree, ai, &group.normalized_name, &group.category).await {
        Ok(Some(outcome)) => {
            match write_back_with_retry(catalog_store, &group.normalized_name, &group.category, &outcome).await {
                Ok(()) => WorkerOutcome { steps: u32::try_from(outcome.steps.len()).unwrap_or(u32::MAX), ai_calls: outcome.ai_calls, error: None },
                Err(reason) => WorkerOutcome { steps: 0, ai_calls: outcome.ai_calls, error: Some(reason) },
            }
        }
        Ok(None) => WorkerOutcome {
            steps: 0,
            ai_calls: 0,
            error: Some(format!("no classifier node accepted for \"{}\"", group.normalized_name)),
        },
        Err(error) => WorkerOutcome { steps: 0, ai_calls: 0, error: Some(error.to_string()) },
    }
}

/// Backoff schedule for IC write-back retries on a busy/locked store (spec
/// §4.10 "retry the update on 'database busy/locked' with exponential
/// backoff (~50/100/200/400/800 ms, capped retries)").
const WRITE_BACK_BACKOFF_MS: [u64; 5] = [50, 100, 200, 400, 800];

/// Per-statement deadline for the IC write-back call (spec §4.10 "~10s").
const WRITE_BACK_TIMEOUT: Duration = Duration::from_secs(10);

async fn write_back_with_retry(
    catalog_store: &Arc<dyn CatalogStore>,
    normalized_name: &str,
    category: &str,
    outcome: &descent::DescentOutcome,
) -> Result<(), String> {
    let mut last_error = None;
    for (attempt, backoff_ms) in WRITE_BACK_BACKOFF_MS.iter().enumerate() {
        let store = Arc::clone(catalog_store);
        let normalized_name_owned = normalized_name.to_string();
        let category_owned = category.to_string();
        let code: IcCode = outcome.code.clone();
        let name = outcome.name.clone();
        let confidence = outcome.confidence;

        let call = tokio::task::spawn_blocking(move || {
            store.write_ic_classification(&normalized_name_owned, &category_owned, code, name, confidence)
        });

        match tokio::time::timeout(WRITE_BACK_TIMEOUT, call).await {
            Ok(Ok(Ok(_changed))) => return Ok(()),
            Ok(Ok(Err(error))) => {
                if error.is_retryable() {
                    last_error = Some(error.to_string());
                    warn!(attempt, %error, "IC write-back hit a busy store, retrying");
                    tokio::time::sleep(Duration::from_millis(*backoff_ms)).await;
                    continue;
                }
                return Err(error.to_string());
            }
            Ok(Err(join_error)) => return Err(format!("IC write-back task panicked: {join_error}")),
            Err(_elapsed) => {
                last_error = Some("IC write-back statement timed out after 10s".to_string());
                warn!(attempt, "IC write-back timed out, retrying");
            }
        }
    }
    Err(last_error.unwrap_or_else(|| "IC write-back retries exhausted".to_string()))
}

fn now() -> Timestamp {
    Timestamp::from_offset_date_time(OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use catalog_core::CoreError;
    use catalog_core::domain::CatalogItem;
    use catalog_core::domain::ClassifierNode;
    use catalog_core::domain::ClientBenchmark;
    use catalog_core::domain::Constant;
    use catalog_core::domain::NomenclatureItem;
    use catalog_core::domain::NormalizedData;
    use catalog_core::domain::ProjectDatabase;
    use catalog_core::domain::Snapshot;
    use catalog_core::domain::Upload;
    use catalog_core::identifiers::ClientId;
    use catalog_core::identifiers::ProjectDatabaseId;
    use catalog_core::identifiers::UploadUuid;
    use catalog_core::interfaces::BatchOutcome;
    use catalog_core::interfaces::DatabaseFingerprint;
    use catalog_core::interfaces::SourceRow;
    use catalog_core::interfaces::UploadDraft;
    use catalog_core::providers::AiError;
    use catalog_core::providers::ChatRequest;

    use super::*;

    struct FakeCatalogStore {
        pending: Vec<IcPendingGroup>,
        written: Mutex<Vec<(String, String, String)>>,
    }

    impl CatalogStore for FakeCatalogStore {
        fn create_upload(&self, _draft: UploadDraft) -> Result<Upload, CoreError> {
            unimplemented!("not exercised by classifier tests")
        }
        fn get_upload(&self, _uuid: UploadUuid) -> Result<Option<Upload>, CoreError> {
            unimplemented!("not exercised by classifier tests")
        }
        fn complete_upload(&self, _uuid: UploadUuid) -> Result<Upload, CoreError> {
            unimplemented!("not exercised by classifier tests")
        }
        fn insert_constant(&self, _upload: UploadUuid, _constant: Constant) -> Result<(), CoreError> {
            unimplemented!("not exercised by classifier tests")
        }
        fn ensure_catalog_table(&self, _upload: UploadUuid, _catalog_name: &str) -> Result<String, CoreError> {
            unimplemented!("not exercised by classifier tests")
        }
        fn insert_catalog_items(&self, _upload: UploadUuid, _table_name: &str, _items: Vec<CatalogItem>) -> Result<BatchOutcome, CoreError> {
            unimplemented!("not exercised by classifier tests")
        }
        fn insert_nomenclature_items(&self, _upload: UploadUuid, _items: Vec<NomenclatureItem>) -> Result<BatchOutcome, CoreError> {
            unimplemented!("not exercised by classifier tests")
        }
        fn read_source_rows(&self, _table_name: &str) -> Result<Vec<SourceRow>, CoreError> {
            unimplemented!("not exercised by classifier tests")
        }
        fn insert_normalized_rows(&self, _rows: Vec<NormalizedData>, _attributes: Vec<catalog_core::domain::ItemAttribute>) -> Result<(), CoreError> {
            unimplemented!("not exercised by classifier tests")
        }
        fn list_ic_pending_groups(&self) -> Result<Vec<IcPendingGroup>, CoreError> {
            Ok(self.pending.clone())
        }
        fn write_ic_classification(&self, normalized_name: &str, category: &str, ic_code: IcCode, ic_name: String, _confidence: f64) -> Result<u64, CoreError> {
            self.written
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((normalized_name.to_string(), category.to_string(), ic_code.as_str().to_string()));
            let _ = ic_name;
            Ok(1)
        }
        fn create_snapshot(&self, snapshot: Snapshot) -> Result<Snapshot, CoreError> {
            Ok(snapshot)
        }
        fn list_snapshots(&self) -> Result<Vec<Snapshot>, CoreError> {
            Ok(Vec::new())
        }
        fn count_upload_rows(&self, _upload: UploadUuid) -> Result<catalog_core::interfaces::UploadRowCounts, CoreError> {
            unimplemented!("not exercised by classifier tests")
        }
        fn record_quality_metric(&self, _upload: UploadUuid, _metric_name: &str, _metric_value: f64) -> Result<(), CoreError> {
            unimplemented!("not exercised by classifier tests")
        }
        fn record_quality_issue(
            &self,
            _upload: UploadUuid,
            _severity: &str,
            _description: &str,
            _sample_reference: Option<&str>,
        ) -> Result<(), CoreError> {
            unimplemented!("not exercised by classifier tests")
        }
        fn save_job_checkpoint(&self, _job_kind: &str, _cursor_payload: &str) -> Result<(), CoreError> {
            unimplemented!("not exercised by classifier tests")
        }
        fn load_job_checkpoint(&self, _job_kind: &str) -> Result<Option<catalog_core::interfaces::JobCheckpoint>, CoreError> {
            unimplemented!("not exercised by classifier tests")
        }
    }

    struct FakeServiceStore {
        tree: Vec<ClassifierNode>,
    }

    impl ServiceStore for FakeServiceStore {
        fn get_database(&self, _id: ProjectDatabaseId) -> Result<Option<ProjectDatabase>, CoreError> {
            Ok(None)
        }
        fn match_database(&self, _fingerprint: &DatabaseFingerprint) -> Result<Option<ProjectDatabase>, CoreError> {
            Ok(None)
        }
        fn load_classifier_tree(&self) -> Result<Vec<ClassifierNode>, CoreError> {
            Ok(self.tree.clone())
        }
        fn lookup_benchmark(&self, _client_id: ClientId, _normalized_source_name: &str) -> Result<Option<ClientBenchmark>, CoreError> {
            Ok(None)
        }
        fn record_benchmark_usage(&self, _benchmark_id: i64) -> Result<(), CoreError> {
            Ok(())
        }
        fn get_client(&self, _id: catalog_core::identifiers::ClientId) -> Result<Option<catalog_core::domain::Client>, CoreError> {
            unimplemented!("not exercised by classifier tests")
        }
        fn get_project(&self, _id: catalog_core::identifiers::ProjectId) -> Result<Option<catalog_core::domain::Project>, CoreError> {
            unimplemented!("not exercised by classifier tests")
        }
    }

    struct ScriptedProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AiProvider for ScriptedProvider {
        async fn complete(&self, _request: ChatRequest) -> Result<String, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(r#"{"code":"A","name":"Node A","confidence":0.9,"reason":"ok"}"#.to_string())
        }
    }

    fn node(code: &str, parent: Option<&str>, level: u32) -> ClassifierNode {
        ClassifierNode { code: IcCode::new(code), name: format!("Node {code}"), parent_code: parent.map(IcCode::new), level }
    }

    #[tokio::test]
    async fn run_fails_fast_without_ai_provider() {
        let catalog_store = Arc::new(FakeCatalogStore { pending: Vec::new(), written: Mutex::new(Vec::new()) });
        let service_store = Arc::new(FakeServiceStore { tree: vec![node("A", None, 1)] });
        let job = ClassifierJob::new(catalog_store, service_store, None, ClassifierConfig::default());
        let error = job.run(0, false).await.unwrap_err();
        assert!(matches!(error, ClassifyError::Precondition(_)));
    }

    #[tokio::test]
    async fn run_fails_fast_on_empty_tree() {
        let catalog_store = Arc::new(FakeCatalogStore { pending: Vec::new(), written: Mutex::new(Vec::new()) });
        let service_store = Arc::new(FakeServiceStore { tree: Vec::new() });
        let ai: Arc<dyn AiProvider> = Arc::new(ScriptedProvider { calls: AtomicUsize::new(0) });
        let job = ClassifierJob::new(catalog_store, service_store, Some(ai), ClassifierConfig::default());
        let error = job.run(0, false).await.unwrap_err();
        assert!(matches!(error, ClassifyError::Precondition(_)));
    }

    #[tokio::test]
    async fn run_classifies_every_pending_group_and_writes_back() {
        let pending = vec![
            IcPendingGroup { normalized_name: "молоток".to_string(), category: "tools".to_string(), merged_count: 3 },
            IcPendingGroup { normalized_name: "втулка".to_string(), category: "tools".to_string(), merged_count: 2 },
        ];
        let catalog_store = Arc::new(FakeCatalogStore { pending, written: Mutex::new(Vec::new()) });
        let service_store = Arc::new(FakeServiceStore { tree: vec![node("A", None, 1)] });
        let ai: Arc<dyn AiProvider> = Arc::new(ScriptedProvider { calls: AtomicUsize::new(0) });
        let job = ClassifierJob::new(catalog_store.clone(), service_store, Some(ai), ClassifierConfig::default());

        let summary = job.run(0, false).await.expect("run succeeds");
        assert_eq!(summary.total_groups, 2);
        assert_eq!(summary.classified, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(catalog_store.written.lock().unwrap().len(), 2);
        assert!(job.current_tasks().is_empty(), "no task should remain in-flight after run completes");
    }

    #[tokio::test]
    async fn run_respects_limit() {
        let pending = vec![
            IcPendingGroup { normalized_name: "a".to_string(), category: "tools".to_string(), merged_count: 1 },
            IcPendingGroup { normalized_name: "b".to_string(), category: "tools".to_string(), merged_count: 1 },
            IcPendingGroup { normalized_name: "c".to_string(), category: "tools".to_string(), merged_count: 1 },
        ];
        let catalog_store = Arc::new(FakeCatalogStore { pending, written: Mutex::new(Vec::new()) });
        let service_store = Arc::new(FakeServiceStore { tree: vec![node("A", None, 1)] });
        let ai: Arc<dyn AiProvider> = Arc::new(ScriptedProvider { calls: AtomicUsize::new(0) });
        let job = ClassifierJob::new(catalog_store, service_store, Some(ai), ClassifierConfig::default());

        let summary = job.run(2, false).await.expect("run succeeds");
        assert_eq!(summary.total_groups, 2);
    }
}
