// crates/catalog-broker/src/quality.rs
// ============================================================================
// Module: Quality Analyzer
// Description: Post-`complete` consistency check between an upload's
// incrementally maintained counters and the rows actually persisted
// (SPEC_FULL §2 "Quality analysis job").
// Purpose: Catch silent undercounts (a row insert that succeeded but whose
// counter increment was lost) without re-reading every row on every
// ingestion call.
// Dependencies: catalog-core, tracing
// ============================================================================

//! ## Overview
//! The ISM increments `Upload.counters` at insert time for cheap progress
//! reporting during ingestion. [`QualityAnalyzer::analyze`] runs once, after
//! `complete`, and recounts the physical rows via
//! [`CatalogStore::count_upload_rows`]; any mismatch is recorded as a quality
//! issue rather than failing the upload, since the upload itself already
//! succeeded (spec §7 "long-running jobs never propagate a single failure").

use std::sync::Arc;

use catalog_core::CoreError;
use catalog_core::identifiers::UploadUuid;
use catalog_core::interfaces::CatalogStore;
use serde::Serialize;
use tracing::warn;

/// Severity recorded for a quality issue.
const SEVERITY_MISMATCH: &str = "counter_mismatch";

/// Runs the post-completion quality check for one upload.
pub struct QualityAnalyzer {
    catalog: Arc<dyn CatalogStore>,
}

/// Outcome of one [`QualityAnalyzer::analyze`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityReport {
    /// Constants the upload's counters claimed.
    pub reported_constants: u64,
    /// Constants actually found in the store.
    pub actual_constants: u64,
    /// Catalog/nomenclature items the upload's counters claimed.
    pub reported_items: u64,
    /// Catalog/nomenclature items actually found in the store.
    pub actual_items: u64,
}

impl QualityReport {
    /// Whether either counter diverged from the recount.
    #[must_use]
    pub const fn has_mismatch(&self) -> bool {
        self.reported_constants != self.actual_constants || self.reported_items != self.actual_items
    }
}

impl QualityAnalyzer {
    /// Builds an analyzer over the given catalog store.
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Recounts `upload`'s rows and records any mismatch against its
    /// incrementally maintained counters.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the upload does not exist,
    /// [`CoreError::Internal`] on store failure.
    pub fn analyze(&self, upload: UploadUuid) -> Result<QualityReport, CoreError> {
        let record = self.catalog.get_upload(upload)?.ok_or_else(|| CoreError::NotFound(upload.to_string()))?;
        let counts = self.catalog.count_upload_rows(upload)?;

        let report = QualityReport {
            reported_constants: record.counters.total_constants,
            actual_constants: counts.constants,
            reported_items: record.counters.total_items,
            actual_items: counts.items,
        };

        self.catalog.record_quality_metric(upload, "constants_actual", counts.constants as f64)?;
        self.catalog.record_quality_metric(upload, "items_actual", counts.items as f64)?;

        if report.has_mismatch() {
            warn!(
                upload_uuid = %upload,
                reported_constants = report.reported_constants,
                actual_constants = report.actual_constants,
                reported_items = report.reported_items,
                actual_items = report.actual_items,
                "upload counters diverged from recount"
            );
            let description = format!(
                "reported {} constants / {} items, recounted {} constants / {} items",
                report.reported_constants, report.reported_items, report.actual_constants, report.actual_items
            );
            self.catalog.record_quality_issue(upload, SEVERITY_MISMATCH, &description, None)?;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use catalog_core::domain::CatalogItem;
    use catalog_core::domain::Constant;
    use catalog_core::domain::NomenclatureItem;
    use catalog_core::domain::NormalizedData;
    use catalog_core::domain::ItemAttribute;
    use catalog_core::domain::Snapshot;
    use catalog_core::domain::Upload;
    use catalog_core::domain::UploadCounters;
    use catalog_core::domain::UploadStatus;
    use catalog_core::identifiers::IcCode;
    use catalog_core::identifiers::UploadRowId;
    use catalog_core::interfaces::BatchOutcome;
    use catalog_core::interfaces::IcPendingGroup;
    use catalog_core::interfaces::SourceRow;
    use catalog_core::interfaces::UploadDraft;
    use catalog_core::interfaces::UploadRowCounts;
    use catalog_core::time::Timestamp;
    use time::OffsetDateTime;

    use super::*;

    struct StubStore {
        upload: Upload,
        counts: UploadRowCounts,
        issues_recorded: Mutex<Vec<String>>,
    }

    impl CatalogStore for StubStore {
        fn create_upload(&self, _draft: UploadDraft) -> Result<Upload, CoreError> {
            unreachable!("not exercised in this test")
        }

        fn get_upload(&self, _uuid: UploadUuid) -> Result<Option<Upload>, CoreError> {
            Ok(Some(self.upload.clone()))
        }

        fn complete_upload(&self, _uuid: UploadUuid) -> Result<Upload, CoreError> {
            unreachable!("not exercised in this test")
        }

        fn insert_constant(&self, _upload: UploadUuid, _constant: Constant) -> Result<(), CoreError> {
            unreachable!("not exercised in this test")
        }

        fn ensure_catalog_table(&self, _upload: UploadUuid, _catalog_name: &str) -> Result<String, CoreError> {
            unreachable!("not exercised in this test")
        }

        fn insert_catalog_items(&self, _upload: UploadUuid, _table_name: &str, _items: Vec<CatalogItem>) -> Result<BatchOutcome, CoreError> {
            unreachable!("not exercised in this test")
        }

        fn insert_nomenclature_items(&self, _upload: UploadUuid, _items: Vec<NomenclatureItem>) -> Result<BatchOutcome, CoreError> {
            unreachable!("not exercised in this test")
        }

        fn read_source_rows(&self, _table_name: &str) -> Result<Vec<SourceRow>, CoreError> {
            Ok(Vec::new())
        }

        fn insert_normalized_rows(&self, _rows: Vec<NormalizedData>, _attributes: Vec<ItemAttribute>) -> Result<(), CoreError> {
            Ok(())
        }

        fn list_ic_pending_groups(&self) -> Result<Vec<IcPendingGroup>, CoreError> {
            Ok(Vec::new())
        }

        fn write_ic_classification(&self, _normalized_name: &str, _category: &str, _ic_code: IcCode, _ic_name: String, _ic_confidence: f64) -> Result<u64, CoreError> {
            Ok(0)
        }

        fn create_snapshot(&self, snapshot: Snapshot) -> Result<Snapshot, CoreError> {
            Ok(snapshot)
        }

        fn list_snapshots(&self) -> Result<Vec<Snapshot>, CoreError> {
            Ok(Vec::new())
        }

        fn count_upload_rows(&self, _upload: UploadUuid) -> Result<UploadRowCounts, CoreError> {
            Ok(self.counts)
        }

        fn record_quality_metric(&self, _upload: UploadUuid, _metric_name: &str, _metric_value: f64) -> Result<(), CoreError> {
            Ok(())
        }

        fn record_quality_issue(&self, _upload: UploadUuid, _severity: &str, description: &str, _sample_reference: Option<&str>) -> Result<(), CoreError> {
            self.issues_recorded.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(description.to_string());
            Ok(())
        }

        fn save_job_checkpoint(&self, _job_kind: &str, _cursor_payload: &str) -> Result<(), CoreError> {
            Ok(())
        }

        fn load_job_checkpoint(&self, _job_kind: &str) -> Result<Option<catalog_core::interfaces::JobCheckpoint>, CoreError> {
            Ok(None)
        }
    }

    fn sample_upload(counters: UploadCounters) -> Upload {
        Upload {
            id: UploadRowId(1),
            uuid: UploadUuid::new_v4(),
            started_at: Timestamp::from_offset_date_time(OffsetDateTime::now_utc()),
            completed_at: None,
            status: UploadStatus::Completed,
            version_erp: "8.3".into(),
            config_name: "Trade".into(),
            iteration_number: 1,
            iteration_label: "initial".into(),
            programmer: "ivanov".into(),
            purpose: "sync".into(),
            parent_upload_id: None,
            database_id: None,
            client_id: None,
            project_id: None,
            computer_name: "WS-1".into(),
            user_name: "erp".into(),
            config_version: "2.1".into(),
            counters,
        }
    }

    #[test]
    fn matching_counters_report_no_mismatch() {
        let upload = sample_upload(UploadCounters { total_constants: 3, total_catalogs: 1, total_items: 10 });
        let uuid = upload.uuid;
        let store = StubStore { upload, counts: UploadRowCounts { constants: 3, items: 10 }, issues_recorded: Mutex::new(Vec::new()) };
        let analyzer = QualityAnalyzer::new(Arc::new(store));
        let report = analyzer.analyze(uuid).expect("analyze");
        assert!(!report.has_mismatch());
    }

    #[test]
    fn diverging_counters_are_recorded_as_an_issue() {
        let upload = sample_upload(UploadCounters { total_constants: 3, total_catalogs: 1, total_items: 10 });
        let uuid = upload.uuid;
        let store = StubStore { upload, counts: UploadRowCounts { constants: 3, items: 7 }, issues_recorded: Mutex::new(Vec::new()) };
        let issues = Arc::new(store);
        let analyzer = QualityAnalyzer::new(issues.clone());
        let report = analyzer.analyze(uuid).expect("analyze");
        assert!(report.has_mismatch());
        assert_eq!(issues.issues_recorded.lock().unwrap().len(), 1);
    }
}
