// crates/catalog-broker/src/ism.rs
// ============================================================================
// Module: Ingestion State Machine
// Description: The sequential handshake -> metadata -> constant/catalog/
// nomenclature -> complete protocol an upload runs through (spec §4.1).
// Purpose: Turn typed protocol requests into `CatalogStore`/`ServiceStore`
// calls, resolving tenancy on handshake and enforcing "every non-handshake
// call must carry a known upload UUID" uniformly.
// Dependencies: catalog-core, time
// ============================================================================

//! ## Overview
//! [`IngestionStateMachine`] holds the two store seams (the unified catalog
//! store and the service store) and exposes one method per protocol step.
//! Every non-handshake method starts by resolving the caller's `upload_uuid`
//! string into a [`UploadUuid`] and confirming the upload exists (spec §4.1
//! "unknown UUID -> `NotFound`"); batch methods never fail the whole call on
//! a single bad row, they count failures into the returned outcome (spec
//! §4.1, §7).

use std::sync::Arc;

use catalog_core::domain::CatalogItem;
use catalog_core::domain::Constant;
use catalog_core::domain::NomenclatureItem;
use catalog_core::identifiers::CatalogRowId;
use catalog_core::identifiers::ConstantId;
use catalog_core::identifiers::NomenclatureRowId;
use catalog_core::identifiers::UploadUuid;
use catalog_core::interfaces::BatchOutcome;
use catalog_core::interfaces::CatalogStore;
use catalog_core::interfaces::DatabaseFingerprint;
use catalog_core::interfaces::ServiceStore;
use catalog_core::interfaces::UploadDraft;
use catalog_core::time::Timestamp;
use time::OffsetDateTime;
use tracing::info;

use crate::error::BrokerError;
use crate::protocol::BatchResponse;
use crate::protocol::CatalogItemFields;
use crate::protocol::CatalogItemRequest;
use crate::protocol::CatalogItemsRequest;
use crate::protocol::CatalogMetaRequest;
use crate::protocol::ConstantRequest;
use crate::protocol::HandshakeRequest;
use crate::protocol::HandshakeResponse;
use crate::protocol::NomenclatureBatchRequest;
use crate::protocol::StatusResponse;

/// The Ingestion State Machine (spec §4.1).
pub struct IngestionStateMachine {
    catalog: Arc<dyn CatalogStore>,
    service: Arc<dyn ServiceStore>,
}

impl IngestionStateMachine {
    /// Builds a state machine over the given stores.
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogStore>, service: Arc<dyn ServiceStore>) -> Self {
        Self { catalog, service }
    }

    /// `POST /handshake`: allocates an upload UUID, resolving `database_id`
    /// either directly or by fuzzy match, and caches the resolved
    /// `client_id`/`project_id` onto the new upload (spec §4.1).
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Store`] on store failure.
    pub fn handshake(&self, request: HandshakeRequest) -> Result<HandshakeResponse, BrokerError> {
        let database = if let Some(id) = request.database_id {
            self.service.get_database(id.into())?
        } else {
            let fingerprint = DatabaseFingerprint {
                computer_name: request.computer_name.clone(),
                user_name: request.user_name.clone(),
                config_name: request.config_name.clone(),
                version_erp: request.version_erp.clone(),
                config_version: request.config_version.clone(),
            };
            self.service.match_database(&fingerprint)?
        };

        let draft = UploadDraft {
            version_erp: request.version_erp,
            config_name: request.config_name,
            computer_name: request.computer_name,
            user_name: request.user_name,
            config_version: request.config_version,
            iteration_number: request.iteration_number,
            iteration_label: request.iteration_label,
            programmer: request.programmer,
            purpose: request.purpose,
            parent_upload_id: request.parent_upload_id.map(Into::into),
            database_id: database.as_ref().map(|db| db.id),
            client_id: None,
            project_id: database.as_ref().map(|db| db.project_id),
        };
        let upload = self.catalog.create_upload(draft)?;
        info!(upload_uuid = %upload.uuid, matched_database = database.is_some(), "upload handshake accepted");

        let (client_name, project_name) = match database.as_ref().map(|db| db.project_id) {
            Some(project_id) => {
                let project = self.service.get_project(project_id)?;
                let client_name = match &project {
                    Some(project) => self.service.get_client(project.client_id)?.map(|c| c.name),
                    None => None,
                };
                (client_name, project.map(|p| p.name))
            }
            None => (None, None),
        };

        Ok(HandshakeResponse {
            upload_uuid: upload.uuid.to_string(),
            client_name,
            project_name,
            database_name: database.as_ref().map(|db| db.name.clone()),
            database_path: database.as_ref().map(|db| db.file_path.clone()),
            database_id: database.as_ref().map(|db| db.id.get()),
            message: "upload accepted".to_string(),
        })
    }

    /// `POST /metadata`: validates the upload exists; otherwise a no-op
    /// (spec §4.1).
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownUpload`] if the upload does not exist,
    /// [`BrokerError::Store`] on store failure.
    pub fn metadata(&self, upload_uuid: &str) -> Result<StatusResponse, BrokerError> {
        self.require_upload(upload_uuid)?;
        Ok(StatusResponse { message: "metadata accepted".to_string(), opaque_id: None })
    }

    /// `POST /constant`: appends one constant to an in-progress upload.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownUpload`] if the upload does not exist,
    /// [`BrokerError::Store`] on store failure.
    pub fn constant(&self, request: ConstantRequest) -> Result<StatusResponse, BrokerError> {
        let uuid = self.require_upload(&request.upload_uuid)?;
        let constant = Constant {
            id: ConstantId(0),
            upload_id: 0.into(),
            name: request.name,
            synonym: request.synonym,
            r#type: request.r#type,
            value: request.value,
            created_at: now(),
        };
        self.catalog.insert_constant(uuid, constant)?;
        Ok(StatusResponse { message: "constant accepted".to_string(), opaque_id: None })
    }

    /// `POST /catalog/meta`: ensures the dynamic table for `name` exists,
    /// returning its deterministic table name as the opaque catalog id
    /// (spec §4.1, §6 "compatibility" id).
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownUpload`] if the upload does not exist,
    /// [`BrokerError::Store`] on store failure.
    pub fn catalog_meta(&self, request: CatalogMetaRequest) -> Result<StatusResponse, BrokerError> {
        let uuid = self.require_upload(&request.upload_uuid)?;
        let table_name = self.catalog.ensure_catalog_table(uuid, &request.name)?;
        Ok(StatusResponse { message: "catalog registered".to_string(), opaque_id: Some(table_name) })
    }

    /// `POST /catalog/item`: appends one row to `catalog_name`'s dynamic
    /// table.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownUpload`] if the upload does not exist,
    /// [`BrokerError::Store`] on store failure.
    pub fn catalog_item(&self, request: CatalogItemRequest) -> Result<StatusResponse, BrokerError> {
        let uuid = self.require_upload(&request.upload_uuid)?;
        let table_name = self.catalog.ensure_catalog_table(uuid, &request.catalog_name)?;
        let outcome = self.catalog.insert_catalog_items(uuid, &table_name, vec![to_catalog_item(&request.item)])?;
        let message = if outcome.failed_count == 0 { "item accepted".to_string() } else { "item rejected".to_string() };
        Ok(StatusResponse { message, opaque_id: None })
    }

    /// `POST /catalog/items`: appends a batch of rows to `catalog_name`'s
    /// dynamic table; individual row failures are counted, not fatal (spec
    /// §4.1).
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownUpload`] if the upload does not exist,
    /// [`BrokerError::Store`] if the whole batch fails.
    pub fn catalog_items(&self, request: CatalogItemsRequest) -> Result<BatchResponse, BrokerError> {
        let uuid = self.require_upload(&request.upload_uuid)?;
        let table_name = self.catalog.ensure_catalog_table(uuid, &request.catalog_name)?;
        let items = request.items.iter().map(to_catalog_item).collect();
        let outcome = self.catalog.insert_catalog_items(uuid, &table_name, items)?;
        Ok(to_batch_response(outcome))
    }

    /// `POST /nomenclature/batch`: appends a batch of nomenclature items,
    /// each an optional base+characteristic pair (spec §3, §6).
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownUpload`] if the upload does not exist,
    /// [`BrokerError::Store`] if the whole batch fails.
    pub fn nomenclature_batch(&self, request: NomenclatureBatchRequest) -> Result<BatchResponse, BrokerError> {
        let uuid = self.require_upload(&request.upload_uuid)?;
        let items = request
            .items
            .into_iter()
            .map(|fields| NomenclatureItem {
                id: NomenclatureRowId(0),
                upload_id: 0.into(),
                nomenclature_reference: fields.nomenclature_reference,
                nomenclature_code: fields.nomenclature_code,
                nomenclature_name: fields.nomenclature_name,
                characteristic_reference: fields.characteristic_reference,
                characteristic_name: fields.characteristic_name,
                attributes_payload: fields.attributes_xml,
                table_parts_payload: fields.table_parts_xml,
            })
            .collect();
        let outcome = self.catalog.insert_nomenclature_items(uuid, items)?;
        Ok(to_batch_response(outcome))
    }

    /// `POST /complete`: finalizes the upload. Idempotent: completing an
    /// already-completed upload succeeds without changing counters (spec
    /// §4.1, §8.9). Returns the finalized upload so the caller (the control
    /// plane) can trigger quality analysis without a second lookup.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownUpload`] if the upload does not exist,
    /// [`BrokerError::Store`] on store failure.
    pub fn complete(&self, upload_uuid: &str) -> Result<(StatusResponse, UploadUuid), BrokerError> {
        let uuid = self.require_upload(upload_uuid)?;
        self.catalog.complete_upload(uuid)?;
        info!(upload_uuid = %uuid, "upload completed");
        Ok((StatusResponse { message: "upload completed".to_string(), opaque_id: None }, uuid))
    }

    /// Parses `upload_uuid` and confirms it resolves to an existing upload.
    fn require_upload(&self, upload_uuid: &str) -> Result<UploadUuid, BrokerError> {
        let uuid = UploadUuid::parse(upload_uuid).map_err(|_| BrokerError::UnknownUpload(upload_uuid.to_string()))?;
        match self.catalog.get_upload(uuid)? {
            Some(_) => Ok(uuid),
            None => Err(BrokerError::UnknownUpload(upload_uuid.to_string())),
        }
    }
}

fn to_catalog_item(fields: &CatalogItemFields) -> CatalogItem {
    CatalogItem {
        id: CatalogRowId(0),
        upload_id: 0.into(),
        table_name: String::new(),
        reference: fields.reference.clone(),
        code: fields.code.clone(),
        name: fields.name.clone(),
        attributes_payload: fields.attributes_xml.clone(),
        table_parts_payload: fields.table_parts_xml.clone(),
        created_at: now(),
    }
}

fn to_batch_response(outcome: BatchOutcome) -> BatchResponse {
    BatchResponse { processed_count: outcome.processed_count, failed_count: outcome.failed_count }
}

fn now() -> Timestamp {
    Timestamp::from_offset_date_time(OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use catalog_core::CoreError;
    use catalog_core::domain::Client;
    use catalog_core::domain::ClassifierNode;
    use catalog_core::domain::ClientBenchmark;
    use catalog_core::domain::Project;
    use catalog_core::domain::ProjectDatabase;
    use catalog_core::domain::Snapshot;
    use catalog_core::domain::Upload;
    use catalog_core::domain::UploadCounters;
    use catalog_core::domain::UploadStatus;
    use catalog_core::identifiers::ClientId;
    use catalog_core::identifiers::IcCode;
    use catalog_core::identifiers::ProjectDatabaseId;
    use catalog_core::identifiers::ProjectId;
    use catalog_core::identifiers::UploadRowId;
    use catalog_core::interfaces::IcPendingGroup;
    use catalog_core::interfaces::SourceRow;
    use catalog_core::interfaces::UploadRowCounts;

    use super::*;

    #[derive(Default)]
    struct FakeCatalogStore {
        uploads: Mutex<HashMap<String, Upload>>,
        tables: Mutex<HashMap<String, String>>,
    }

    impl CatalogStore for FakeCatalogStore {
        fn create_upload(&self, draft: UploadDraft) -> Result<Upload, CoreError> {
            let uuid = UploadUuid::new_v4();
            let upload = Upload {
                id: UploadRowId(1),
                uuid,
                started_at: now(),
                completed_at: None,
                status: UploadStatus::InProgress,
                version_erp: draft.version_erp,
                config_name: draft.config_name,
                iteration_number: draft.iteration_number,
                iteration_label: draft.iteration_label,
                programmer: draft.programmer,
                purpose: draft.purpose,
                parent_upload_id: draft.parent_upload_id,
                database_id: draft.database_id,
                client_id: draft.client_id,
                project_id: draft.project_id,
                computer_name: draft.computer_name,
                user_name: draft.user_name,
                config_version: draft.config_version,
                counters: UploadCounters::default(),
            };
            self.uploads.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(uuid.to_string(), upload.clone());
            Ok(upload)
        }

        fn get_upload(&self, uuid: UploadUuid) -> Result<Option<Upload>, CoreError> {
            Ok(self.uploads.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get(&uuid.to_string()).cloned())
        }

        fn complete_upload(&self, uuid: UploadUuid) -> Result<Upload, CoreError> {
            let mut guard = self.uploads.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let upload = guard.get_mut(&uuid.to_string()).ok_or_else(|| CoreError::NotFound(uuid.to_string()))?;
            upload.status = UploadStatus::Completed;
            upload.completed_at = Some(now());
            Ok(upload.clone())
        }

        fn insert_constant(&self, upload: UploadUuid, _constant: Constant) -> Result<(), CoreError> {
            self.get_upload(upload)?.ok_or_else(|| CoreError::NotFound(upload.to_string()))?;
            Ok(())
        }

        fn ensure_catalog_table(&self, upload: UploadUuid, catalog_name: &str) -> Result<String, CoreError> {
            self.get_upload(upload)?.ok_or_else(|| CoreError::NotFound(upload.to_string()))?;
            let mut tables = self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            Ok(tables.entry(catalog_name.to_string()).or_insert_with(|| catalog_core::hashing::catalog_table_name(catalog_name)).clone())
        }

        fn insert_catalog_items(&self, upload: UploadUuid, _table_name: &str, items: Vec<CatalogItem>) -> Result<BatchOutcome, CoreError> {
            self.get_upload(upload)?.ok_or_else(|| CoreError::NotFound(upload.to_string()))?;
            Ok(BatchOutcome { processed_count: items.len() as u64, failed_count: 0 })
        }

        fn insert_nomenclature_items(&self, upload: UploadUuid, items: Vec<NomenclatureItem>) -> Result<BatchOutcome, CoreError> {
            self.get_upload(upload)?.ok_or_else(|| CoreError::NotFound(upload.to_string()))?;
            Ok(BatchOutcome { processed_count: items.len() as u64, failed_count: 0 })
        }

        fn read_source_rows(&self, _table_name: &str) -> Result<Vec<SourceRow>, CoreError> {
            Ok(Vec::new())
        }

        fn insert_normalized_rows(&self, _rows: Vec<catalog_core::domain::NormalizedData>, _attributes: Vec<catalog_core::domain::ItemAttribute>) -> Result<(), CoreError> {
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
            Ok(UploadRowCounts::default())
        }

        fn record_quality_metric(&self, _upload: UploadUuid, _metric_name: &str, _metric_value: f64) -> Result<(), CoreError> {
            Ok(())
        }

        fn record_quality_issue(&self, _upload: UploadUuid, _severity: &str, _description: &str, _sample_reference: Option<&str>) -> Result<(), CoreError> {
            Ok(())
        }

        fn save_job_checkpoint(&self, _job_kind: &str, _cursor_payload: &str) -> Result<(), CoreError> {
            Ok(())
        }

        fn load_job_checkpoint(&self, _job_kind: &str) -> Result<Option<catalog_core::interfaces::JobCheckpoint>, CoreError> {
            Ok(None)
        }
    }

    struct FakeServiceStore;

    impl ServiceStore for FakeServiceStore {
        fn get_database(&self, _id: ProjectDatabaseId) -> Result<Option<ProjectDatabase>, CoreError> {
            Ok(None)
        }

        fn match_database(&self, _fingerprint: &DatabaseFingerprint) -> Result<Option<ProjectDatabase>, CoreError> {
            Ok(None)
        }

        fn load_classifier_tree(&self) -> Result<Vec<ClassifierNode>, CoreError> {
            Ok(Vec::new())
        }

        fn lookup_benchmark(&self, _client_id: ClientId, _normalized_source_name: &str) -> Result<Option<ClientBenchmark>, CoreError> {
            Ok(None)
        }

        fn record_benchmark_usage(&self, _benchmark_id: i64) -> Result<(), CoreError> {
            Ok(())
        }

        fn get_client(&self, _id: ClientId) -> Result<Option<Client>, CoreError> {
            Ok(None)
        }

        fn get_project(&self, _id: ProjectId) -> Result<Option<Project>, CoreError> {
            Ok(None)
        }
    }

    fn sample_ism() -> IngestionStateMachine {
        IngestionStateMachine::new(Arc::new(FakeCatalogStore::default()), Arc::new(FakeServiceStore))
    }

    fn sample_handshake() -> HandshakeRequest {
        HandshakeRequest {
            version_erp: "8.3".to_string(),
            config_name: "Trade".to_string(),
            database_id: None,
            computer_name: "WS-1".to_string(),
            user_name: "erp".to_string(),
            config_version: "2.1".to_string(),
            iteration_number: 1,
            iteration_label: "initial".to_string(),
            programmer: "ivanov".to_string(),
            purpose: "sync".to_string(),
            parent_upload_id: None,
        }
    }

    #[test]
    fn handshake_mints_a_parseable_uuid() {
        let ism = sample_ism();
        let response = ism.handshake(sample_handshake()).expect("handshake");
        assert!(UploadUuid::parse(&response.upload_uuid).is_ok());
        assert!(response.client_name.is_none());
    }

    #[test]
    fn unknown_upload_is_rejected_by_every_non_handshake_call() {
        let ism = sample_ism();
        let err = ism.metadata("00000000-0000-0000-0000-000000000000").unwrap_err();
        assert_eq!(err.error_code(), "not_found");
    }

    #[test]
    fn complete_is_idempotent() {
        let ism = sample_ism();
        let handshake = ism.handshake(sample_handshake()).expect("handshake");
        let (first, uuid) = ism.complete(&handshake.upload_uuid).expect("complete");
        let (second, _) = ism.complete(&handshake.upload_uuid).expect("complete again");
        assert_eq!(first.message, second.message);
        assert!(UploadUuid::parse(&handshake.upload_uuid).expect("uuid") == uuid);
    }

    #[test]
    fn catalog_items_batch_reports_processed_count() {
        let ism = sample_ism();
        let handshake = ism.handshake(sample_handshake()).expect("handshake");
        let request = CatalogItemsRequest {
            upload_uuid: handshake.upload_uuid,
            catalog_name: "Goods".to_string(),
            items: vec![
                CatalogItemFields { reference: "r1".into(), code: "c1".into(), name: "n1".into(), attributes_xml: String::new(), table_parts_xml: String::new() },
                CatalogItemFields { reference: "r2".into(), code: "c2".into(), name: "n2".into(), attributes_xml: String::new(), table_parts_xml: String::new() },
            ],
        };
        let response = ism.catalog_items(request).expect("batch insert");
        assert_eq!(response.processed_count, 2);
        assert_eq!(response.failed_count, 0);
    }
}
