// crates/catalog-service/src/erp.rs
// ============================================================================
// Module: ERP Ingestion Handlers
// Description: The eight XML producer-protocol endpoints (spec §6 Producer
// protocol).
// Purpose: Parse each request body with `catalog_broker::protocol`, delegate
// to `IngestionStateMachine`, and render the XML success/error envelope;
// `/complete` additionally fires the quality analyzer (SPEC_FULL §2).
// Dependencies: axum, catalog-broker, time, tracing
// ============================================================================

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use catalog_broker::protocol;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

use crate::state::AppState;

/// Renders the current time in the RFC 3339 form every envelope's
/// `timestamp` field uses (spec §6).
fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Turns a [`catalog_broker::BrokerError`] into the XML error envelope
/// (spec §6 "error envelope on failure").
fn error_response(error: &catalog_broker::BrokerError) -> Response {
    let body = protocol::error_envelope(error.error_code(), &error.to_string(), &now_rfc3339());
    (StatusCode::OK, [("content-type", "application/xml")], body).into_response()
}

/// Wraps a rendered success envelope as an XML response.
fn xml_response(body: String) -> Response {
    (StatusCode::OK, [("content-type", "application/xml")], body).into_response()
}

/// `POST /handshake`.
pub async fn handshake(State(state): State<Arc<AppState>>, body: String) -> Response {
    let request = match protocol::HandshakeRequest::from_xml(&body) {
        Ok(request) => request,
        Err(error) => return error_response(&error),
    };
    match state.ism.handshake(request) {
        Ok(response) => xml_response(response.to_xml(&now_rfc3339())),
        Err(error) => error_response(&error),
    }
}

/// `POST /metadata`.
pub async fn metadata(State(state): State<Arc<AppState>>, body: String) -> Response {
    let upload_uuid = match protocol::read_upload_uuid(&body) {
        Ok(value) => value,
        Err(error) => return error_response(&error),
    };
    match state.ism.metadata(&upload_uuid) {
        Ok(response) => xml_response(response.to_xml(&now_rfc3339())),
        Err(error) => error_response(&error),
    }
}

/// `POST /constant`.
pub async fn constant(State(state): State<Arc<AppState>>, body: String) -> Response {
    let request = match protocol::ConstantRequest::from_xml(&body) {
        Ok(request) => request,
        Err(error) => return error_response(&error),
    };
    match state.ism.constant(request) {
        Ok(response) => xml_response(response.to_xml(&now_rfc3339())),
        Err(error) => error_response(&error),
    }
}

/// `POST /catalog/meta`.
pub async fn catalog_meta(State(state): State<Arc<AppState>>, body: String) -> Response {
    let request = match protocol::CatalogMetaRequest::from_xml(&body) {
        Ok(request) => request,
        Err(error) => return error_response(&error),
    };
    match state.ism.catalog_meta(request) {
        Ok(response) => xml_response(response.to_xml(&now_rfc3339())),
        Err(error) => error_response(&error),
    }
}

/// `POST /catalog/item`.
pub async fn catalog_item(State(state): State<Arc<AppState>>, body: String) -> Response {
    let request = match protocol::CatalogItemRequest::from_xml(&body) {
        Ok(request) => request,
        Err(error) => return error_response(&error),
    };
    match state.ism.catalog_item(request) {
        Ok(response) => xml_response(response.to_xml(&now_rfc3339())),
        Err(error) => error_response(&error),
    }
}

/// `POST /catalog/items`.
pub async fn catalog_items(State(state): State<Arc<AppState>>, body: String) -> Response {
    let request = match protocol::CatalogItemsRequest::from_xml(&body) {
        Ok(request) => request,
        Err(error) => return error_response(&error),
    };
    match state.ism.catalog_items(request) {
        Ok(response) => xml_response(response.to_xml(&now_rfc3339())),
        Err(error) => error_response(&error),
    }
}

/// `POST /nomenclature/batch`.
pub async fn nomenclature_batch(State(state): State<Arc<AppState>>, body: String) -> Response {
    let request = match protocol::NomenclatureBatchRequest::from_xml(&body) {
        Ok(request) => request,
        Err(error) => return error_response(&error),
    };
    match state.ism.nomenclature_batch(request) {
        Ok(response) => xml_response(response.to_xml(&now_rfc3339())),
        Err(error) => error_response(&error),
    }
}

/// `POST /complete`. On success, runs the quality analyzer synchronously in
/// a blocking task before replying, so a producer that waits for the
/// response already sees quality issues recorded (SPEC_FULL §2 "started
/// automatically rather than via an operator-facing start endpoint").
pub async fn complete(State(state): State<Arc<AppState>>, body: String) -> Response {
    let upload_uuid = match protocol::read_upload_uuid(&body) {
        Ok(value) => value,
        Err(error) => return error_response(&error),
    };
    let (response, uuid) = match state.ism.complete(&upload_uuid) {
        Ok(outcome) => outcome,
        Err(error) => return error_response(&error),
    };

    let quality = Arc::clone(&state.quality);
    let analyzed = tokio::task::spawn_blocking(move || quality.analyze(uuid)).await;
    match analyzed {
        Ok(Ok(report)) if report.has_mismatch() => {
            warn!(upload_uuid = %uuid, "quality analysis recorded a counter mismatch after complete");
        }
        Ok(Err(error)) => warn!(upload_uuid = %uuid, %error, "quality analysis failed after complete"),
        Err(join_error) => warn!(upload_uuid = %uuid, %join_error, "quality analysis task panicked after complete"),
        Ok(Ok(_)) => {}
    }

    xml_response(response.to_xml(&now_rfc3339()))
}
