// crates/catalog-service/src/error.rs
// ============================================================================
// Module: Service Errors
// Description: Maps every crate's error taxonomy onto HTTP status codes and
// a JSON error body for the control-plane API (spec §7; SPEC_FULL §1 error
// handling).
// Purpose: One `IntoResponse` impl so handlers can return `Result<T,
// ServiceError>` and get consistent status/body mapping for free.
// Dependencies: axum, catalog-core, catalog-classify, serde, thiserror
// ============================================================================

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use catalog_classify::ClassifyError;
use catalog_core::CoreError;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by control-plane HTTP handlers.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A job of the requested kind is already running (spec §4.11).
    #[error("a job of this kind is already running")]
    JobAlreadyRunning,

    /// The underlying store or domain layer failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The classifier refused to start or a group failed.
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// The ingestion broker rejected a request.
    #[error(transparent)]
    Broker(#[from] catalog_broker::BrokerError),
}

impl ServiceError {
    /// Maps this error to the stable machine-readable kind used in both the
    /// JSON error body and log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JobAlreadyRunning => "conflict",
            Self::Core(err) => err.kind(),
            Self::Classify(ClassifyError::Precondition(_)) => "validation",
            Self::Classify(ClassifyError::Store(err)) => err.kind(),
            Self::Broker(err) => err.error_code(),
        }
    }

    /// Maps this error to the HTTP status the control plane returns.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.kind() {
            "validation" | "bad_request" => StatusCode::BAD_REQUEST,
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" => StatusCode::CONFLICT,
            "unavailable" | "busy" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON shape returned on every control-plane error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Stable machine-readable error kind.
    error: &'static str,
    /// Human-readable message.
    message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody { error: self.kind(), message: self.to_string() };
        (status, Json(body)).into_response()
    }
}
