// crates/catalog-broker/src/error.rs
// ============================================================================
// Module: Broker Errors
// Description: The Ingestion State Machine's failure taxonomy (spec §4.1,
// §6, §7).
// Purpose: Give every ISM handler one error type the control plane maps to
// the XML error envelope `{success:false, error, message, timestamp}`.
// Dependencies: thiserror, catalog-core
// ============================================================================

use catalog_core::CoreError;
use thiserror::Error;

/// Errors surfaced by the Ingestion State Machine.
///
/// # Invariants
/// - [`BrokerError::error_code`] is stable for programmatic handling by the
///   producer.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The request body could not be parsed as well-formed XML.
    #[error("malformed xml: {0}")]
    XmlParse(String),

    /// A required protocol field was missing or empty.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// The upload UUID carried by the request is not known to the store
    /// (spec §4.1 "every non-handshake call must carry a known upload
    /// UUID").
    #[error("unknown upload uuid: {0}")]
    UnknownUpload(String),

    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] CoreError),
}

impl BrokerError {
    /// Short machine-readable error code for the XML error envelope (spec
    /// §6).
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::XmlParse(_) | Self::MissingField(_) => "bad_request",
            Self::UnknownUpload(_) => "not_found",
            Self::Store(err) => err.kind(),
        }
    }
}

impl From<quick_xml::Error> for BrokerError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(BrokerError::XmlParse("x".into()).error_code(), "bad_request");
        assert_eq!(BrokerError::MissingField("x".into()).error_code(), "bad_request");
        assert_eq!(BrokerError::UnknownUpload("x".into()).error_code(), "not_found");
        assert_eq!(BrokerError::Store(CoreError::Internal("x".into())).error_code(), "internal");
    }
}
