//! Inbound request gating.
//!
//! Per-call pipeline: parse the payload as a SOAP 1.2 envelope, require a
//! `Security` header element, then bind the body payload to the requested
//! shape. Each call is independent and stateless; nothing is retried and
//! nothing is cached. Rejections are typed errors; answering them with a
//! fault envelope is a separate step (see [`crate::error::security_header_fault`]).

use crate::config::GateConfig;
use crate::error::GatewayError;
use crate::requests::{
    self, DocumentQueryRequest, DocumentRetrieveRequest, PatientDiscoveryRequest, RequestShape,
    TypedRequest,
};
use crate::soap;
use tracing::{debug, warn};

/// Gates inbound SOAP requests.
///
/// Create one at process start and share it by reference across calls.
#[derive(Debug, Clone, Default)]
pub struct RequestGate {
    config: GateConfig,
}

impl RequestGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Parse a SOAP-framed payload into the requested shape.
    ///
    /// Fails with [`GatewayError::MissingSecurityHeader`] before any body
    /// binding is attempted when the header block carries no `Security`
    /// element, and with [`GatewayError::MalformedRequest`] when the
    /// envelope or body cannot be bound.
    pub fn parse(&self, payload: &str, shape: RequestShape) -> Result<TypedRequest, GatewayError> {
        let body = self.gated_body(payload)?;
        debug!(shape = ?shape, "binding SOAP body payload");
        requests::bind(&body, shape)
    }

    /// Parse a payload declared to be an XCPD patient discovery request.
    pub fn patient_discovery(&self, payload: &str) -> Result<PatientDiscoveryRequest, GatewayError> {
        let body = self.gated_body(payload)?;
        requests::bind_patient_discovery(&body)
    }

    /// Parse a payload declared to be an XDS ad-hoc document query.
    pub fn document_query(&self, payload: &str) -> Result<DocumentQueryRequest, GatewayError> {
        let body = self.gated_body(payload)?;
        requests::bind_document_query(&body)
    }

    /// Parse a payload declared to be an XDS document-set retrieve request.
    pub fn document_retrieve(
        &self,
        payload: &str,
    ) -> Result<DocumentRetrieveRequest, GatewayError> {
        let body = self.gated_body(payload)?;
        requests::bind_document_retrieve(&body)
    }

    /// Run the envelope and security-header checks, returning the body
    /// payload to bind.
    fn gated_body(&self, payload: &str) -> Result<String, GatewayError> {
        if payload.len() > self.config.max_payload_size {
            warn!(
                size = payload.len(),
                max = self.config.max_payload_size,
                "rejecting oversized inbound payload"
            );
            return Err(GatewayError::PayloadTooLarge(payload.len()));
        }

        let envelope = soap::parse_envelope(payload)?;
        if !envelope.has_security_header() {
            warn!("SOAP message does not have a Security header");
            return Err(GatewayError::MissingSecurityHeader);
        }

        envelope.body.payload.ok_or_else(|| {
            GatewayError::MalformedRequest("SOAP body carries no payload".to_string())
        })
    }
}
