//! Error types and SOAP fault generation.

use thiserror::Error;

/// Reason text for the fault returned when an inbound message carries no
/// WS-Security header.
pub const MISSING_SECURITY_HEADER_REASON: &str =
    "There was no SAML security header in the SOAP message.";

/// Errors surfaced by assertion construction and inbound request gating.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The assertion document could not be produced. No partial document is
    /// ever returned alongside this error.
    #[error("failed to construct assertion document: {0}")]
    Construction(String),

    /// The inbound SOAP message carries no header element named `Security`.
    #[error("no Security header present in the SOAP message")]
    MissingSecurityHeader,

    /// The inbound payload is not a well-formed SOAP 1.2 message, or its body
    /// does not bind to the requested shape.
    #[error("malformed request payload: {0}")]
    MalformedRequest(String),

    /// The inbound payload exceeds the configured size ceiling.
    #[error("request payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Key or certificate material could not be decoded.
    #[error("key material error: {0}")]
    KeyMaterial(String),

    /// Producing the assertion signature failed.
    #[error("signing error: {0}")]
    Signing(String),

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build a standalone SOAP 1.2 fault envelope with a sender fault code.
///
/// This is a separate primitive from the parse pipeline: rejecting a request
/// and answering it with a fault are two distinct steps, and the caller
/// decides whether and when to emit the fault.
pub fn sender_fault_response(reason: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <soap:Fault>
      <soap:Code>
        <soap:Value>soap:Sender</soap:Value>
      </soap:Code>
      <soap:Reason>
        <soap:Text xml:lang="en">{}</soap:Text>
      </soap:Reason>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
        xml_escape(reason)
    )
}

/// Fault envelope for a message rejected for lacking a WS-Security header.
pub fn security_header_fault() -> String {
    sender_fault_response(MISSING_SECURITY_HEADER_REASON)
}

pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
