//! SOAP 1.2 envelope parsing.
//!
//! Uses quick-xml which is safe against XXE by default (doesn't expand
//! entities).

use crate::error::GatewayError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;

/// SOAP 1.2 envelope namespace URI.
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
/// SOAP 1.1 envelope namespace URI, recognized only to reject it clearly.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// WS-Security extension namespace URI.
pub const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

/// Parsed SOAP 1.2 envelope.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    /// SOAP Header (if present)
    pub header: Option<SoapHeader>,
    /// SOAP Body
    pub body: SoapBody,
}

/// Parsed SOAP Header.
#[derive(Debug, Clone, Default)]
pub struct SoapHeader {
    /// Direct child elements of the header block
    pub elements: Vec<HeaderElement>,
}

/// A top-level header element.
#[derive(Debug, Clone)]
pub struct HeaderElement {
    /// Element local name
    pub local_name: String,
    /// Element namespace URI, when declared on the element itself
    pub namespace: Option<String>,
}

/// Parsed SOAP Body.
#[derive(Debug, Clone, Default)]
pub struct SoapBody {
    /// Raw XML of the first body child, exactly as it appeared on the wire
    pub payload: Option<String>,
    /// Local name of the first body child
    pub operation: Option<String>,
}

impl SoapEnvelope {
    /// True iff some top-level header element has the local name `Security`.
    ///
    /// The match is case-sensitive and deliberately ignores the namespace:
    /// inbound gateways in the field carry the WS-Security header under
    /// several namespace conventions. A match outside the WSSE namespace is
    /// logged so deployments can observe the leniency.
    pub fn has_security_header(&self) -> bool {
        let Some(header) = &self.header else {
            return false;
        };
        for elem in &header.elements {
            if elem.local_name == "Security" {
                if elem.namespace.as_deref() != Some(WSSE_NS) {
                    warn!(
                        namespace = ?elem.namespace,
                        "Security header matched outside the WSSE namespace"
                    );
                }
                return true;
            }
        }
        false
    }
}

/// Parse text as a SOAP 1.2 envelope.
///
/// Any failure (invalid XML, a non-envelope root, a SOAP 1.1 namespace)
/// is a [`GatewayError::MalformedRequest`]; no partial envelope is returned.
pub fn parse_envelope(xml: &str) -> Result<SoapEnvelope, GatewayError> {
    check_entity_declarations(xml)?;

    let mut reader = Reader::from_str(xml);

    let mut depth = 0u32;
    let mut saw_envelope = false;
    let mut in_header = false;
    let mut in_body = false;

    let mut header: Option<SoapHeader> = None;
    let mut current_header = SoapHeader::default();
    let mut body = SoapBody::default();

    let mut payload_start: Option<usize> = None;
    let mut payload_depth = 0u32;

    loop {
        let event_start = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                depth += 1;
                let local_name = local_name_str(e);

                if depth == 1 {
                    check_envelope_root(&local_name, declared_namespace(e))?;
                    saw_envelope = true;
                } else if depth == 2 && local_name == "Header" {
                    in_header = true;
                } else if depth == 2 && local_name == "Body" {
                    in_body = true;
                } else if in_header && depth == 3 {
                    current_header.elements.push(HeaderElement {
                        local_name,
                        namespace: declared_namespace(e),
                    });
                } else if in_body
                    && depth == 3
                    && payload_start.is_none()
                    && body.payload.is_none()
                {
                    payload_start = Some(event_start);
                    payload_depth = depth;
                    body.operation = Some(local_name);
                }
            }

            Ok(Event::Empty(ref e)) => {
                let local_name = local_name_str(e);

                if depth == 0 {
                    check_envelope_root(&local_name, declared_namespace(e))?;
                    return Err(GatewayError::MalformedRequest(
                        "SOAP envelope has no body".to_string(),
                    ));
                } else if depth == 1 && local_name == "Header" {
                    header = Some(SoapHeader::default());
                } else if in_header && depth == 2 {
                    current_header.elements.push(HeaderElement {
                        local_name,
                        namespace: declared_namespace(e),
                    });
                } else if in_body && depth == 2 && body.payload.is_none() {
                    body.payload = Some(xml[event_start..reader.buffer_position()].to_string());
                    body.operation = Some(local_name);
                }
            }

            Ok(Event::End(_)) => {
                if let Some(start) = payload_start {
                    if depth == payload_depth {
                        body.payload = Some(xml[start..reader.buffer_position()].to_string());
                        payload_start = None;
                    }
                }
                depth = depth.saturating_sub(1);
                if in_header && depth == 1 {
                    in_header = false;
                    header = Some(std::mem::take(&mut current_header));
                }
                if in_body && depth == 1 {
                    in_body = false;
                }
            }

            Ok(Event::Eof) => break,

            Err(e) => {
                return Err(GatewayError::MalformedRequest(format!(
                    "XML parse error: {e}"
                )));
            }

            _ => {}
        }
    }

    if !saw_envelope {
        return Err(GatewayError::MalformedRequest(
            "no SOAP envelope found".to_string(),
        ));
    }

    Ok(SoapEnvelope { header, body })
}

fn check_envelope_root(
    local_name: &str,
    namespace: Option<String>,
) -> Result<(), GatewayError> {
    if local_name != "Envelope" {
        return Err(GatewayError::MalformedRequest(format!(
            "root element is {local_name}, not a SOAP Envelope"
        )));
    }
    match namespace.as_deref() {
        Some(SOAP_12_NS) => Ok(()),
        Some(SOAP_11_NS) => Err(GatewayError::MalformedRequest(
            "SOAP 1.1 envelope received; SOAP 1.2 is required".to_string(),
        )),
        other => Err(GatewayError::MalformedRequest(format!(
            "envelope namespace {other:?} is not SOAP 1.2"
        ))),
    }
}

/// Reject DOCTYPE and entity declarations up front. quick-xml does not
/// expand entities, so this only turns a silent no-op into a loud failure.
fn check_entity_declarations(xml: &str) -> Result<(), GatewayError> {
    let lowered = xml.to_ascii_lowercase();
    if lowered.contains("<!doctype") || lowered.contains("<!entity") {
        return Err(GatewayError::MalformedRequest(
            "DOCTYPE and entity declarations are not allowed".to_string(),
        ));
    }
    Ok(())
}

/// Extract local name from element.
fn local_name_str(e: &BytesStart) -> String {
    let name = e.local_name();
    std::str::from_utf8(name.as_ref()).unwrap_or("").to_string()
}

/// Namespace URI declared on the element itself, matching the element's own
/// prefix (or the default declaration for an unprefixed element). Prefixes
/// declared on an ancestor are not resolved.
fn declared_namespace(e: &BytesStart) -> Option<String> {
    let name_bytes = e.name();
    let name = std::str::from_utf8(name_bytes.as_ref()).unwrap_or("");
    let wanted = match name.split_once(':') {
        Some((prefix, _)) => format!("xmlns:{prefix}"),
        None => "xmlns".to_string(),
    };

    for attr in e.attributes().flatten() {
        let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
        if key == wanted {
            return std::str::from_utf8(&attr.value).ok().map(String::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOAP_12_WITH_SECURITY: &str = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Header>
    <wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">
      <wsse:BinarySecurityToken>abc</wsse:BinarySecurityToken>
    </wsse:Security>
  </soap:Header>
  <soap:Body>
    <q:AdhocQueryRequest xmlns:q="urn:oasis:names:tc:ebxml-regrep:xsd:query:3.0">
      <q:ResponseOption returnType="LeafClass"/>
    </q:AdhocQueryRequest>
  </soap:Body>
</soap:Envelope>"#;

    #[test]
    fn test_parse_soap_12_envelope() {
        let envelope = parse_envelope(SOAP_12_WITH_SECURITY).unwrap();
        assert!(envelope.header.is_some());
        assert_eq!(
            envelope.body.operation,
            Some("AdhocQueryRequest".to_string())
        );
        let payload = envelope.body.payload.unwrap();
        assert!(payload.starts_with("<q:AdhocQueryRequest"));
        assert!(payload.ends_with("</q:AdhocQueryRequest>"));
    }

    #[test]
    fn test_security_header_detected() {
        let envelope = parse_envelope(SOAP_12_WITH_SECURITY).unwrap();
        assert!(envelope.has_security_header());
    }

    #[test]
    fn test_security_header_matched_in_any_namespace() {
        let xml = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Header>
    <x:Security xmlns:x="http://example.org/custom-security">tok</x:Security>
  </soap:Header>
  <soap:Body>
    <Ping xmlns="http://example.org/ping"/>
  </soap:Body>
</soap:Envelope>"#;
        let envelope = parse_envelope(xml).unwrap();
        assert!(envelope.has_security_header());
    }

    #[test]
    fn test_security_match_is_case_sensitive() {
        let xml = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Header>
    <x:security xmlns:x="http://example.org/custom-security">tok</x:security>
  </soap:Header>
  <soap:Body>
    <Ping xmlns="http://example.org/ping"/>
  </soap:Body>
</soap:Envelope>"#;
        let envelope = parse_envelope(xml).unwrap();
        assert!(!envelope.has_security_header());
    }

    #[test]
    fn test_no_header_block_means_no_security() {
        let xml = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <Ping xmlns="http://example.org/ping"/>
  </soap:Body>
</soap:Envelope>"#;
        let envelope = parse_envelope(xml).unwrap();
        assert!(envelope.header.is_none());
        assert!(!envelope.has_security_header());
    }

    #[test]
    fn test_nested_security_is_not_a_header_element() {
        // Only direct children of the header block count.
        let xml = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Header>
    <Wrapper>
      <Security>tok</Security>
    </Wrapper>
  </soap:Header>
  <soap:Body>
    <Ping xmlns="http://example.org/ping"/>
  </soap:Body>
</soap:Envelope>"#;
        let envelope = parse_envelope(xml).unwrap();
        assert!(!envelope.has_security_header());
    }

    #[test]
    fn test_soap_11_envelope_rejected() {
        let xml = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <Ping xmlns="http://example.org/ping"/>
  </soap:Body>
</soap:Envelope>"#;
        let err = parse_envelope(xml).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedRequest(_)));
        assert!(err.to_string().contains("SOAP 1.1"));
    }

    #[test]
    fn test_non_envelope_root_rejected() {
        let err = parse_envelope("<NotSoap/>").unwrap_err();
        assert!(matches!(err, GatewayError::MalformedRequest(_)));
    }

    #[test]
    fn test_invalid_xml_rejected() {
        let err = parse_envelope("this is not xml <<<").unwrap_err();
        assert!(matches!(err, GatewayError::MalformedRequest(_)));
    }

    #[test]
    fn test_doctype_rejected() {
        let xml = r#"<?xml version="1.0"?>
<!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>&xxe;</soap:Body>
</soap:Envelope>"#;
        let err = parse_envelope(xml).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedRequest(_)));
    }

    #[test]
    fn test_empty_body_has_no_payload() {
        let xml = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body/>
</soap:Envelope>"#;
        let envelope = parse_envelope(xml).unwrap();
        assert!(envelope.body.payload.is_none());
    }

    #[test]
    fn test_self_closing_payload_captured() {
        let xml = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <Ping xmlns="http://example.org/ping"/>
  </soap:Body>
</soap:Envelope>"#;
        let envelope = parse_envelope(xml).unwrap();
        assert_eq!(
            envelope.body.payload.as_deref(),
            Some(r#"<Ping xmlns="http://example.org/ping"/>"#)
        );
    }

    #[test]
    fn test_only_first_body_child_is_the_payload() {
        let xml = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <First xmlns="http://example.org/a"><Inner>1</Inner></First>
    <Second xmlns="http://example.org/b"/>
  </soap:Body>
</soap:Envelope>"#;
        let envelope = parse_envelope(xml).unwrap();
        assert_eq!(envelope.body.operation, Some("First".to_string()));
        let payload = envelope.body.payload.unwrap();
        assert!(payload.starts_with("<First"));
        assert!(payload.ends_with("</First>"));
        assert!(!payload.contains("Second"));
    }

    #[test]
    fn test_payload_preserves_nested_content() {
        let envelope = parse_envelope(SOAP_12_WITH_SECURITY).unwrap();
        let payload = envelope.body.payload.unwrap();
        assert!(payload.contains(r#"<q:ResponseOption returnType="LeafClass"/>"#));
    }
}
