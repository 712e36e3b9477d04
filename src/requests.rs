//! Typed inbound request shapes and their binders.
//!
//! Three payload shapes are recognized: XCPD patient discovery
//! (`PRPA_IN201305UV02`), XDS ad-hoc document query (`AdhocQueryRequest`),
//! and XDS document-set retrieve (`RetrieveDocumentSetRequest`). Binding
//! matches on local element names, so payloads remain valid under any
//! namespace prefix convention. A payload whose root does not match the
//! requested shape, or that is not well-formed XML, is a malformed request;
//! no partially bound object is ever returned.

use crate::error::GatewayError;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Reader;

/// Which of the three recognized payload shapes a caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    PatientDiscovery,
    DocumentQuery,
    DocumentRetrieve,
}

impl RequestShape {
    /// Local name of the payload root element for this shape.
    pub fn root_element(&self) -> &'static str {
        match self {
            Self::PatientDiscovery => "PRPA_IN201305UV02",
            Self::DocumentQuery => "AdhocQueryRequest",
            Self::DocumentRetrieve => "RetrieveDocumentSetRequest",
        }
    }
}

/// A successfully bound inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedRequest {
    PatientDiscovery(PatientDiscoveryRequest),
    DocumentQuery(DocumentQueryRequest),
    DocumentRetrieve(DocumentRetrieveRequest),
}

/// HL7 v3 instance identifier (`root`/`extension` attribute pair).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceIdentifier {
    pub root: Option<String>,
    pub extension: Option<String>,
}

/// Bound XCPD patient discovery request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientDiscoveryRequest {
    pub message_id: Option<InstanceIdentifier>,
    pub creation_time: Option<String>,
    pub interaction_id: Option<InstanceIdentifier>,
    pub processing_code: Option<String>,
    pub query_id: Option<InstanceIdentifier>,
}

/// One registry query slot (`name` plus its value list).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySlot {
    pub name: String,
    pub values: Vec<String>,
}

/// Bound XDS ad-hoc document query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentQueryRequest {
    pub return_type: Option<String>,
    pub return_composed_objects: Option<bool>,
    pub query_id: Option<String>,
    pub slots: Vec<QuerySlot>,
}

/// One document reference within a retrieve request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentRequest {
    pub home_community_id: Option<String>,
    pub repository_unique_id: Option<String>,
    pub document_unique_id: Option<String>,
}

/// Bound XDS document-set retrieve request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentRetrieveRequest {
    pub documents: Vec<DocumentRequest>,
}

/// Bind a body payload to the requested shape.
pub fn bind(payload: &str, shape: RequestShape) -> Result<TypedRequest, GatewayError> {
    match shape {
        RequestShape::PatientDiscovery => {
            bind_patient_discovery(payload).map(TypedRequest::PatientDiscovery)
        }
        RequestShape::DocumentQuery => {
            bind_document_query(payload).map(TypedRequest::DocumentQuery)
        }
        RequestShape::DocumentRetrieve => {
            bind_document_retrieve(payload).map(TypedRequest::DocumentRetrieve)
        }
    }
}

/// Bind a `PRPA_IN201305UV02` patient discovery payload.
pub fn bind_patient_discovery(payload: &str) -> Result<PatientDiscoveryRequest, GatewayError> {
    let mut reader = Reader::from_str(payload);
    let mut request = PatientDiscoveryRequest::default();
    let mut saw_root = false;
    let mut depth = 0u32;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let local = local_name_str(e);
                if !saw_root {
                    expect_root(&local, RequestShape::PatientDiscovery)?;
                    saw_root = true;
                } else {
                    bind_discovery_element(&mut request, e, &local, depth);
                }
                depth += 1;
            }
            Ok(Event::Empty(ref e)) => {
                let local = local_name_str(e);
                if !saw_root {
                    expect_root(&local, RequestShape::PatientDiscovery)?;
                    saw_root = true;
                } else {
                    bind_discovery_element(&mut request, e, &local, depth);
                }
            }
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_failure(e)),
            _ => {}
        }
    }

    require_root(saw_root)?;
    Ok(request)
}

fn bind_discovery_element(
    request: &mut PatientDiscoveryRequest,
    e: &BytesStart,
    local: &str,
    depth: u32,
) {
    // Transmission wrapper fields live directly under the interaction root;
    // `id` elements nested in sender/receiver devices must not overwrite
    // the message id.
    if depth == 1 {
        match local {
            "id" => request.message_id = Some(instance_identifier(e)),
            "creationTime" => request.creation_time = attr_value(e, "value"),
            "interactionId" => request.interaction_id = Some(instance_identifier(e)),
            "processingCode" => request.processing_code = attr_value(e, "code"),
            _ => {}
        }
    } else if local == "queryId" {
        request.query_id = Some(instance_identifier(e));
    }
}

/// Bind an `AdhocQueryRequest` document query payload.
pub fn bind_document_query(payload: &str) -> Result<DocumentQueryRequest, GatewayError> {
    let mut reader = Reader::from_str(payload);
    let mut request = DocumentQueryRequest::default();
    let mut saw_root = false;
    let mut current_slot: Option<QuerySlot> = None;
    let mut in_value = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let local = local_name_str(e);
                if !saw_root {
                    expect_root(&local, RequestShape::DocumentQuery)?;
                    saw_root = true;
                    continue;
                }
                match local.as_str() {
                    "ResponseOption" => bind_response_option(&mut request, e),
                    "AdhocQuery" => request.query_id = attr_value(e, "id"),
                    "Slot" => {
                        current_slot = Some(QuerySlot {
                            name: attr_value(e, "name").unwrap_or_default(),
                            values: Vec::new(),
                        });
                    }
                    "Value" => in_value = current_slot.is_some(),
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                // Self-closing elements produce no end event, so they must
                // not open any capture state.
                let local = local_name_str(e);
                if !saw_root {
                    expect_root(&local, RequestShape::DocumentQuery)?;
                    saw_root = true;
                    continue;
                }
                match local.as_str() {
                    "ResponseOption" => bind_response_option(&mut request, e),
                    "AdhocQuery" => request.query_id = attr_value(e, "id"),
                    "Slot" => request.slots.push(QuerySlot {
                        name: attr_value(e, "name").unwrap_or_default(),
                        values: Vec::new(),
                    }),
                    "Value" => {
                        if let Some(slot) = current_slot.as_mut() {
                            slot.values.push(String::new());
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref t)) => {
                if in_value {
                    if let Some(slot) = current_slot.as_mut() {
                        let text = t.unescape().map_err(parse_failure)?;
                        slot.values.push(text.into_owned());
                    }
                }
            }
            Ok(Event::End(ref e)) => match end_local_name(e).as_str() {
                "Value" => in_value = false,
                "Slot" => {
                    if let Some(slot) = current_slot.take() {
                        request.slots.push(slot);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_failure(e)),
            _ => {}
        }
    }

    require_root(saw_root)?;
    Ok(request)
}

/// Bind a `RetrieveDocumentSetRequest` payload.
pub fn bind_document_retrieve(payload: &str) -> Result<DocumentRetrieveRequest, GatewayError> {
    let mut reader = Reader::from_str(payload);
    let mut request = DocumentRetrieveRequest::default();
    let mut saw_root = false;
    let mut current: Option<DocumentRequest> = None;
    let mut text_field: Option<RetrieveField> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let local = local_name_str(e);
                if !saw_root {
                    expect_root(&local, RequestShape::DocumentRetrieve)?;
                    saw_root = true;
                    continue;
                }
                match local.as_str() {
                    "DocumentRequest" => current = Some(DocumentRequest::default()),
                    "HomeCommunityId" if current.is_some() => {
                        text_field = Some(RetrieveField::HomeCommunity);
                    }
                    "RepositoryUniqueId" if current.is_some() => {
                        text_field = Some(RetrieveField::Repository);
                    }
                    "DocumentUniqueId" if current.is_some() => {
                        text_field = Some(RetrieveField::Document);
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                // Self-closing elements produce no end event, so they must
                // not open any capture state.
                let local = local_name_str(e);
                if !saw_root {
                    expect_root(&local, RequestShape::DocumentRetrieve)?;
                    saw_root = true;
                    continue;
                }
                if local == "DocumentRequest" {
                    request.documents.push(DocumentRequest::default());
                }
            }
            Ok(Event::Text(ref t)) => {
                if let (Some(doc), Some(field)) = (current.as_mut(), text_field) {
                    let text = t.unescape().map_err(parse_failure)?.into_owned();
                    match field {
                        RetrieveField::HomeCommunity => doc.home_community_id = Some(text),
                        RetrieveField::Repository => doc.repository_unique_id = Some(text),
                        RetrieveField::Document => doc.document_unique_id = Some(text),
                    }
                }
            }
            Ok(Event::End(ref e)) => match end_local_name(e).as_str() {
                "DocumentRequest" => {
                    if let Some(doc) = current.take() {
                        request.documents.push(doc);
                    }
                }
                "HomeCommunityId" | "RepositoryUniqueId" | "DocumentUniqueId" => {
                    text_field = None;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_failure(e)),
            _ => {}
        }
    }

    require_root(saw_root)?;
    Ok(request)
}

#[derive(Debug, Clone, Copy)]
enum RetrieveField {
    HomeCommunity,
    Repository,
    Document,
}

fn bind_response_option(request: &mut DocumentQueryRequest, e: &BytesStart) {
    request.return_type = attr_value(e, "returnType");
    request.return_composed_objects = attr_value(e, "returnComposedObjects").map(|v| v == "true");
}

fn expect_root(local: &str, shape: RequestShape) -> Result<(), GatewayError> {
    if local == shape.root_element() {
        Ok(())
    } else {
        Err(GatewayError::MalformedRequest(format!(
            "expected a {} payload, found {local}",
            shape.root_element()
        )))
    }
}

fn require_root(saw_root: bool) -> Result<(), GatewayError> {
    if saw_root {
        Ok(())
    } else {
        Err(GatewayError::MalformedRequest(
            "request payload is empty".to_string(),
        ))
    }
}

fn parse_failure(e: quick_xml::Error) -> GatewayError {
    GatewayError::MalformedRequest(format!("XML parse error: {e}"))
}

fn local_name_str(e: &BytesStart) -> String {
    let name = e.local_name();
    std::str::from_utf8(name.as_ref()).unwrap_or("").to_string()
}

fn end_local_name(e: &BytesEnd) -> String {
    let name = e.local_name();
    std::str::from_utf8(name.as_ref()).unwrap_or("").to_string()
}

fn instance_identifier(e: &BytesStart) -> InstanceIdentifier {
    InstanceIdentifier {
        root: attr_value(e, "root"),
        extension: attr_value(e, "extension"),
    }
}

fn attr_value(e: &BytesStart, name: &str) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name.as_bytes() {
            return attr.unescape_value().ok().map(|v| v.into_owned());
        }
    }
    None
}
