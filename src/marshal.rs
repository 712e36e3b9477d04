//! Assertion XML serialization.
//!
//! Serialization happens exactly once per build path and the produced text is
//! never cached; a writer failure surfaces as a construction error rather
//! than a partial document.

use crate::assertion::{Assertion, Condition, ASSERTION_NS};
use crate::error::GatewayError;
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Serialize an assertion to SAML 2.0 XML text.
pub fn assertion_to_xml(assertion: &Assertion) -> Result<String, GatewayError> {
    let mut writer = Writer::new(Vec::new());

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("saml2:Assertion");
    root.push_attribute(("xmlns:saml2", ASSERTION_NS));
    root.push_attribute(("xmlns:xs", XS_NS));
    root.push_attribute(("xmlns:xsi", XSI_NS));
    root.push_attribute(("Version", assertion.version));
    root.push_attribute(("ID", assertion.id.as_str()));
    root.push_attribute((
        "IssueInstant",
        format_instant(assertion.issue_instant).as_str(),
    ));
    write(&mut writer, Event::Start(root))?;

    let mut issuer = BytesStart::new("saml2:Issuer");
    issuer.push_attribute(("Format", assertion.issuer.format));
    write(&mut writer, Event::Start(issuer))?;
    write(&mut writer, Event::Text(BytesText::new(&assertion.issuer.value)))?;
    write(&mut writer, Event::End(BytesEnd::new("saml2:Issuer")))?;

    write_subject(&mut writer, assertion)?;
    write_conditions(&mut writer, assertion)?;
    write_authn_statement(&mut writer, assertion)?;
    write_attribute_statement(&mut writer, assertion)?;

    write(&mut writer, Event::End(BytesEnd::new("saml2:Assertion")))?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| GatewayError::Construction(format!("serialized assertion is not UTF-8: {e}")))
}

fn write_subject(writer: &mut Writer<Vec<u8>>, assertion: &Assertion) -> Result<(), GatewayError> {
    write(writer, Event::Start(BytesStart::new("saml2:Subject")))?;

    let mut name_id = BytesStart::new("saml2:NameID");
    name_id.push_attribute(("Format", assertion.subject.name_id.format));
    write(writer, Event::Start(name_id))?;
    write(
        writer,
        Event::Text(BytesText::new(&assertion.subject.name_id.value)),
    )?;
    write(writer, Event::End(BytesEnd::new("saml2:NameID")))?;

    write(
        writer,
        Event::Start(BytesStart::new("saml2:SubjectConfirmation")),
    )?;
    let confirmation = assertion.subject.confirmation;
    let mut data = BytesStart::new("saml2:SubjectConfirmationData");
    data.push_attribute(("NotBefore", format_instant(confirmation.not_before).as_str()));
    data.push_attribute((
        "NotOnOrAfter",
        format_instant(confirmation.not_on_or_after).as_str(),
    ));
    write(writer, Event::Empty(data))?;
    write(
        writer,
        Event::End(BytesEnd::new("saml2:SubjectConfirmation")),
    )?;

    write(writer, Event::End(BytesEnd::new("saml2:Subject")))
}

fn write_conditions(
    writer: &mut Writer<Vec<u8>>,
    assertion: &Assertion,
) -> Result<(), GatewayError> {
    write(writer, Event::Start(BytesStart::new("saml2:Conditions")))?;
    for condition in &assertion.conditions.conditions {
        match condition {
            Condition::OneTimeUse => {
                write(writer, Event::Empty(BytesStart::new("saml2:OneTimeUse")))?;
            }
        }
    }
    write(writer, Event::End(BytesEnd::new("saml2:Conditions")))
}

fn write_authn_statement(
    writer: &mut Writer<Vec<u8>>,
    assertion: &Assertion,
) -> Result<(), GatewayError> {
    let mut statement = BytesStart::new("saml2:AuthnStatement");
    statement.push_attribute((
        "AuthnInstant",
        format_instant(assertion.authn_statement.authn_instant).as_str(),
    ));
    write(writer, Event::Start(statement))?;
    write(writer, Event::Start(BytesStart::new("saml2:AuthnContext")))?;
    write(
        writer,
        Event::Start(BytesStart::new("saml2:AuthnContextClassRef")),
    )?;
    write(
        writer,
        Event::Text(BytesText::new(assertion.authn_statement.context_class_ref)),
    )?;
    write(
        writer,
        Event::End(BytesEnd::new("saml2:AuthnContextClassRef")),
    )?;
    write(writer, Event::End(BytesEnd::new("saml2:AuthnContext")))?;
    write(writer, Event::End(BytesEnd::new("saml2:AuthnStatement")))
}

fn write_attribute_statement(
    writer: &mut Writer<Vec<u8>>,
    assertion: &Assertion,
) -> Result<(), GatewayError> {
    write(
        writer,
        Event::Start(BytesStart::new("saml2:AttributeStatement")),
    )?;
    for attribute in &assertion.attribute_statement.attributes {
        let mut attr = BytesStart::new("saml2:Attribute");
        attr.push_attribute(("Name", attribute.name.as_str()));
        write(writer, Event::Start(attr))?;

        let mut value = BytesStart::new("saml2:AttributeValue");
        value.push_attribute(("xsi:type", "xs:string"));
        write(writer, Event::Start(value))?;
        write(writer, Event::Text(BytesText::new(&attribute.value)))?;
        write(writer, Event::End(BytesEnd::new("saml2:AttributeValue")))?;

        write(writer, Event::End(BytesEnd::new("saml2:Attribute")))?;
    }
    write(
        writer,
        Event::End(BytesEnd::new("saml2:AttributeStatement")),
    )
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), GatewayError> {
    writer
        .write_event(event)
        .map_err(|e| GatewayError::Construction(format!("XML write error: {e}")))
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::{AssertionBuilder, AssertionInput};
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    fn sample_assertion() -> Assertion {
        let mut attributes = BTreeMap::new();
        attributes.insert("firstName".to_string(), Some("Jane".to_string()));
        attributes.insert("lastName".to_string(), Some("Doe".to_string()));
        let input = AssertionInput {
            subject_id: "12345".to_string(),
            issuer: "CA-EMSA".to_string(),
            assertion_id: "abc-1".to_string(),
            attributes,
        };
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 18, 30, 15).unwrap();
        AssertionBuilder::new().build_at(&input, now)
    }

    fn attr_of(xml: &str, name: &str) -> String {
        let marker = format!("{name}=\"");
        let start = xml.find(&marker).unwrap() + marker.len();
        let end = xml[start..].find('"').unwrap();
        xml[start..start + end].to_string()
    }

    #[test]
    fn test_serialized_assertion_structure() {
        let xml = assertion_to_xml(&sample_assertion()).unwrap();

        assert!(xml.contains(r#"Version="2.0""#));
        assert!(xml.contains(r#"ID="abc-1""#));
        assert!(xml.contains("urn:oasis:names:tc:SAML:2.0:assertion"));
        assert!(xml.contains(">CA-EMSA</saml2:Issuer>"));
        assert!(xml.contains(">12345</saml2:NameID>"));
        assert!(xml.contains("<saml2:OneTimeUse/>"));
        assert!(xml.contains("urn:oasis:names:tc:SAML:2.0:ac:classes:Password"));
        assert!(xml.contains(r#"Name="firstName""#));
        assert!(xml.contains(r#"xsi:type="xs:string""#));
        assert!(xml.contains(">Jane</saml2:AttributeValue>"));
    }

    #[test]
    fn test_each_block_serialized_exactly_once() {
        let xml = assertion_to_xml(&sample_assertion()).unwrap();
        for tag in [
            "<saml2:Subject>",
            "<saml2:AuthnStatement ",
            "<saml2:AttributeStatement>",
            "<saml2:Conditions>",
        ] {
            assert_eq!(xml.matches(tag).count(), 1, "expected exactly one {tag}");
        }
    }

    #[test]
    fn test_confirmation_window_survives_serialization() {
        let xml = assertion_to_xml(&sample_assertion()).unwrap();
        let not_before =
            DateTime::parse_from_rfc3339(&attr_of(&xml, "NotBefore")).unwrap();
        let not_on_or_after =
            DateTime::parse_from_rfc3339(&attr_of(&xml, "NotOnOrAfter")).unwrap();
        assert_eq!(not_on_or_after - not_before, Duration::minutes(2));
    }

    #[test]
    fn test_text_and_attribute_content_escaped() {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            "org".to_string(),
            Some("Health & Wellness <Group>".to_string()),
        );
        let input = AssertionInput {
            subject_id: "CN=a<b".to_string(),
            issuer: "\"quoted\"".to_string(),
            assertion_id: "id-1".to_string(),
            attributes,
        };
        let assertion = AssertionBuilder::new().build(&input);
        let xml = assertion_to_xml(&assertion).unwrap();

        assert!(xml.contains("Health &amp; Wellness &lt;Group&gt;"));
        assert!(xml.contains("CN=a&lt;b"));
        assert!(!xml.contains("<Group>"));
    }

    #[test]
    fn test_empty_attribute_statement_serializes() {
        let input = AssertionInput {
            subject_id: "s".to_string(),
            issuer: "i".to_string(),
            assertion_id: "a".to_string(),
            attributes: BTreeMap::new(),
        };
        let assertion = AssertionBuilder::new().build(&input);
        let xml = assertion_to_xml(&assertion).unwrap();
        assert!(xml.contains("<saml2:AttributeStatement></saml2:AttributeStatement>"));
    }

    #[test]
    fn test_issue_instant_is_utc_millis() {
        let xml = assertion_to_xml(&sample_assertion()).unwrap();
        assert_eq!(attr_of(&xml, "IssueInstant"), "2024-03-09T18:30:15.000Z");
    }
}
