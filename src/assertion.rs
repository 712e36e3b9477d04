//! SAML 2.0 assertion model and construction.
//!
//! The model is a plain tagged data structure: every element kind the
//! gateway emits is an explicit type, so there is no runtime dispatch keyed
//! by schema identifiers and no hidden builder factory that can half-fail.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// SAML assertion namespace URI.
pub const ASSERTION_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
/// SAML version stamped on every produced assertion.
pub const SAML_VERSION: &str = "2.0";
/// Name identifier format for X.509 subject names, used for both the issuer
/// and the subject name id.
pub const X509_SUBJECT_NAME_FORMAT: &str =
    "urn:oasis:names:tc:SAML:1.1:nameid-format:X509SubjectName";
/// Authentication context class stamped on the authentication statement.
pub const PASSWORD_AUTHN_CONTEXT_CLASS: &str =
    "urn:oasis:names:tc:SAML:2.0:ac:classes:Password";
/// Length of the subject confirmation validity window, in minutes.
pub const CONFIRMATION_WINDOW_MINUTES: i64 = 2;

/// Caller-supplied inputs for one assertion.
///
/// Uniqueness of `assertion_id` across calls is the caller's responsibility.
/// An attribute mapped to `None` is emitted with an empty string value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssertionInput {
    pub subject_id: String,
    pub issuer: String,
    pub assertion_id: String,
    pub attributes: BTreeMap<String, Option<String>>,
}

/// A fully populated SAML 2.0 assertion.
///
/// Always carries exactly one subject, one authentication statement, one
/// attribute statement, and one conditions block. Immutable after
/// construction; built fresh per call and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    pub version: &'static str,
    pub id: String,
    pub issue_instant: DateTime<Utc>,
    pub issuer: Issuer,
    pub subject: Subject,
    pub authn_statement: AuthnStatement,
    pub attribute_statement: AttributeStatement,
    pub conditions: Conditions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issuer {
    pub value: String,
    pub format: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub name_id: NameId,
    pub confirmation: SubjectConfirmation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameId {
    pub value: String,
    pub format: &'static str,
}

/// Subject confirmation validity window, `[not_before, not_on_or_after)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectConfirmation {
    pub not_before: DateTime<Utc>,
    pub not_on_or_after: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthnStatement {
    pub authn_instant: DateTime<Utc>,
    pub context_class_ref: &'static str,
}

/// A single-valued string attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlAttribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeStatement {
    pub attributes: Vec<SamlAttribute>,
}

/// An assertion condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// The relying party must not cache or reuse the assertion.
    OneTimeUse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditions {
    pub conditions: Vec<Condition>,
}

/// Builds assertions from caller inputs.
///
/// Create one at process start and share it by reference; construction reads
/// the clock once per call and keeps no state between calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssertionBuilder;

impl AssertionBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build an assertion stamped with the current time.
    pub fn build(&self, input: &AssertionInput) -> Assertion {
        self.build_at(input, Utc::now())
    }

    /// Build an assertion stamped with an explicit construction time.
    ///
    /// The same instant stamps the issue instant, the authentication instant,
    /// and the start of the subject confirmation window.
    pub fn build_at(&self, input: &AssertionInput, now: DateTime<Utc>) -> Assertion {
        let attributes = input
            .attributes
            .iter()
            .map(|(name, value)| {
                Self::string_attribute(name.clone(), value.clone().unwrap_or_default())
            })
            .collect();

        Assertion {
            version: SAML_VERSION,
            id: input.assertion_id.clone(),
            issue_instant: now,
            issuer: Issuer {
                value: input.issuer.clone(),
                format: X509_SUBJECT_NAME_FORMAT,
            },
            subject: Subject {
                name_id: NameId {
                    value: input.subject_id.clone(),
                    format: X509_SUBJECT_NAME_FORMAT,
                },
                confirmation: SubjectConfirmation {
                    not_before: now,
                    not_on_or_after: now + Duration::minutes(CONFIRMATION_WINDOW_MINUTES),
                },
            },
            authn_statement: AuthnStatement {
                authn_instant: now,
                context_class_ref: PASSWORD_AUTHN_CONTEXT_CLASS,
            },
            attribute_statement: AttributeStatement { attributes },
            conditions: Conditions {
                conditions: vec![Condition::OneTimeUse],
            },
        }
    }

    /// Wrap a name/value pair as a single-valued string attribute.
    ///
    /// Pure; performs no validation. Empty strings and arbitrary unicode
    /// pass through verbatim.
    pub fn string_attribute(name: impl Into<String>, value: impl Into<String>) -> SamlAttribute {
        SamlAttribute {
            name: name.into(),
            value: value.into(),
        }
    }
}
