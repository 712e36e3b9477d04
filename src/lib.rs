//! SAML assertion construction and SOAP security gating for eHealth
//! Exchange style document queries.
//!
//! Two independent, stateless entry points:
//!
//! - [`AssertionBuilder`] maps caller inputs onto a fully populated SAML 2.0
//!   assertion; [`marshal::assertion_to_xml`] serializes it and
//!   [`signer::AssertionSigner`] signs the serialized bytes.
//! - [`RequestGate`] accepts a raw SOAP 1.2 payload, requires a WS-Security
//!   header, and binds the body to one of three typed request shapes
//!   (patient discovery, document query, document-set retrieve).
//!
//! # Example
//!
//! ```ignore
//! use ehealth_saml::{AssertionBuilder, AssertionInput, RequestGate, RequestShape};
//!
//! let builder = AssertionBuilder::new();
//! let assertion = builder.build(&input);
//! let xml = ehealth_saml::marshal::assertion_to_xml(&assertion)?;
//!
//! let gate = RequestGate::default();
//! let request = gate.parse(&soap_payload, RequestShape::PatientDiscovery)?;
//! ```

pub mod assertion;
pub mod config;
pub mod error;
pub mod gate;
pub mod marshal;
pub mod requests;
pub mod signer;
pub mod soap;

pub use assertion::{Assertion, AssertionBuilder, AssertionInput};
pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gate::RequestGate;
pub use requests::{RequestShape, TypedRequest};
pub use signer::AssertionSigner;
