//! Assertion signing.
//!
//! The signing stage is explicit and separate from assertion construction:
//! callers build and serialize an assertion, then decide whether to sign it.
//! The stage produces a detached signature record; composing an XML-DSig
//! envelope around it is the responsibility of the surrounding toolchain.

use crate::config::KeyMaterialConfig;
use crate::error::GatewayError;
use aws_lc_rs::digest;
use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{self, RsaKeyPair};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;

/// Algorithm URI for the signature this stage produces.
pub const RSA_SHA256_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
/// Algorithm URI for the digest this stage produces.
pub const SHA256_URI: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

/// A detached signature over serialized assertion bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionSignature {
    /// Base64 SHA-256 digest of the signed bytes
    pub digest_value: String,
    /// Base64 RSA PKCS#1 v1.5 signature
    pub signature_value: String,
    /// Base64 DER of the signer's X.509 certificate
    pub certificate: String,
}

/// Signs serialized assertions with an RSA key loaded at startup.
#[derive(Debug)]
pub struct AssertionSigner {
    key_pair: RsaKeyPair,
    certificate_der: Vec<u8>,
}

impl AssertionSigner {
    /// Load signing material from the configured key locations.
    pub fn from_config(config: &KeyMaterialConfig) -> Result<Self, GatewayError> {
        Self::from_files(&config.private_key, &config.public_key)
    }

    /// Load a PKCS#8 DER private key and an X.509 DER certificate from disk.
    pub fn from_files(private_key: &Path, certificate: &Path) -> Result<Self, GatewayError> {
        let key_der = std::fs::read(private_key)?;
        let cert_der = std::fs::read(certificate)?;
        Self::from_der(&key_der, &cert_der)
    }

    /// Build a signer from in-memory DER material.
    pub fn from_der(pkcs8_der: &[u8], certificate_der: &[u8]) -> Result<Self, GatewayError> {
        let key_pair = RsaKeyPair::from_pkcs8(pkcs8_der)
            .map_err(|e| GatewayError::KeyMaterial(format!("invalid PKCS#8 private key: {e}")))?;
        if certificate_der.is_empty() {
            return Err(GatewayError::KeyMaterial(
                "certificate is empty".to_string(),
            ));
        }
        Ok(Self {
            key_pair,
            certificate_der: certificate_der.to_vec(),
        })
    }

    /// Sign serialized assertion text with RSA PKCS#1 v1.5 / SHA-256.
    pub fn sign(&self, assertion_xml: &str) -> Result<AssertionSignature, GatewayError> {
        let data = assertion_xml.as_bytes();
        let digest = digest::digest(&digest::SHA256, data);

        let rng = SystemRandom::new();
        let mut signature = vec![0u8; self.key_pair.public_modulus_len()];
        self.key_pair
            .sign(&signature::RSA_PKCS1_SHA256, &rng, data, &mut signature)
            .map_err(|e| GatewayError::Signing(format!("RSA signing failed: {e}")))?;

        Ok(AssertionSignature {
            digest_value: STANDARD.encode(digest.as_ref()),
            signature_value: STANDARD.encode(&signature),
            certificate: STANDARD.encode(&self.certificate_der),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        let result = AssertionSigner::from_der(&[], b"cert");
        assert!(matches!(result, Err(GatewayError::KeyMaterial(_))));
    }

    #[test]
    fn test_garbage_key_rejected() {
        let result = AssertionSigner::from_der(b"not a der key at all", b"cert");
        assert!(matches!(result, Err(GatewayError::KeyMaterial(_))));
    }

    #[test]
    fn test_empty_certificate_rejected() {
        // Key parsing fails first with empty bytes, so give the key slot
        // plausible-but-wrong bytes and confirm no signer is produced either
        // way; no partially initialized signer exists.
        let result = AssertionSigner::from_der(&[0x30, 0x82], &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_key_file_is_io_error() {
        let result = AssertionSigner::from_files(
            Path::new("/nonexistent/signing.pk8"),
            Path::new("/nonexistent/signing.der"),
        );
        assert!(matches!(result, Err(GatewayError::Io(_))));
    }
}
