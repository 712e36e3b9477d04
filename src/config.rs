//! Configuration resolved once at process start.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Config version
    pub version: String,

    /// Signing key material locations
    pub keys: KeyMaterialConfig,

    /// Inbound request gate settings
    pub gate: GateConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            keys: KeyMaterialConfig::default(),
            gate: GateConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, GatewayError> {
        serde_yaml::from_str(text).map_err(|e| GatewayError::Config(e.to_string()))
    }
}

/// Locations of the assertion signing material.
///
/// The private key is expected as PKCS#8 DER, the public half as an X.509
/// certificate in DER form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyMaterialConfig {
    /// Path to the PKCS#8 private key
    pub private_key: PathBuf,

    /// Path to the X.509 certificate
    pub public_key: PathBuf,
}

impl Default for KeyMaterialConfig {
    fn default() -> Self {
        Self {
            private_key: PathBuf::from("keys/saml-signing.pk8"),
            public_key: PathBuf::from("keys/saml-signing.der"),
        }
    }
}

/// Inbound request gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Maximum inbound payload size to process (bytes)
    pub max_payload_size: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 1_048_576, // 1MB
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.version, "1");
        assert_eq!(config.gate.max_payload_size, 1_048_576);
        assert_eq!(
            config.keys.private_key,
            PathBuf::from("keys/saml-signing.pk8")
        );
    }

    #[test]
    fn test_config_serialization() {
        let config = GatewayConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = GatewayConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.gate.max_payload_size, config.gate.max_payload_size);
        assert_eq!(parsed.keys.public_key, config.keys.public_key);
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
version: "1"
keys:
  private_key: /etc/ehealth/keys/sign.pk8
  public_key: /etc/ehealth/keys/sign.der
gate:
  max_payload_size: 2097152
"#;
        let config = GatewayConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            config.keys.private_key,
            PathBuf::from("/etc/ehealth/keys/sign.pk8")
        );
        assert_eq!(config.gate.max_payload_size, 2_097_152);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
gate:
  max_payload_size: 4096
"#;
        let config = GatewayConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.gate.max_payload_size, 4096);
        assert_eq!(config.version, "1");
        assert_eq!(
            config.keys.public_key,
            PathBuf::from("keys/saml-signing.der")
        );
    }

    #[test]
    fn test_invalid_yaml_is_a_config_error() {
        let result = GatewayConfig::from_yaml(": not yaml [");
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }
}
