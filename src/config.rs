//! Configuration types for the SOAP dispatcher.

use crate::error::SoapError;
use crate::parser::{SOAP_11_NS, SOAP_12_NS};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for the SOAP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoapServerConfig {
    /// Config version
    pub version: String,

    /// Listener settings
    pub server: ServerConfig,

    /// Dispatch settings
    pub settings: SettingsConfig,
}

impl Default for SoapServerConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            server: ServerConfig::default(),
            settings: SettingsConfig::default(),
        }
    }
}

impl SoapServerConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SoapError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| SoapError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SoapError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    fn validate(&self) -> Result<(), SoapError> {
        if self.settings.allowed_versions.is_empty() {
            return Err(SoapError::Config(
                "settings.allowed_versions must list at least one SOAP version".to_string(),
            ));
        }
        if let Some(fallback) = self.settings.fallback_version {
            if !self.settings.allowed_versions.contains(&fallback) {
                return Err(SoapError::Config(format!(
                    "settings.fallback_version {} is not in settings.allowed_versions",
                    fallback.as_str()
                )));
            }
        }
        if self.settings.max_body_size == 0 {
            return Err(SoapError::Config(
                "settings.max_body_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub listen_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Maximum request body size to process (bytes)
    pub max_body_size: usize,

    /// SOAP versions accepted from clients
    pub allowed_versions: Vec<SoapVersion>,

    /// Version used for faults raised before the request version is known.
    /// Defaults to the first entry of `allowed_versions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_version: Option<SoapVersion>,

    /// Add debug headers (X-SOAP-*) to responses
    pub debug_headers: bool,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1_048_576, // 1MB
            allowed_versions: vec![SoapVersion::Soap11, SoapVersion::Soap12],
            fallback_version: None,
            debug_headers: false,
        }
    }
}

impl SettingsConfig {
    /// Version for faults raised before negotiation. Always one of
    /// `allowed_versions` when that list is non-empty.
    pub fn fault_version(&self) -> SoapVersion {
        match self.fallback_version {
            Some(version) if self.allowed_versions.contains(&version) => version,
            _ => self
                .allowed_versions
                .first()
                .copied()
                .unwrap_or(SoapVersion::Soap11),
        }
    }
}

/// SOAP versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[serde(rename = "1.1")]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[serde(rename = "1.2")]
    Soap12,
}

impl SoapVersion {
    /// Envelope namespace URI.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Soap11 => SOAP_11_NS,
            Self::Soap12 => SOAP_12_NS,
        }
    }

    /// Content-Type for responses of this version.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Soap11 => "text/xml; charset=utf-8",
            Self::Soap12 => "application/soap+xml; charset=utf-8",
        }
    }

    /// Version whose envelope namespace is `ns`.
    pub fn from_namespace(ns: &str) -> Option<Self> {
        match ns {
            SOAP_11_NS => Some(Self::Soap11),
            SOAP_12_NS => Some(Self::Soap12),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Soap11 => "1.1",
            Self::Soap12 => "1.2",
        }
    }
}

impl std::fmt::Display for SoapVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SOAP {}", self.as_str())
    }
}
