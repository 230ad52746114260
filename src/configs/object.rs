//! Immutable configuration objects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A stored configuration version, addressed by `(config_type, tag)`
///
/// The property maps are the object's content and never change once the
/// object is stored. Anything else on the struct is creation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigObject {
    /// Configuration type (e.g. "core-site")
    pub config_type: String,
    /// Version tag, unique within the type
    pub tag: String,
    /// Property key to value
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Per-attribute property annotations (e.g. "final" -> {key: "true"})
    #[serde(default)]
    pub property_attributes: BTreeMap<String, BTreeMap<String, String>>,
    /// Monotonic version assigned by the creator
    #[serde(default)]
    pub version: u64,
    /// Service the config was created for, if any
    #[serde(default)]
    pub service: Option<String>,
    /// Who created it
    #[serde(default)]
    pub created_by: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl ConfigObject {
    /// Create a new config object with no properties
    pub fn new(config_type: &str, tag: &str) -> Self {
        Self {
            config_type: config_type.to_string(),
            tag: tag.to_string(),
            properties: BTreeMap::new(),
            property_attributes: BTreeMap::new(),
            version: 1,
            service: None,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    /// Add a property
    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    /// Add a property attribute
    pub fn attribute(mut self, attribute: &str, key: &str, value: &str) -> Self {
        self.property_attributes
            .entry(attribute.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Set the owning service
    pub fn service(mut self, service: &str) -> Self {
        self.service = Some(service.to_string());
        self
    }

    /// Set the creator
    pub fn created_by(mut self, user: &str) -> Self {
        self.created_by = Some(user.to_string());
        self
    }

    /// Set the version
    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// True if both objects carry the same content
    pub fn same_content(&self, other: &ConfigObject) -> bool {
        self.properties == other.properties
            && self.property_attributes == other.property_attributes
    }

    /// Hex SHA-256 over the content only
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in &self.properties {
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([0xffu8]);
        for (attribute, values) in &self.property_attributes {
            hasher.update(attribute.as_bytes());
            hasher.update([0u8]);
            for (key, value) in values {
                hasher.update(key.as_bytes());
                hasher.update([0u8]);
                hasher.update(value.as_bytes());
                hasher.update([0u8]);
            }
            hasher.update([0xffu8]);
        }
        format!("{:x}", hasher.finalize())
    }
}
