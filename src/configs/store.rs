//! Versioned config storage

use super::object::ConfigObject;
use crate::error::{ClusterError, Result};
use std::collections::{BTreeMap, HashMap};

/// Immutable storage of config objects keyed by (type, tag)
///
/// The store carries no lock of its own; the cluster guards it together with
/// the desired-config selector.
#[derive(Debug, Default, Clone)]
pub struct ConfigStore {
    /// Type -> tag -> object
    configs: HashMap<String, BTreeMap<String, ConfigObject>>,
}

impl ConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a config
    ///
    /// Returns `Ok(true)` if the object was stored and `Ok(false)` if an
    /// object with the same (type, tag) and identical content already exists.
    pub fn add_config(&mut self, config: ConfigObject) -> Result<bool> {
        let versions = self.configs.entry(config.config_type.clone()).or_default();

        if let Some(existing) = versions.get(&config.tag) {
            if existing.same_content(&config) {
                return Ok(false);
            }
            return Err(ClusterError::DuplicateConfig {
                config_type: config.config_type,
                tag: config.tag,
            });
        }

        versions.insert(config.tag.clone(), config);
        Ok(true)
    }

    /// Get a config by type and tag
    pub fn get_config(&self, config_type: &str, tag: &str) -> Option<ConfigObject> {
        self.configs
            .get(config_type)
            .and_then(|versions| versions.get(tag))
            .cloned()
    }

    /// Check whether a (type, tag) is stored
    pub fn contains(&self, config_type: &str, tag: &str) -> bool {
        self.configs
            .get(config_type)
            .map(|versions| versions.contains_key(tag))
            .unwrap_or(false)
    }

    /// Every stored version of a type, keyed by tag
    pub fn get_configs_by_type(&self, config_type: &str) -> BTreeMap<String, ConfigObject> {
        self.configs.get(config_type).cloned().unwrap_or_default()
    }

    /// Every stored object
    pub fn get_all_configs(&self) -> Vec<ConfigObject> {
        self.configs
            .values()
            .flat_map(|versions| versions.values().cloned())
            .collect()
    }

    /// Known config types, sorted
    pub fn config_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .configs
            .iter()
            .filter(|(_, versions)| !versions.is_empty())
            .map(|(t, _)| t.clone())
            .collect();
        types.sort();
        types
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.configs.values().map(|versions| versions.len()).sum()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every stored object
    pub fn clear(&mut self) {
        self.configs.clear();
    }
}
