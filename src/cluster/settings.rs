//! Cluster instance settings

use crate::configs::desired::DEFAULT_HISTORY_LIMIT;
use crate::error::{ClusterError, Result};
use crate::stack::StackId;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings a cluster is created with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// Cluster ID, immutable once the cluster exists
    pub cluster_id: u64,
    /// Cluster name
    pub name: String,
    /// Superseded desired configs kept per type
    pub desired_history_limit: usize,
    /// Stack the cluster starts on, as `NAME-VERSION`
    pub initial_stack: Option<String>,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            cluster_id: 1,
            name: "default".to_string(),
            desired_history_limit: DEFAULT_HISTORY_LIMIT,
            initial_stack: None,
        }
    }
}

impl ClusterSettings {
    /// Create settings for a named cluster
    pub fn new(cluster_id: u64, name: &str) -> Self {
        Self {
            cluster_id,
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Parse YAML settings
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Self =
            serde_yaml::from_str(content).map_err(|e| ClusterError::Yaml(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse JSON settings
    pub fn from_json(content: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file; `.json` is read as JSON, anything else as YAML
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Parsed initial stack
    pub fn initial_stack(&self) -> Result<Option<StackId>> {
        self.initial_stack
            .as_deref()
            .map(str::parse::<StackId>)
            .transpose()
    }

    /// Check field values
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ClusterError::InvalidSettings(
                "cluster name must not be empty".to_string(),
            ));
        }
        self.initial_stack()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_settings_with_defaults() {
        let yaml = r#"
cluster_id: 7
name: prod
initial_stack: HDP-2.0.5
"#;
        let settings = ClusterSettings::from_yaml(yaml).unwrap();
        assert_eq!(settings.cluster_id, 7);
        assert_eq!(settings.name, "prod");
        assert_eq!(settings.desired_history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(
            settings.initial_stack().unwrap(),
            Some(StackId::new("HDP", "2.0.5"))
        );
    }

    #[test]
    fn test_json_settings() {
        let settings =
            ClusterSettings::from_json(r#"{"name": "dev", "desired_history_limit": 3}"#).unwrap();
        assert_eq!(settings.name, "dev");
        assert_eq!(settings.desired_history_limit, 3);
        assert_eq!(settings.cluster_id, 1);
    }

    #[test]
    fn test_invalid_settings() {
        assert!(ClusterSettings::from_yaml("name: ''").is_err());
        assert!(ClusterSettings::from_yaml("initial_stack: nodash").is_err());
        assert!(ClusterSettings::from_yaml("name: [").is_err());
    }

    #[test]
    fn test_settings_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.yaml");
        std::fs::write(&path, "name: c1\ncluster_id: 3\n").unwrap();

        let settings = ClusterSettings::from_file(&path).unwrap();
        assert_eq!(settings, ClusterSettings::new(3, "c1"));
    }
}
