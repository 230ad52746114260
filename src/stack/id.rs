//! Stack identifiers

use crate::error::{ClusterError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A platform stack name and version, written `NAME-VERSION` (e.g. `HDP-2.0.5`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StackId {
    /// Stack name
    pub name: String,
    /// Stack version
    pub version: String,
}

impl StackId {
    /// Create a stack id
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
        }
    }
}

impl FromStr for StackId {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('-') {
            Some((name, version)) if !name.is_empty() && !version.is_empty() => {
                Ok(Self::new(name, version))
            }
            _ => Err(ClusterError::InvalidStackId(s.to_string())),
        }
    }
}

impl std::fmt::Display for StackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}
