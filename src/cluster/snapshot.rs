//! Owned views of cluster state

use crate::configs::{ActualConfigReport, ActualConfigView, ConfigObject, DesiredConfig};
use crate::services::Service;
use crate::stack::{StackId, StackVersionState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything needed to rebuild a cluster; what persistence loads and saves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    pub cluster_id: u64,
    pub name: String,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub configs: Vec<ConfigObject>,
    #[serde(default)]
    pub desired_configs: Vec<DesiredConfig>,
    /// Superseded desired configs per type, newest first
    #[serde(default)]
    pub desired_history: BTreeMap<String, Vec<DesiredConfig>>,
    /// History bound the cluster was running with
    #[serde(default)]
    pub desired_history_limit: Option<usize>,
    #[serde(default)]
    pub actual_reports: Vec<ActualConfigReport>,
    #[serde(default)]
    pub stack: StackVersionState,
    pub saved_at: DateTime<Utc>,
}

/// A consistent, read-only picture of the cluster handed to response builders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub cluster_id: u64,
    pub name: String,
    pub services: BTreeMap<String, Service>,
    pub host_names: Vec<String>,
    pub desired_configs: BTreeMap<String, DesiredConfig>,
    pub actual_configs: BTreeMap<String, ActualConfigView>,
    pub config_count: usize,
    pub current_stack: Option<StackId>,
    pub desired_stack: Option<StackId>,
    pub taken_at: DateTime<Utc>,
}
