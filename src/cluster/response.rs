//! Building external representations of a cluster

use super::snapshot::ClusterSnapshot;
use crate::configs::DesiredConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Turns a cluster snapshot into an external-facing value
pub trait ResponseBuilder {
    type Response;

    fn build(&self, snapshot: &ClusterSnapshot) -> Result<Self::Response>;
}

/// Summary of a cluster for API callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterResponse {
    #[serde(rename = "ClusterID")]
    pub cluster_id: u64,
    pub cluster_name: String,
    pub host_names: Vec<String>,
    pub desired_stack_version: Option<String>,
    pub current_stack_version: Option<String>,
    pub desired_configs: BTreeMap<String, DesiredConfig>,
}

/// Builds a `ClusterResponse`
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultResponseBuilder;

impl ResponseBuilder for DefaultResponseBuilder {
    type Response = ClusterResponse;

    fn build(&self, snapshot: &ClusterSnapshot) -> Result<ClusterResponse> {
        Ok(ClusterResponse {
            cluster_id: snapshot.cluster_id,
            cluster_name: snapshot.name.clone(),
            host_names: snapshot.host_names.clone(),
            desired_stack_version: snapshot.desired_stack.as_ref().map(ToString::to_string),
            current_stack_version: snapshot.current_stack.as_ref().map(ToString::to_string),
            desired_configs: snapshot.desired_configs.clone(),
        })
    }
}
