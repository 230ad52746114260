//! The cluster aggregate and its collaborators

pub mod core;
pub mod drift;
pub mod event;
pub mod response;
pub mod settings;
pub mod snapshot;

pub use self::core::ClusterCore;
pub use drift::ConfigDrift;
pub use event::{ClusterEvent, ClusterListener};
pub use response::{ClusterResponse, DefaultResponseBuilder, ResponseBuilder};
pub use settings::ClusterSettings;
pub use snapshot::{ClusterSnapshot, ClusterState};

use crate::configs::{ActualConfigReport, ActualConfigView, ConfigObject, DesiredConfig};
use crate::error::Result;
use crate::services::{HostComponentState, Service, ServiceComponentHost};
use crate::stack::{StackId, StackMetadata};
use std::collections::{BTreeMap, HashMap};

/// Operations on one managed cluster
///
/// Every method is safe to call from many threads at once. Returned
/// collections are owned copies; mutating them never touches the cluster.
pub trait Cluster: Send + Sync {
    /// Immutable cluster ID
    fn cluster_id(&self) -> u64;
    fn cluster_name(&self) -> Result<String>;
    fn set_cluster_name(&self, name: &str) -> Result<()>;

    /// Add an empty service; fails if the name is taken
    fn add_service(&self, name: &str) -> Result<Service>;
    fn add_service_object(&self, service: Service) -> Result<Service>;
    fn get_service(&self, name: &str) -> Result<Service>;
    fn get_services(&self) -> Result<BTreeMap<String, Service>>;
    /// Remove one service; refused while any deployment is active
    fn delete_service(&self, name: &str) -> Result<()>;
    /// Remove every service, or none if any is still active
    fn delete_all_services(&self) -> Result<()>;

    fn add_service_component_host(
        &self,
        service: &str,
        component: &str,
        host: &str,
        state: HostComponentState,
    ) -> Result<ServiceComponentHost>;
    /// Returns the previous state
    fn set_service_component_host_state(
        &self,
        service: &str,
        component: &str,
        host: &str,
        state: HostComponentState,
    ) -> Result<HostComponentState>;
    fn get_service_component_hosts(&self, host: &str) -> Result<Vec<ServiceComponentHost>>;

    fn get_desired_stack_version(&self) -> Result<Option<StackId>>;
    fn set_desired_stack_version(&self, stack: StackId) -> Result<()>;
    fn get_current_stack_version(&self) -> Result<Option<StackId>>;
    /// Move the current stack after every service is checked against `metadata`
    fn set_current_stack_version(&self, stack: StackId, metadata: &dyn StackMetadata)
        -> Result<()>;

    /// Store a config version. Returns false if an identical one was already stored.
    fn add_config(&self, config: ConfigObject) -> Result<bool>;
    fn get_config(&self, config_type: &str, tag: &str) -> Result<Option<ConfigObject>>;
    fn get_configs_by_type(&self, config_type: &str) -> Result<BTreeMap<String, ConfigObject>>;
    fn get_all_configs(&self) -> Result<Vec<ConfigObject>>;

    /// Select a stored config as desired for its type. Returns the superseded selection.
    fn add_desired_config(&self, config: &ConfigObject) -> Result<Option<DesiredConfig>> {
        self.add_desired_config_by(config, None)
    }
    /// Like `add_desired_config`, recording who made the selection
    fn add_desired_config_by(
        &self,
        config: &ConfigObject,
        user: Option<&str>,
    ) -> Result<Option<DesiredConfig>>;
    fn get_desired_config_by_type(&self, config_type: &str) -> Result<Option<DesiredConfig>>;
    fn get_desired_configs(&self) -> Result<BTreeMap<String, DesiredConfig>>;
    /// Superseded selections for a type, newest first
    fn desired_config_history(&self, config_type: &str) -> Result<Vec<DesiredConfig>>;

    /// Apply one host's report as a single batch
    fn update_actual_configs(&self, host: &str, tags_by_type: &HashMap<String, String>) -> Result<()>;
    /// Cross-host agreement per config type
    fn get_actual_configs(&self) -> Result<BTreeMap<String, ActualConfigView>>;
    fn get_host_actual_configs(&self, host: &str) -> Result<BTreeMap<String, ActualConfigReport>>;
    /// Drop a host's reports. Returns false if it never reported.
    fn forget_host(&self, host: &str) -> Result<bool>;
    /// Desired versus actual, per config type
    fn config_drift(&self) -> Result<BTreeMap<String, ConfigDrift>>;

    /// A consistent read-only view across all lock domains
    fn cluster_snapshot(&self) -> Result<ClusterSnapshot>;
    /// Full persistable state
    fn snapshot(&self) -> Result<ClusterState>;
    fn convert_to_response(&self) -> Result<ClusterResponse>;

    /// Recompute derived views on next read
    fn refresh(&self);
    /// Append a human-readable description to `out`
    fn debug_dump(&self, out: &mut String) -> Result<()>;

    /// True when no services remain and no stack transition is pending
    fn can_be_removed(&self) -> Result<bool>;
    /// Drop configs, selections, reports and stack state
    fn delete(&self) -> Result<()>;
}
