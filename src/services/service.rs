//! Cluster services and their components

use super::component_host::{HostComponentState, ServiceComponentHost};
use crate::stack::StackId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A component of a service and the hosts it is deployed on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceComponent {
    /// Component name (e.g. "NAMENODE")
    pub name: String,
    /// Host -> deployment
    #[serde(default)]
    pub hosts: BTreeMap<String, ServiceComponentHost>,
}

impl ServiceComponent {
    /// Create a component with no hosts
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hosts: BTreeMap::new(),
        }
    }
}

/// A service deployed in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Service name (e.g. "HDFS")
    pub name: String,
    /// Stack the service is meant to run on
    #[serde(default)]
    pub desired_stack: Option<StackId>,
    /// Component name -> component
    #[serde(default)]
    pub components: BTreeMap<String, ServiceComponent>,
    /// Bumped on every change
    pub version: u64,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Service {
    /// Create a new service with no components
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            desired_stack: None,
            components: BTreeMap::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the desired stack
    pub fn with_stack(mut self, stack: StackId) -> Self {
        self.desired_stack = Some(stack);
        self
    }

    /// Deploy a component on a host, replacing any existing deployment
    pub fn add_component_host(
        &mut self,
        component: &str,
        host: &str,
        state: HostComponentState,
    ) -> ServiceComponentHost {
        let sch = ServiceComponentHost::new(&self.name, component, host).with_state(state);
        self.components
            .entry(component.to_string())
            .or_insert_with(|| ServiceComponent::new(component))
            .hosts
            .insert(host.to_string(), sch.clone());
        self.touch();
        sch
    }

    /// Change the state of an existing deployment. Returns the previous state.
    pub fn set_component_host_state(
        &mut self,
        component: &str,
        host: &str,
        state: HostComponentState,
    ) -> Option<HostComponentState> {
        let sch = self
            .components
            .get_mut(component)
            .and_then(|c| c.hosts.get_mut(host))?;
        let previous = std::mem::replace(&mut sch.state, state);
        self.touch();
        Some(previous)
    }

    /// Every deployment of this service
    pub fn component_hosts(&self) -> impl Iterator<Item = &ServiceComponentHost> {
        self.components.values().flat_map(|c| c.hosts.values())
    }

    /// The first deployment that blocks removal, if any
    pub fn first_active_component_host(&self) -> Option<&ServiceComponentHost> {
        self.component_hosts().find(|sch| !sch.is_removable())
    }

    /// True if no deployment blocks removal
    pub fn can_be_removed(&self) -> bool {
        self.first_active_component_host().is_none()
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}
