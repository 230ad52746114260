//! Service membership and removal guards

use super::component_host::{HostComponentState, ServiceComponentHost};
use super::service::Service;
use crate::error::{ClusterError, Result};
use std::collections::BTreeMap;

/// Services of one cluster, keyed by name
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, Service>,
}

impl ServiceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new, empty service
    pub fn add_service(&mut self, name: &str) -> Result<Service> {
        self.add_service_object(Service::new(name))
    }

    /// Register a prepared service
    pub fn add_service_object(&mut self, service: Service) -> Result<Service> {
        if self.services.contains_key(&service.name) {
            return Err(ClusterError::DuplicateService(service.name));
        }
        self.services.insert(service.name.clone(), service.clone());
        Ok(service)
    }

    /// Get a service by name
    pub fn get_service(&self, name: &str) -> Result<Service> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::ServiceNotFound(name.to_string()))
    }

    /// All services, keyed by name
    pub fn get_services(&self) -> BTreeMap<String, Service> {
        self.services.clone()
    }

    /// Service names, sorted
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Number of services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// True if there are no services
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Remove a service and all its deployments
    pub fn delete_service(&mut self, name: &str) -> Result<Service> {
        let service = self
            .services
            .get(name)
            .ok_or_else(|| ClusterError::ServiceNotFound(name.to_string()))?;

        check_removable(service)?;

        self.services
            .remove(name)
            .ok_or_else(|| ClusterError::ServiceNotFound(name.to_string()))
    }

    /// Remove every service, or none if any one of them is not removable
    pub fn delete_all_services(&mut self) -> Result<Vec<Service>> {
        for service in self.services.values() {
            check_removable(service)?;
        }
        let removed = std::mem::take(&mut self.services);
        Ok(removed.into_values().collect())
    }

    /// Deploy a component of a service on a host
    pub fn add_component_host(
        &mut self,
        service: &str,
        component: &str,
        host: &str,
        state: HostComponentState,
    ) -> Result<ServiceComponentHost> {
        let svc = self
            .services
            .get_mut(service)
            .ok_or_else(|| ClusterError::ServiceNotFound(service.to_string()))?;
        Ok(svc.add_component_host(component, host, state))
    }

    /// Change the lifecycle state of a deployment. Returns the previous state.
    pub fn set_component_host_state(
        &mut self,
        service: &str,
        component: &str,
        host: &str,
        state: HostComponentState,
    ) -> Result<HostComponentState> {
        let svc = self
            .services
            .get_mut(service)
            .ok_or_else(|| ClusterError::ServiceNotFound(service.to_string()))?;

        svc.set_component_host_state(component, host, state)
            .ok_or_else(|| ClusterError::ComponentHostNotFound {
                service: service.to_string(),
                component: component.to_string(),
                host: host.to_string(),
            })
    }

    /// Every deployment on `host`, across all services
    pub fn get_service_component_hosts(&self, host: &str) -> Vec<ServiceComponentHost> {
        self.services
            .values()
            .flat_map(|s| s.component_hosts())
            .filter(|sch| sch.host == host)
            .cloned()
            .collect()
    }

    /// Every host that carries at least one deployment, sorted
    pub fn host_names(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .services
            .values()
            .flat_map(|s| s.component_hosts())
            .map(|sch| sch.host.clone())
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }

    /// Replace the registry content with persisted services
    pub(crate) fn restore(&mut self, services: Vec<Service>) {
        self.services = services
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();
    }
}

fn check_removable(service: &Service) -> Result<()> {
    match service.first_active_component_host() {
        Some(sch) => Err(ClusterError::ServiceHasActiveComponents {
            service: service.name.clone(),
            component: sch.component.clone(),
            host: sch.host.clone(),
            state: sch.state.to_string(),
        }),
        None => Ok(()),
    }
}
