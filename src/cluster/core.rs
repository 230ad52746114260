//! In-memory cluster implementation

use super::drift::{self, ConfigDrift};
use super::event::{ClusterEvent, ClusterListener};
use super::response::{ClusterResponse, DefaultResponseBuilder, ResponseBuilder};
use super::settings::ClusterSettings;
use super::snapshot::{ClusterSnapshot, ClusterState};
use super::Cluster;
use crate::configs::{
    ActualConfigLedger, ActualConfigReport, ActualConfigView, ConfigObject, ConfigStore,
    DesiredConfig, DesiredConfigSelector,
};
use crate::error::{ClusterError, Result};
use crate::services::{HostComponentState, Service, ServiceComponentHost, ServiceRegistry};
use crate::stack::{StackId, StackMetadata, StackVersionState};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

/// Services, stack state and the cluster name; changes rarely
#[derive(Debug)]
struct Structure {
    name: String,
    services: ServiceRegistry,
    stack: StackVersionState,
}

/// Stored configs and the desired selection; read far more than written
#[derive(Debug)]
struct ConfigDomain {
    store: ConfigStore,
    desired: DesiredConfigSelector,
}

/// The cluster aggregate
///
/// State is split into three lock domains: structure (services and stack),
/// configs (store and desired selection) and the per-host actual config
/// ledger. Paths that need more than one domain take them in that order.
///
/// Events are queued while the mutating guard is held and delivered after it
/// is released, by one thread at a time, in queue order.
pub struct ClusterCore {
    cluster_id: u64,
    structure: RwLock<Structure>,
    configs: RwLock<ConfigDomain>,
    ledger: ActualConfigLedger,
    listeners: RwLock<Vec<Arc<dyn ClusterListener>>>,
    /// Committed events not yet delivered
    outbox: Mutex<VecDeque<ClusterEvent>>,
    /// Held by the thread currently delivering
    delivery: Mutex<()>,
}

impl std::fmt::Debug for ClusterCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCore")
            .field("cluster_id", &self.cluster_id)
            .finish_non_exhaustive()
    }
}

impl ClusterCore {
    /// Create an empty cluster
    pub fn new(cluster_id: u64, name: &str) -> Self {
        Self::build(cluster_id, name, &ClusterSettings::default(), StackVersionState::default())
    }

    /// Create an empty cluster from settings
    pub fn from_settings(settings: &ClusterSettings) -> Result<Self> {
        settings.validate()?;
        let stack = StackVersionState::new(settings.initial_stack()?);
        Ok(Self::build(settings.cluster_id, &settings.name, settings, stack))
    }

    fn build(
        cluster_id: u64,
        name: &str,
        settings: &ClusterSettings,
        stack: StackVersionState,
    ) -> Self {
        Self {
            cluster_id,
            structure: RwLock::new(Structure {
                name: name.to_string(),
                services: ServiceRegistry::new(),
                stack,
            }),
            configs: RwLock::new(ConfigDomain {
                store: ConfigStore::new(),
                desired: DesiredConfigSelector::new(settings.desired_history_limit),
            }),
            ledger: ActualConfigLedger::new(),
            listeners: RwLock::new(Vec::new()),
            outbox: Mutex::new(VecDeque::new()),
            delivery: Mutex::new(()),
        }
    }

    /// Rebuild a cluster from persisted state
    ///
    /// Every desired config must name a stored config.
    /// The history bound saved with the state wins over `settings`.
    pub fn load(state: ClusterState, settings: &ClusterSettings) -> Result<Self> {
        let settings = ClusterSettings {
            desired_history_limit: state
                .desired_history_limit
                .unwrap_or(settings.desired_history_limit),
            ..settings.clone()
        };
        let cluster = Self::build(state.cluster_id, &state.name, &settings, state.stack);

        {
            let mut configs = cluster.write_configs()?;
            for config in state.configs {
                configs.store.add_config(config)?;
            }
            for desired in state.desired_configs {
                if !configs.store.contains(&desired.config_type, &desired.tag) {
                    return Err(ClusterError::ConfigNotFound {
                        config_type: desired.config_type,
                        tag: desired.tag,
                    });
                }
                configs.desired.restore(desired);
            }
            for (config_type, entries) in state.desired_history {
                configs.desired.restore_history(&config_type, entries);
            }
        }

        cluster.write_structure()?.services.restore(state.services);
        cluster.ledger.restore(state.actual_reports)?;

        tracing::info!(
            cluster_id = cluster.cluster_id,
            "loaded cluster state"
        );
        Ok(cluster)
    }

    /// Register a change listener
    pub fn add_listener(&self, listener: Arc<dyn ClusterListener>) -> Result<()> {
        let mut listeners = self
            .listeners
            .write()
            .map_err(|_| ClusterError::Lock("Failed to acquire write lock".to_string()))?;
        listeners.push(listener);
        Ok(())
    }

    /// Hand a consistent snapshot to any response builder
    pub fn convert_with<B: ResponseBuilder>(&self, builder: &B) -> Result<B::Response> {
        builder.build(&self.cluster_snapshot()?)
    }

    /// Queue events; callers hold the write guard of the domain they changed
    fn enqueue<I>(&self, events: I) -> Result<()>
    where
        I: IntoIterator<Item = ClusterEvent>,
    {
        self.outbox
            .lock()
            .map_err(|_| ClusterError::Lock("Failed to acquire event queue lock".to_string()))?
            .extend(events);
        Ok(())
    }

    /// Deliver queued events; called after every domain guard is released
    ///
    /// If another thread is already delivering, it picks up whatever is queued
    /// here, including events queued by listeners that mutate the cluster.
    fn flush(&self) -> Result<()> {
        loop {
            let delivering = match self.delivery.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => return Ok(()),
                Err(TryLockError::Poisoned(_)) => {
                    return Err(ClusterError::Lock(
                        "Failed to acquire event delivery lock".to_string(),
                    ))
                }
            };

            loop {
                let batch: Vec<ClusterEvent> = self
                    .outbox
                    .lock()
                    .map_err(|_| {
                        ClusterError::Lock("Failed to acquire event queue lock".to_string())
                    })?
                    .drain(..)
                    .collect();
                if batch.is_empty() {
                    break;
                }
                self.deliver(&batch)?;
            }
            drop(delivering);

            // Events queued after the last drain but before the unlock
            let drained = self
                .outbox
                .lock()
                .map_err(|_| ClusterError::Lock("Failed to acquire event queue lock".to_string()))?
                .is_empty();
            if drained {
                return Ok(());
            }
        }
    }

    fn deliver(&self, events: &[ClusterEvent]) -> Result<()> {
        let listeners = self
            .listeners
            .read()
            .map_err(|_| ClusterError::Lock("Failed to acquire read lock".to_string()))?
            .clone();

        for event in events {
            for listener in &listeners {
                listener.on_event(event);
            }
        }
        Ok(())
    }

    /// Build a snapshot while the caller holds both domain guards
    fn snapshot_locked(
        &self,
        structure: &Structure,
        configs: &ConfigDomain,
    ) -> Result<ClusterSnapshot> {
        let actual_configs = self.ledger.get_actual_configs()?;

        Ok(ClusterSnapshot {
            cluster_id: self.cluster_id,
            name: structure.name.clone(),
            services: structure.services.get_services(),
            host_names: structure.services.host_names(),
            desired_configs: configs.desired.get_desired_configs(),
            actual_configs,
            config_count: configs.store.len(),
            current_stack: structure.stack.current(),
            desired_stack: structure.stack.desired(),
            taken_at: Utc::now(),
        })
    }

    fn read_structure(&self) -> Result<RwLockReadGuard<'_, Structure>> {
        self.structure
            .read()
            .map_err(|_| ClusterError::Lock("Failed to acquire read lock".to_string()))
    }

    fn write_structure(&self) -> Result<RwLockWriteGuard<'_, Structure>> {
        self.structure
            .write()
            .map_err(|_| ClusterError::Lock("Failed to acquire write lock".to_string()))
    }

    fn read_configs(&self) -> Result<RwLockReadGuard<'_, ConfigDomain>> {
        self.configs
            .read()
            .map_err(|_| ClusterError::Lock("Failed to acquire read lock".to_string()))
    }

    fn write_configs(&self) -> Result<RwLockWriteGuard<'_, ConfigDomain>> {
        self.configs
            .write()
            .map_err(|_| ClusterError::Lock("Failed to acquire write lock".to_string()))
    }
}

impl Cluster for ClusterCore {
    fn cluster_id(&self) -> u64 {
        self.cluster_id
    }

    fn cluster_name(&self) -> Result<String> {
        Ok(self.read_structure()?.name.clone())
    }

    fn set_cluster_name(&self, name: &str) -> Result<()> {
        {
            let mut structure = self.write_structure()?;
            structure.name = name.to_string();
            self.enqueue([ClusterEvent::ClusterRenamed {
                name: name.to_string(),
            }])?;
        }
        self.flush()
    }

    fn add_service(&self, name: &str) -> Result<Service> {
        self.add_service_object(Service::new(name))
    }

    fn add_service_object(&self, service: Service) -> Result<Service> {
        let added = {
            let mut structure = self.write_structure()?;
            let added = structure.services.add_service_object(service)?;
            self.enqueue([ClusterEvent::ServiceAdded {
                service: added.name.clone(),
            }])?;
            added
        };
        tracing::info!(service = %added.name, "service added");
        self.flush()?;
        Ok(added)
    }

    fn get_service(&self, name: &str) -> Result<Service> {
        self.read_structure()?.services.get_service(name)
    }

    fn get_services(&self) -> Result<BTreeMap<String, Service>> {
        Ok(self.read_structure()?.services.get_services())
    }

    fn delete_service(&self, name: &str) -> Result<()> {
        let result = {
            let mut structure = self.write_structure()?;
            let result = structure.services.delete_service(name);
            if let Ok(removed) = &result {
                self.enqueue([ClusterEvent::ServiceRemoved {
                    service: removed.name.clone(),
                }])?;
            }
            result
        };
        match result {
            Ok(removed) => {
                tracing::info!(service = %removed.name, "service deleted");
                self.flush()
            }
            Err(e) => {
                tracing::warn!(service = name, error = %e, "service not deleted");
                Err(e)
            }
        }
    }

    fn delete_all_services(&self) -> Result<()> {
        // One write guard for the whole batch
        let result = {
            let mut structure = self.write_structure()?;
            let result = structure.services.delete_all_services();
            if let Ok(removed) = &result {
                self.enqueue(removed.iter().map(|s| ClusterEvent::ServiceRemoved {
                    service: s.name.clone(),
                }))?;
            }
            result
        };
        match result {
            Ok(removed) => {
                tracing::info!(count = removed.len(), "all services deleted");
                self.flush()
            }
            Err(e) => {
                tracing::warn!(error = %e, "services not deleted");
                Err(e)
            }
        }
    }

    fn add_service_component_host(
        &self,
        service: &str,
        component: &str,
        host: &str,
        state: HostComponentState,
    ) -> Result<ServiceComponentHost> {
        let sch = {
            let mut structure = self.write_structure()?;
            let sch = structure
                .services
                .add_component_host(service, component, host, state)?;
            self.enqueue([ClusterEvent::ComponentHostChanged {
                service: sch.service.clone(),
                component: sch.component.clone(),
                host: sch.host.clone(),
                state,
            }])?;
            sch
        };
        self.flush()?;
        Ok(sch)
    }

    fn set_service_component_host_state(
        &self,
        service: &str,
        component: &str,
        host: &str,
        state: HostComponentState,
    ) -> Result<HostComponentState> {
        let previous = {
            let mut structure = self.write_structure()?;
            let previous = structure
                .services
                .set_component_host_state(service, component, host, state)?;
            self.enqueue([ClusterEvent::ComponentHostChanged {
                service: service.to_string(),
                component: component.to_string(),
                host: host.to_string(),
                state,
            }])?;
            previous
        };
        self.flush()?;
        Ok(previous)
    }

    fn get_service_component_hosts(&self, host: &str) -> Result<Vec<ServiceComponentHost>> {
        Ok(self
            .read_structure()?
            .services
            .get_service_component_hosts(host))
    }

    fn get_desired_stack_version(&self) -> Result<Option<StackId>> {
        Ok(self.read_structure()?.stack.desired())
    }

    fn set_desired_stack_version(&self, stack: StackId) -> Result<()> {
        {
            let mut structure = self.write_structure()?;
            structure.stack.set_desired(stack.clone());
            self.enqueue([ClusterEvent::DesiredStackChanged { stack }])?;
        }
        self.flush()
    }

    fn get_current_stack_version(&self) -> Result<Option<StackId>> {
        Ok(self.read_structure()?.stack.current())
    }

    fn set_current_stack_version(
        &self,
        stack: StackId,
        metadata: &dyn StackMetadata,
    ) -> Result<()> {
        {
            let mut structure = self.write_structure()?;
            let verified = StackVersionState::verify_transition(
                &stack,
                structure.services.service_names(),
                metadata,
            );
            let verified = match verified {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(stack = %stack, error = %e, "stack transition rejected");
                    return Err(e);
                }
            };
            tracing::info!(stack = %verified.target(), "current stack changed");
            let previous = structure.stack.set_current(verified);
            self.enqueue([ClusterEvent::CurrentStackChanged { stack, previous }])?;
        }
        self.flush()
    }

    fn add_config(&self, config: ConfigObject) -> Result<bool> {
        let (config_type, tag) = (config.config_type.clone(), config.tag.clone());
        {
            let mut configs = self.write_configs()?;
            if !configs.store.add_config(config)? {
                return Ok(false);
            }
            self.enqueue([ClusterEvent::ConfigAdded {
                config_type: config_type.clone(),
                tag: tag.clone(),
            }])?;
        }

        self.ledger.invalidate();
        tracing::debug!(config_type = %config_type, tag = %tag, "config added");
        self.flush()?;
        Ok(true)
    }

    fn get_config(&self, config_type: &str, tag: &str) -> Result<Option<ConfigObject>> {
        Ok(self.read_configs()?.store.get_config(config_type, tag))
    }

    fn get_configs_by_type(&self, config_type: &str) -> Result<BTreeMap<String, ConfigObject>> {
        Ok(self.read_configs()?.store.get_configs_by_type(config_type))
    }

    fn get_all_configs(&self) -> Result<Vec<ConfigObject>> {
        Ok(self.read_configs()?.store.get_all_configs())
    }

    fn add_desired_config_by(
        &self,
        config: &ConfigObject,
        user: Option<&str>,
    ) -> Result<Option<DesiredConfig>> {
        let previous = {
            let mut configs = self.write_configs()?;
            let ConfigDomain { store, desired } = &mut *configs;
            let previous = desired.add_desired_config(store, config, user)?;
            self.enqueue([ClusterEvent::DesiredConfigSelected {
                config_type: config.config_type.clone(),
                tag: config.tag.clone(),
                previous_tag: previous.as_ref().map(|p| p.tag.clone()),
            }])?;
            previous
        };

        tracing::info!(
            config_type = %config.config_type,
            tag = %config.tag,
            previous = previous.as_ref().map(|p| p.tag.as_str()).unwrap_or("-"),
            "desired config selected"
        );
        self.flush()?;
        Ok(previous)
    }

    fn get_desired_config_by_type(&self, config_type: &str) -> Result<Option<DesiredConfig>> {
        Ok(self
            .read_configs()?
            .desired
            .get_desired_config_by_type(config_type))
    }

    fn get_desired_configs(&self) -> Result<BTreeMap<String, DesiredConfig>> {
        Ok(self.read_configs()?.desired.get_desired_configs())
    }

    fn desired_config_history(&self, config_type: &str) -> Result<Vec<DesiredConfig>> {
        Ok(self
            .read_configs()?
            .desired
            .desired_config_history(config_type))
    }

    fn update_actual_configs(&self, host: &str, tags_by_type: &HashMap<String, String>) -> Result<()> {
        if tags_by_type.is_empty() {
            return Ok(());
        }

        let mut config_types: Vec<String> = tags_by_type.keys().cloned().collect();
        config_types.sort();
        let count = config_types.len();
        self.ledger.update_actual_configs_with(host, tags_by_type, || {
            self.enqueue([ClusterEvent::ActualConfigsUpdated {
                host: host.to_string(),
                config_types,
            }])
        })?;

        tracing::debug!(host, types = count, "actual configs updated");
        self.flush()
    }

    fn get_actual_configs(&self) -> Result<BTreeMap<String, ActualConfigView>> {
        self.ledger.get_actual_configs()
    }

    fn get_host_actual_configs(&self, host: &str) -> Result<BTreeMap<String, ActualConfigReport>> {
        self.ledger.get_host_actual_configs(host)
    }

    fn forget_host(&self, host: &str) -> Result<bool> {
        let removed = self.ledger.forget_host_with(host, || {
            self.enqueue([ClusterEvent::HostForgotten {
                host: host.to_string(),
            }])
        })?;
        if removed {
            tracing::info!(host, "host reports dropped");
            self.flush()?;
        }
        Ok(removed)
    }

    fn config_drift(&self) -> Result<BTreeMap<String, ConfigDrift>> {
        let configs = self.read_configs()?;
        let desired = configs.desired.get_desired_configs();
        let actual = self.ledger.get_actual_configs()?;
        Ok(drift::classify(&desired, &actual))
    }

    fn cluster_snapshot(&self) -> Result<ClusterSnapshot> {
        let structure = self.read_structure()?;
        let configs = self.read_configs()?;
        self.snapshot_locked(&structure, &configs)
    }

    fn snapshot(&self) -> Result<ClusterState> {
        let structure = self.read_structure()?;
        let configs = self.read_configs()?;
        let actual_reports = self.ledger.all_reports()?;

        Ok(ClusterState {
            cluster_id: self.cluster_id,
            name: structure.name.clone(),
            services: structure.services.get_services().into_values().collect(),
            configs: configs.store.get_all_configs(),
            desired_configs: configs.desired.get_desired_configs().into_values().collect(),
            desired_history: configs.desired.history(),
            desired_history_limit: Some(configs.desired.history_limit()),
            actual_reports,
            stack: structure.stack.clone(),
            saved_at: Utc::now(),
        })
    }

    fn convert_to_response(&self) -> Result<ClusterResponse> {
        DefaultResponseBuilder.build(&self.cluster_snapshot()?)
    }

    fn refresh(&self) {
        self.ledger.invalidate();
    }

    fn debug_dump(&self, out: &mut String) -> Result<()> {
        let (snapshot, digests) = {
            let structure = self.read_structure()?;
            let configs = self.read_configs()?;
            let snapshot = self.snapshot_locked(&structure, &configs)?;
            let digests: BTreeMap<String, String> = snapshot
                .desired_configs
                .values()
                .filter_map(|d| {
                    configs
                        .store
                        .get_config(&d.config_type, &d.tag)
                        .map(|c| (d.config_type.clone(), c.digest()))
                })
                .collect();
            (snapshot, digests)
        };

        let stack = |s: &Option<StackId>| {
            s.as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string())
        };

        out.push_str(&format!(
            "Cluster={{ clusterName={}, clusterId={}, currentStackVersion={}, desiredStackVersion={}\n",
            snapshot.name,
            snapshot.cluster_id,
            stack(&snapshot.current_stack),
            stack(&snapshot.desired_stack),
        ));

        out.push_str("  Services:\n");
        for service in snapshot.services.values() {
            out.push_str(&format!(
                "    {} (version {}, desiredStack={})\n",
                service.name,
                service.version,
                stack(&service.desired_stack),
            ));
            for sch in service.component_hosts() {
                out.push_str(&format!(
                    "      {} @ {}: {}\n",
                    sch.component, sch.host, sch.state
                ));
            }
        }

        out.push_str("  DesiredConfigs:\n");
        for desired in snapshot.desired_configs.values() {
            let digest = digests
                .get(&desired.config_type)
                .map(|d| &d[..8.min(d.len())])
                .unwrap_or("-");
            out.push_str(&format!(
                "    {} -> {} [digest {}] (service={}, user={})\n",
                desired.config_type,
                desired.tag,
                digest,
                desired.service.as_deref().unwrap_or("-"),
                desired.user.as_deref().unwrap_or("-"),
            ));
        }

        out.push_str("  ActualConfigs:\n");
        for (config_type, view) in &snapshot.actual_configs {
            out.push_str(&format!("    {}: {}\n", config_type, view));
        }
        out.push_str("}\n");
        Ok(())
    }

    fn can_be_removed(&self) -> Result<bool> {
        let structure = self.read_structure()?;
        Ok(removal_blocker(&structure).is_none())
    }

    fn delete(&self) -> Result<()> {
        {
            let mut structure = self.write_structure()?;
            let mut configs = self.write_configs()?;

            if let Some(reason) = removal_blocker(&structure) {
                tracing::warn!(cluster_id = self.cluster_id, reason = %reason, "cluster not removable");
                return Err(ClusterError::ClusterNotRemovable(reason));
            }

            structure.stack.clear();
            configs.store.clear();
            configs.desired.clear();
            self.ledger.clear()?;
            self.enqueue([ClusterEvent::ClusterDeleted])?;
        }

        tracing::info!(cluster_id = self.cluster_id, "cluster deleted");
        self.flush()
    }
}

fn removal_blocker(structure: &Structure) -> Option<String> {
    if !structure.services.is_empty() {
        return Some(format!("{} services remain", structure.services.len()));
    }
    if structure.stack.transition_pending() {
        return Some("stack transition pending".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::StackCatalog;
    use std::sync::Mutex;
    use std::thread;

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(t, v)| (t.to_string(), v.to_string()))
            .collect()
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<ClusterEvent>>,
    }

    impl ClusterListener for Recorder {
        fn on_event(&self, event: &ClusterEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_desired_config_scenario() {
        let cluster = ClusterCore::new(1, "c1");
        let v1 = ConfigObject::new("core-site", "v1").property("a", "1");
        cluster.add_config(v1.clone()).unwrap();
        cluster.add_desired_config(&v1).unwrap();
        assert_eq!(
            cluster.get_desired_config_by_type("core-site").unwrap().unwrap().tag,
            "v1"
        );

        let v2 = ConfigObject::new("core-site", "v2").property("a", "2");
        cluster.add_config(v2.clone()).unwrap();
        let superseded = cluster.add_desired_config(&v2).unwrap().unwrap();
        assert_eq!(superseded.tag, "v1");
        assert_eq!(
            cluster.get_desired_config_by_type("core-site").unwrap().unwrap().tag,
            "v2"
        );

        let versions = cluster.get_configs_by_type("core-site").unwrap();
        assert!(versions.contains_key("v1"));
        assert!(versions.contains_key("v2"));
        assert_eq!(cluster.desired_config_history("core-site").unwrap().len(), 1);
    }

    #[test]
    fn test_desired_config_requires_stored_config() {
        let cluster = ClusterCore::new(1, "c1");
        let result = cluster.add_desired_config(&ConfigObject::new("core-site", "v1"));
        assert!(matches!(result, Err(ClusterError::ConfigNotFound { .. })));
        assert!(cluster.get_desired_configs().unwrap().is_empty());
    }

    #[test]
    fn test_idempotent_add_config() {
        let cluster = ClusterCore::new(1, "c1");
        let config = ConfigObject::new("hdfs-site", "v1").property("dfs.replication", "3");

        assert!(cluster.add_config(config.clone()).unwrap());
        assert!(!cluster.add_config(config).unwrap());
        assert_eq!(cluster.get_all_configs().unwrap().len(), 1);

        let conflicting = ConfigObject::new("hdfs-site", "v1").property("dfs.replication", "1");
        assert!(cluster.add_config(conflicting).is_err());
        assert!(cluster.get_config("hdfs-site", "v2").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_service_scenario() {
        let cluster = ClusterCore::new(1, "c1");
        cluster.add_service("HDFS").unwrap();

        let result = cluster.add_service("HDFS");
        assert!(matches!(result, Err(ClusterError::DuplicateService(_))));
        assert_eq!(cluster.get_services().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_missing_service_scenario() {
        let cluster = ClusterCore::new(1, "c1");
        cluster.add_service("YARN").unwrap();
        let before = cluster.get_services().unwrap();

        let result = cluster.delete_service("HDFS");
        assert!(matches!(result, Err(ClusterError::ServiceNotFound(_))));
        assert_eq!(cluster.get_services().unwrap(), before);
    }

    #[test]
    fn test_delete_all_services_all_or_nothing() {
        let cluster = ClusterCore::new(1, "c1");
        cluster.add_service("HDFS").unwrap();
        cluster.add_service("YARN").unwrap();
        cluster
            .add_service_component_host("YARN", "RESOURCEMANAGER", "h1", HostComponentState::Started)
            .unwrap();

        let before = cluster.get_services().unwrap();
        let result = cluster.delete_all_services();
        assert!(matches!(
            result,
            Err(ClusterError::ServiceHasActiveComponents { .. })
        ));
        assert_eq!(cluster.get_services().unwrap(), before);

        cluster
            .set_service_component_host_state(
                "YARN",
                "RESOURCEMANAGER",
                "h1",
                HostComponentState::Installed,
            )
            .unwrap();
        cluster.delete_all_services().unwrap();
        assert!(cluster.get_services().unwrap().is_empty());
    }

    #[test]
    fn test_defensive_copies() {
        let cluster = ClusterCore::new(1, "c1");
        let v1 = ConfigObject::new("t", "v1");
        cluster.add_config(v1.clone()).unwrap();
        cluster.add_desired_config(&v1).unwrap();
        cluster.add_service("HDFS").unwrap();

        let services = cluster.get_services().unwrap();
        let desired = cluster.get_desired_configs().unwrap();
        let all = cluster.get_all_configs().unwrap();

        cluster.add_service("YARN").unwrap();
        let v2 = ConfigObject::new("t", "v2");
        cluster.add_config(v2.clone()).unwrap();
        cluster.add_desired_config(&v2).unwrap();

        assert_eq!(services.len(), 1);
        assert_eq!(desired["t"].tag, "v1");
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_concurrent_desired_configs_for_distinct_types() {
        let cluster = Arc::new(ClusterCore::new(1, "c1"));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cluster = Arc::clone(&cluster);
                thread::spawn(move || {
                    let config = ConfigObject::new(&format!("type-{}", i), "v1");
                    cluster.add_config(config.clone()).unwrap();
                    cluster.add_desired_config(&config).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let desired = cluster.get_desired_configs().unwrap();
        assert_eq!(desired.len(), 8);
        for i in 0..8 {
            assert_eq!(desired[&format!("type-{}", i)].tag, "v1");
        }
    }

    #[test]
    fn test_concurrent_reports_and_snapshots() {
        let cluster = Arc::new(ClusterCore::new(1, "c1"));
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let cluster = Arc::clone(&cluster);
                thread::spawn(move || {
                    let host = format!("host-{}", i);
                    for round in 0..25 {
                        let tag = format!("v{}", round);
                        cluster
                            .update_actual_configs(&host, &tags(&[("a", tag.as_str()), ("b", tag.as_str())]))
                            .unwrap();
                    }
                })
            })
            .collect();

        let reader = {
            let cluster = Arc::clone(&cluster);
            thread::spawn(move || {
                for _ in 0..25 {
                    let snapshot = cluster.cluster_snapshot().unwrap();
                    // A batch is never half applied: both types always carry
                    // the same set of tags
                    if let (Some(a), Some(b)) = (
                        snapshot.actual_configs.get("a"),
                        snapshot.actual_configs.get("b"),
                    ) {
                        assert_eq!(a.tags(), b.tags());
                    }
                }
            })
        };

        for handle in writers {
            handle.join().unwrap();
        }
        reader.join().unwrap();

        let actual = cluster.get_actual_configs().unwrap();
        assert_eq!(actual["a"].tag(), Some("v24"));
    }

    #[test]
    fn test_config_drift_report() {
        let cluster = ClusterCore::new(1, "c1");
        let v1 = ConfigObject::new("core-site", "v1");
        let v2 = ConfigObject::new("core-site", "v2");
        cluster.add_config(v1.clone()).unwrap();
        cluster.add_config(v2.clone()).unwrap();
        cluster.add_desired_config(&v2).unwrap();

        cluster
            .update_actual_configs("h1", &tags(&[("core-site", "v1")]))
            .unwrap();
        cluster
            .update_actual_configs("h2", &tags(&[("core-site", "v1")]))
            .unwrap();
        assert_eq!(
            cluster.config_drift().unwrap()["core-site"],
            ConfigDrift::Stale {
                desired: "v2".to_string(),
                actual: "v1".to_string()
            }
        );

        cluster
            .update_actual_configs("h1", &tags(&[("core-site", "v2")]))
            .unwrap();
        assert!(matches!(
            cluster.config_drift().unwrap()["core-site"],
            ConfigDrift::HostsDisagree { .. }
        ));

        cluster
            .update_actual_configs("h2", &tags(&[("core-site", "v2")]))
            .unwrap();
        assert!(cluster.config_drift().unwrap()["core-site"].is_in_sync());
    }

    #[test]
    fn test_refresh_and_config_writes_invalidate_view() {
        let cluster = ClusterCore::new(1, "c1");
        cluster
            .update_actual_configs("h1", &tags(&[("t", "v1")]))
            .unwrap();
        cluster.get_actual_configs().unwrap();
        assert!(cluster.ledger.has_fresh_view().unwrap());

        cluster.refresh();
        assert!(!cluster.ledger.has_fresh_view().unwrap());

        cluster.get_actual_configs().unwrap();
        cluster.add_config(ConfigObject::new("t", "v1")).unwrap();
        assert!(!cluster.ledger.has_fresh_view().unwrap());
    }

    #[test]
    fn test_stack_transition() {
        let cluster = ClusterCore::new(1, "c1");
        let hdp2 = StackId::new("HDP", "2.0.5");
        cluster.add_service("HDFS").unwrap();
        cluster.add_service("HBASE").unwrap();

        let catalog = StackCatalog::new().stack(hdp2.clone(), ["HDFS"]);
        let result = cluster.set_current_stack_version(hdp2.clone(), &catalog);
        assert!(matches!(
            result,
            Err(ClusterError::StackVersionTransition { .. })
        ));
        assert!(cluster.get_current_stack_version().unwrap().is_none());

        let catalog = catalog.stack(hdp2.clone(), ["HBASE"]);
        cluster
            .set_current_stack_version(hdp2.clone(), &catalog)
            .unwrap();
        assert_eq!(cluster.get_current_stack_version().unwrap(), Some(hdp2));
    }

    #[test]
    fn test_delete_cluster() {
        let cluster = ClusterCore::new(1, "c1");
        cluster.add_service("HDFS").unwrap();
        let config = ConfigObject::new("t", "v1");
        cluster.add_config(config.clone()).unwrap();
        cluster.add_desired_config(&config).unwrap();

        assert!(!cluster.can_be_removed().unwrap());
        assert!(matches!(
            cluster.delete(),
            Err(ClusterError::ClusterNotRemovable(_))
        ));
        assert_eq!(cluster.get_all_configs().unwrap().len(), 1);

        cluster.delete_service("HDFS").unwrap();
        cluster.set_desired_stack_version(StackId::new("HDP", "2.0.5")).unwrap();
        assert!(!cluster.can_be_removed().unwrap());

        let hdp2 = StackId::new("HDP", "2.0.5");
        cluster
            .set_current_stack_version(hdp2, &StackCatalog::new())
            .unwrap();
        assert!(cluster.can_be_removed().unwrap());

        cluster.delete().unwrap();
        assert!(cluster.get_all_configs().unwrap().is_empty());
        assert!(cluster.get_desired_configs().unwrap().is_empty());
    }

    #[test]
    fn test_listener_receives_events() {
        let cluster = ClusterCore::new(1, "c1");
        let recorder = Arc::new(Recorder::default());
        cluster.add_listener(recorder.clone()).unwrap();

        let config = ConfigObject::new("t", "v1");
        cluster.add_config(config.clone()).unwrap();
        cluster.add_config(config.clone()).unwrap();
        cluster.add_desired_config(&config).unwrap();
        cluster.add_service("HDFS").unwrap();
        let _ = cluster.add_service("HDFS");

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                ClusterEvent::ConfigAdded {
                    config_type: "t".to_string(),
                    tag: "v1".to_string()
                },
                ClusterEvent::DesiredConfigSelected {
                    config_type: "t".to_string(),
                    tag: "v1".to_string(),
                    previous_tag: None
                },
                ClusterEvent::ServiceAdded {
                    service: "HDFS".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_concurrent_selections_publish_in_commit_order() {
        let cluster = Arc::new(ClusterCore::new(1, "c1"));
        let recorder = Arc::new(Recorder::default());
        cluster.add_listener(recorder.clone()).unwrap();
        for i in 0..4 {
            for j in 0..25 {
                cluster
                    .add_config(ConfigObject::new("t", &format!("v{}-{}", i, j)))
                    .unwrap();
            }
        }

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cluster = cluster.clone();
                thread::spawn(move || {
                    for j in 0..25 {
                        let config = ConfigObject::new("t", &format!("v{}-{}", i, j));
                        cluster.add_desired_config(&config).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let selected: Vec<(String, Option<String>)> = recorder
            .events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ClusterEvent::DesiredConfigSelected {
                    tag, previous_tag, ..
                } => Some((tag.clone(), previous_tag.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(selected.len(), 100);
        assert_eq!(selected[0].1, None);
        for pair in selected.windows(2) {
            assert_eq!(pair[1].1.as_deref(), Some(pair[0].0.as_str()));
        }

        let last = &selected[selected.len() - 1].0;
        assert_eq!(&cluster.get_desired_config_by_type("t").unwrap().unwrap().tag, last);
    }

    struct Mirror {
        cluster: std::sync::Weak<ClusterCore>,
        seen: Mutex<Vec<ClusterEvent>>,
    }

    impl ClusterListener for Mirror {
        fn on_event(&self, event: &ClusterEvent) {
            self.seen.lock().unwrap().push(event.clone());
            if let (ClusterEvent::ConfigAdded { config_type, tag }, Some(cluster)) =
                (event, self.cluster.upgrade())
            {
                if config_type == "t" {
                    let mirrored = ConfigObject::new("mirror", tag);
                    cluster.add_config(mirrored.clone()).unwrap();
                    cluster.add_desired_config(&mirrored).unwrap();
                }
            }
        }
    }

    #[test]
    fn test_listener_may_mutate_cluster() {
        let cluster = Arc::new(ClusterCore::new(1, "c1"));
        let mirror = Arc::new(Mirror {
            cluster: Arc::downgrade(&cluster),
            seen: Mutex::new(Vec::new()),
        });
        cluster.add_listener(mirror.clone()).unwrap();

        cluster.add_config(ConfigObject::new("t", "v1")).unwrap();

        assert_eq!(
            cluster.get_desired_config_by_type("mirror").unwrap().unwrap().tag,
            "v1"
        );
        let seen = mirror.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ClusterEvent::ConfigAdded {
                    config_type: "t".to_string(),
                    tag: "v1".to_string()
                },
                ClusterEvent::ConfigAdded {
                    config_type: "mirror".to_string(),
                    tag: "v1".to_string()
                },
                ClusterEvent::DesiredConfigSelected {
                    config_type: "mirror".to_string(),
                    tag: "v1".to_string(),
                    previous_tag: None
                },
            ]
        );
    }

    #[test]
    fn test_snapshot_round_trip() {
        let cluster = ClusterCore::new(4, "c4");
        let config = ConfigObject::new("core-site", "v1").property("k", "v");
        cluster.add_config(config.clone()).unwrap();
        cluster.add_desired_config_by(&config, Some("admin")).unwrap();
        cluster.add_service("HDFS").unwrap();
        cluster
            .add_service_component_host("HDFS", "NAMENODE", "h1", HostComponentState::Started)
            .unwrap();
        cluster
            .update_actual_configs("h1", &tags(&[("core-site", "v1")]))
            .unwrap();

        let json = serde_json::to_string(&cluster.snapshot().unwrap()).unwrap();
        let state: ClusterState = serde_json::from_str(&json).unwrap();
        let restored = ClusterCore::load(state, &ClusterSettings::default()).unwrap();

        assert_eq!(restored.cluster_id(), 4);
        assert_eq!(restored.cluster_name().unwrap(), "c4");
        assert_eq!(
            restored.get_desired_configs().unwrap(),
            cluster.get_desired_configs().unwrap()
        );
        assert_eq!(
            restored.get_actual_configs().unwrap(),
            cluster.get_actual_configs().unwrap()
        );
        assert_eq!(restored.get_service_component_hosts("h1").unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_keeps_desired_history() {
        let settings = ClusterSettings {
            desired_history_limit: 2,
            ..ClusterSettings::new(5, "c5")
        };
        let cluster = ClusterCore::from_settings(&settings).unwrap();
        for tag in ["v1", "v2", "v3", "v4"] {
            let config = ConfigObject::new("core-site", tag);
            cluster.add_config(config.clone()).unwrap();
            cluster.add_desired_config(&config).unwrap();
        }

        let json = serde_json::to_string(&cluster.snapshot().unwrap()).unwrap();
        let state: ClusterState = serde_json::from_str(&json).unwrap();
        assert_eq!(state.desired_history_limit, Some(2));
        let restored = ClusterCore::load(state, &ClusterSettings::default()).unwrap();

        let history: Vec<String> = restored
            .desired_config_history("core-site")
            .unwrap()
            .into_iter()
            .map(|d| d.tag)
            .collect();
        assert_eq!(history, vec!["v3", "v2"]);

        // The saved bound still applies after a reload
        let v5 = ConfigObject::new("core-site", "v5");
        restored.add_config(v5.clone()).unwrap();
        restored.add_desired_config(&v5).unwrap();
        let history: Vec<String> = restored
            .desired_config_history("core-site")
            .unwrap()
            .into_iter()
            .map(|d| d.tag)
            .collect();
        assert_eq!(history, vec!["v4", "v3"]);
    }

    #[test]
    fn test_load_without_saved_history_uses_settings() {
        let cluster = ClusterCore::new(6, "c6");
        let mut state = cluster.snapshot().unwrap();
        state.desired_history_limit = None;
        state.desired_history.clear();

        let settings = ClusterSettings {
            desired_history_limit: 1,
            ..ClusterSettings::default()
        };
        let restored = ClusterCore::load(state, &settings).unwrap();
        for tag in ["v1", "v2", "v3"] {
            let config = ConfigObject::new("t", tag);
            restored.add_config(config.clone()).unwrap();
            restored.add_desired_config(&config).unwrap();
        }
        assert_eq!(restored.desired_config_history("t").unwrap().len(), 1);
    }

    #[test]
    fn test_load_rejects_dangling_desired_config() {
        let cluster = ClusterCore::new(1, "c1");
        let config = ConfigObject::new("t", "v1");
        cluster.add_config(config.clone()).unwrap();
        cluster.add_desired_config(&config).unwrap();

        let mut state = cluster.snapshot().unwrap();
        state.configs.clear();
        assert!(matches!(
            ClusterCore::load(state, &ClusterSettings::default()),
            Err(ClusterError::ConfigNotFound { .. })
        ));
    }

    #[test]
    fn test_convert_to_response() {
        let settings = ClusterSettings {
            initial_stack: Some("HDP-1.3.0".to_string()),
            ..ClusterSettings::new(9, "prod")
        };
        let cluster = ClusterCore::from_settings(&settings).unwrap();
        cluster.add_service("HDFS").unwrap();
        cluster
            .add_service_component_host("HDFS", "DATANODE", "h2", HostComponentState::Installed)
            .unwrap();
        cluster
            .add_service_component_host("HDFS", "NAMENODE", "h1", HostComponentState::Installed)
            .unwrap();

        let response = cluster.convert_to_response().unwrap();
        assert_eq!(response.cluster_id, 9);
        assert_eq!(response.cluster_name, "prod");
        assert_eq!(response.host_names, vec!["h1", "h2"]);
        assert_eq!(response.current_stack_version.as_deref(), Some("HDP-1.3.0"));
    }

    #[test]
    fn test_debug_dump() {
        let cluster = ClusterCore::new(1, "c1");
        let config = ConfigObject::new("core-site", "v1");
        cluster.add_config(config.clone()).unwrap();
        cluster.add_desired_config(&config).unwrap();
        cluster
            .add_service_object(Service::new("HDFS").with_stack(StackId::new("HDP", "2.0.5")))
            .unwrap();
        cluster
            .update_actual_configs("h1", &tags(&[("core-site", "v1")]))
            .unwrap();
        cluster
            .update_actual_configs("h2", &tags(&[("core-site", "v0")]))
            .unwrap();

        let before = cluster.snapshot().unwrap();
        let mut out = String::from("prefix\n");
        cluster.debug_dump(&mut out).unwrap();

        assert!(out.starts_with("prefix\nCluster={ clusterName=c1"));
        assert!(out.contains("    HDFS (version 1"));
        assert!(out.contains("desiredStack=HDP-2.0.5"));
        assert!(out.contains("core-site -> v1"));
        assert!(out.contains("core-site: DRIFT [h1=v1, h2=v0]"));

        let after = cluster.snapshot().unwrap();
        assert_eq!(before.services, after.services);
        assert_eq!(before.actual_reports, after.actual_reports);
    }
}
