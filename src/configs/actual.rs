//! Host-reported actual configs and the cluster-wide agreement view
//!
//! Every host owns one bucket of reports. A host update locks only its own
//! bucket, so hosts never block each other. The cross-host view read-locks
//! every bucket at once, which means it never observes a batch from one host
//! half applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

use crate::error::{ClusterError, Result};

/// The tag a host last reported as applied for one config type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualConfigReport {
    /// Reporting host
    pub host: String,
    /// Config type
    pub config_type: String,
    /// Applied tag
    pub tag: String,
    /// When the report was recorded
    pub reported_at: DateTime<Utc>,
}

/// One (host, tag) pair taking part in a disagreement
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostTag {
    pub host: String,
    pub tag: String,
}

impl HostTag {
    pub fn new(host: &str, tag: &str) -> Self {
        Self {
            host: host.to_string(),
            tag: tag.to_string(),
        }
    }
}

/// Cluster-wide verdict for one config type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ActualConfigView {
    /// Every reporting host applied the same tag
    Agreed { tag: String, host_count: usize },
    /// Reporting hosts disagree; every (host, tag) pair for the type
    Drift { conflicts: BTreeSet<HostTag> },
}

impl ActualConfigView {
    /// The agreed tag, if there is agreement
    pub fn tag(&self) -> Option<&str> {
        match self {
            ActualConfigView::Agreed { tag, .. } => Some(tag),
            ActualConfigView::Drift { .. } => None,
        }
    }

    /// True if hosts disagree
    pub fn is_drift(&self) -> bool {
        matches!(self, ActualConfigView::Drift { .. })
    }

    /// Distinct tags reported for the type
    pub fn tags(&self) -> BTreeSet<&str> {
        match self {
            ActualConfigView::Agreed { tag, .. } => std::iter::once(tag.as_str()).collect(),
            ActualConfigView::Drift { conflicts } => {
                conflicts.iter().map(|c| c.tag.as_str()).collect()
            }
        }
    }
}

impl std::fmt::Display for ActualConfigView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActualConfigView::Agreed { tag, host_count } => {
                write!(f, "{} ({} hosts)", tag, host_count)
            }
            ActualConfigView::Drift { conflicts } => {
                write!(f, "DRIFT [")?;
                for (i, c) in conflicts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", c.host, c.tag)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Memo of the last computed view, stamped with the ledger generation it was
/// computed at. A stamp that differs from the current generation is a miss.
#[derive(Debug, Default)]
pub struct DriftCache {
    entry: Mutex<Option<(u64, BTreeMap<String, ActualConfigView>)>>,
}

impl DriftCache {
    fn get(&self, generation: u64) -> Result<Option<BTreeMap<String, ActualConfigView>>> {
        let entry = self
            .entry
            .lock()
            .map_err(|_| ClusterError::Lock("Failed to acquire drift cache lock".to_string()))?;

        Ok(entry
            .as_ref()
            .filter(|(stamp, _)| *stamp == generation)
            .map(|(_, view)| view.clone()))
    }

    fn put(&self, generation: u64, view: BTreeMap<String, ActualConfigView>) -> Result<()> {
        let mut entry = self
            .entry
            .lock()
            .map_err(|_| ClusterError::Lock("Failed to acquire drift cache lock".to_string()))?;

        // Never replace a newer entry with an older computation
        if entry.as_ref().map(|(stamp, _)| *stamp <= generation).unwrap_or(true) {
            *entry = Some((generation, view));
        }
        Ok(())
    }

    fn is_fresh(&self, generation: u64) -> Result<bool> {
        Ok(self.get(generation)?.is_some())
    }
}

type HostReports = BTreeMap<String, ActualConfigReport>;
type HostBucket = Arc<RwLock<HostReports>>;

/// Per-host, per-type record of applied config tags
#[derive(Debug, Default)]
pub struct ActualConfigLedger {
    hosts: RwLock<BTreeMap<String, HostBucket>>,
    /// Bumped after every write; stamps the drift cache
    generation: AtomicU64,
    cache: DriftCache,
}

impl ActualConfigLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the tags a host reports as applied
    ///
    /// Only the types present in `tags_by_type` are overwritten for `host`.
    pub fn update_actual_configs(
        &self,
        host: &str,
        tags_by_type: &HashMap<String, String>,
    ) -> Result<()> {
        self.update_actual_configs_with(host, tags_by_type, || Ok(()))
    }

    /// Like `update_actual_configs`, running `on_commit` while the host's
    /// bucket is still write-locked
    ///
    /// Two batches for the same host run their hooks in the order the
    /// batches were applied.
    pub fn update_actual_configs_with<F>(
        &self,
        host: &str,
        tags_by_type: &HashMap<String, String>,
        on_commit: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        if tags_by_type.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        {
            let hosts = self
                .hosts
                .read()
                .map_err(|_| ClusterError::Lock("Failed to acquire read lock".to_string()))?;

            if let Some(bucket) = hosts.get(host) {
                apply_reports(bucket, host, tags_by_type, now, on_commit)?;
                self.invalidate();
                return Ok(());
            }
        }

        // First report from this host
        let mut hosts = self
            .hosts
            .write()
            .map_err(|_| ClusterError::Lock("Failed to acquire write lock".to_string()))?;

        let bucket = hosts.entry(host.to_string()).or_default();
        apply_reports(bucket, host, tags_by_type, now, on_commit)?;
        self.invalidate();
        Ok(())
    }

    /// Cluster-wide agreement/drift view per config type
    pub fn get_actual_configs(&self) -> Result<BTreeMap<String, ActualConfigView>> {
        let generation = self.generation.load(Ordering::Acquire);
        if let Some(view) = self.cache.get(generation)? {
            return Ok(view);
        }

        let view = {
            let hosts = self
                .hosts
                .read()
                .map_err(|_| ClusterError::Lock("Failed to acquire read lock".to_string()))?;
            let buckets = lock_all(&hosts)?;
            compute_view(&buckets)
        };

        tracing::debug!(
            generation,
            types = view.len(),
            "recomputed actual config view"
        );
        self.cache.put(generation, view.clone())?;
        Ok(view)
    }

    /// Raw reports of one host, keyed by config type
    pub fn get_host_actual_configs(&self, host: &str) -> Result<BTreeMap<String, ActualConfigReport>> {
        let hosts = self
            .hosts
            .read()
            .map_err(|_| ClusterError::Lock("Failed to acquire read lock".to_string()))?;

        match hosts.get(host) {
            Some(bucket) => {
                let reports = bucket
                    .read()
                    .map_err(|_| ClusterError::Lock("Failed to acquire read lock".to_string()))?;
                Ok(reports.clone())
            }
            None => Ok(BTreeMap::new()),
        }
    }

    /// Hosts that have reported at least once, sorted
    pub fn reporting_hosts(&self) -> Result<Vec<String>> {
        let hosts = self
            .hosts
            .read()
            .map_err(|_| ClusterError::Lock("Failed to acquire read lock".to_string()))?;

        Ok(hosts.keys().cloned().collect())
    }

    /// Drop every report of a host. Returns false if the host never reported.
    pub fn forget_host(&self, host: &str) -> Result<bool> {
        self.forget_host_with(host, || Ok(()))
    }

    /// Like `forget_host`, running `on_commit` under the host map write lock
    /// when the host was removed
    pub fn forget_host_with<F>(&self, host: &str, on_commit: F) -> Result<bool>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut hosts = self
            .hosts
            .write()
            .map_err(|_| ClusterError::Lock("Failed to acquire write lock".to_string()))?;

        let removed = hosts.remove(host).is_some();
        if removed {
            on_commit()?;
            self.invalidate();
        }
        Ok(removed)
    }

    /// Every report across all hosts, taken as one consistent snapshot
    pub fn all_reports(&self) -> Result<Vec<ActualConfigReport>> {
        let hosts = self
            .hosts
            .read()
            .map_err(|_| ClusterError::Lock("Failed to acquire read lock".to_string()))?;
        let buckets = lock_all(&hosts)?;

        let reports: Vec<ActualConfigReport> = buckets
            .iter()
            .flat_map(|(_, reports)| reports.values().cloned())
            .collect();
        Ok(reports)
    }

    /// Replace the whole ledger with persisted reports
    pub fn restore(&self, reports: Vec<ActualConfigReport>) -> Result<()> {
        let mut grouped: BTreeMap<String, HostReports> = BTreeMap::new();
        for report in reports {
            grouped
                .entry(report.host.clone())
                .or_default()
                .insert(report.config_type.clone(), report);
        }

        let mut hosts = self
            .hosts
            .write()
            .map_err(|_| ClusterError::Lock("Failed to acquire write lock".to_string()))?;

        *hosts = grouped
            .into_iter()
            .map(|(host, reports)| (host, Arc::new(RwLock::new(reports))))
            .collect();
        self.invalidate();
        Ok(())
    }

    /// Drop every report
    pub fn clear(&self) -> Result<()> {
        self.restore(Vec::new())
    }

    /// Invalidate the cached view
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// True if the next `get_actual_configs` would be served from cache
    pub fn has_fresh_view(&self) -> Result<bool> {
        self.cache.is_fresh(self.generation.load(Ordering::Acquire))
    }
}

fn apply_reports<F>(
    bucket: &HostBucket,
    host: &str,
    tags_by_type: &HashMap<String, String>,
    now: DateTime<Utc>,
    on_commit: F,
) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    let mut reports = bucket
        .write()
        .map_err(|_| ClusterError::Lock("Failed to acquire host lock".to_string()))?;

    for (config_type, tag) in tags_by_type {
        reports.insert(
            config_type.clone(),
            ActualConfigReport {
                host: host.to_string(),
                config_type: config_type.clone(),
                tag: tag.clone(),
                reported_at: now,
            },
        );
    }
    on_commit()
}

/// Read-lock every bucket, in host order
fn lock_all(
    hosts: &BTreeMap<String, HostBucket>,
) -> Result<Vec<(&str, RwLockReadGuard<'_, HostReports>)>> {
    hosts
        .iter()
        .map(|(host, bucket)| {
            bucket
                .read()
                .map(|guard| (host.as_str(), guard))
                .map_err(|_| ClusterError::Lock("Failed to acquire host lock".to_string()))
        })
        .collect()
}

/// Classify each type as agreed or drifting in one pass over the reports
fn compute_view(
    buckets: &[(&str, RwLockReadGuard<'_, HostReports>)],
) -> BTreeMap<String, ActualConfigView> {
    // type -> tag -> hosts
    let mut by_type: BTreeMap<&str, BTreeMap<&str, Vec<&str>>> = BTreeMap::new();
    for (host, reports) in buckets {
        for (config_type, report) in reports.iter() {
            by_type
                .entry(config_type.as_str())
                .or_default()
                .entry(report.tag.as_str())
                .or_default()
                .push(*host);
        }
    }

    by_type
        .into_iter()
        .map(|(config_type, tags)| {
            let view = if tags.len() == 1 {
                let (tag, hosts) = tags.into_iter().next().unwrap_or_default();
                ActualConfigView::Agreed {
                    tag: tag.to_string(),
                    host_count: hosts.len(),
                }
            } else {
                let conflicts = tags
                    .into_iter()
                    .flat_map(|(tag, hosts)| hosts.into_iter().map(move |h| HostTag::new(h, tag)))
                    .collect();
                ActualConfigView::Drift { conflicts }
            };
            (config_type.to_string(), view)
        })
        .collect()
}
