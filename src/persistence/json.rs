//! Cluster state stored as a single JSON document

use crate::cluster::{Cluster, ClusterEvent, ClusterListener, ClusterState};
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// JSON file holding one cluster's state
///
/// Registered as a listener, it counts committed changes so callers know
/// whether a save is due.
#[derive(Debug)]
pub struct JsonFileStore {
    /// File path
    path: PathBuf,
    /// Changes seen since the last save
    dirty: AtomicUsize,
}

impl JsonFileStore {
    /// Create a store backed by `path`; the file need not exist yet
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            dirty: AtomicUsize::new(0),
        }
    }

    /// File path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load saved state, or `None` if nothing was saved yet
    pub fn load(&self) -> Result<Option<ClusterState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let state: ClusterState = serde_json::from_str(&content)?;
        Ok(Some(state))
    }

    /// Write state; the change count is left alone
    pub fn save(&self, state: &ClusterState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write beside the target, then rename over it
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!(path = %self.path.display(), "cluster state saved");
        Ok(())
    }

    /// Snapshot `cluster`, write it and clear the changes it covers
    ///
    /// Changes are counted only after they commit, so every change counted
    /// before the snapshot is in it. Changes counted later stay dirty.
    pub fn save_cluster(&self, cluster: &dyn Cluster) -> Result<()> {
        let pending = self.dirty();
        self.save(&cluster.snapshot()?)?;
        self.mark_saved(pending);
        Ok(())
    }

    /// Forget `count` changes that a completed save covered
    pub fn mark_saved(&self, count: usize) {
        let _ = self
            .dirty
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(count))
            });
    }

    /// Changes seen since the last save
    pub fn dirty(&self) -> usize {
        self.dirty.load(Ordering::Acquire)
    }
}

impl ClusterListener for JsonFileStore {
    fn on_event(&self, _event: &ClusterEvent) {
        self.dirty.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{Cluster, ClusterCore, ClusterSettings};
    use crate::configs::ConfigObject;
    use std::sync::Arc;

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("cluster.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path().join("state/cluster.json")));

        let cluster = ClusterCore::new(2, "c2");
        cluster.add_listener(store.clone()).unwrap();
        let config = ConfigObject::new("core-site", "v1").property("fs.defaultFS", "hdfs://nn");
        cluster.add_config(config.clone()).unwrap();
        cluster.add_desired_config(&config).unwrap();
        cluster.add_service("HDFS").unwrap();
        assert_eq!(store.dirty(), 3);

        store.save_cluster(&cluster).unwrap();
        assert_eq!(store.dirty(), 0);

        let state = store.load().unwrap().unwrap();
        let restored = ClusterCore::load(state, &ClusterSettings::default()).unwrap();
        assert_eq!(restored.cluster_name().unwrap(), "c2");
        assert_eq!(restored.get_config("core-site", "v1").unwrap(), Some(config));
        assert!(restored.get_service("HDFS").is_ok());
    }

    #[test]
    fn test_change_after_snapshot_stays_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path().join("cluster.json")));

        let cluster = ClusterCore::new(3, "c3");
        cluster.add_listener(store.clone()).unwrap();
        cluster.add_config(ConfigObject::new("t", "v1")).unwrap();

        let pending = store.dirty();
        let state = cluster.snapshot().unwrap();
        cluster.add_config(ConfigObject::new("t", "v2")).unwrap();
        store.save(&state).unwrap();
        store.mark_saved(pending);

        assert_eq!(store.dirty(), 1);
        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.configs.len(), 1);

        store.save_cluster(&cluster).unwrap();
        assert_eq!(store.dirty(), 0);
        assert_eq!(store.load().unwrap().unwrap().configs.len(), 2);
    }

    #[test]
    fn test_mark_saved_saturates() {
        let store = JsonFileStore::new(std::path::PathBuf::from("unused.json"));
        store.on_event(&ClusterEvent::ClusterDeleted);
        store.mark_saved(5);
        assert_eq!(store.dirty(), 0);
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::new(path);
        assert!(store.load().is_err());
    }
}
