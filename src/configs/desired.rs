//! Desired config selection

use super::object::ConfigObject;
use super::store::ConfigStore;
use crate::error::{ClusterError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Default number of superseded selections kept per type
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// The currently desired version of one config type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredConfig {
    /// Config type
    pub config_type: String,
    /// Selected tag
    pub tag: String,
    /// Service the selection was made for
    #[serde(default)]
    pub service: Option<String>,
    /// Who made the selection
    #[serde(default)]
    pub user: Option<String>,
    /// When the selection was made
    pub selected_at: DateTime<Utc>,
}

/// Per-type pointer to the desired stored config
#[derive(Debug, Clone)]
pub struct DesiredConfigSelector {
    selected: HashMap<String, DesiredConfig>,
    /// Superseded selections, newest first
    history: HashMap<String, VecDeque<DesiredConfig>>,
    history_limit: usize,
}

impl Default for DesiredConfigSelector {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl DesiredConfigSelector {
    /// Create a selector keeping `history_limit` superseded entries per type
    pub fn new(history_limit: usize) -> Self {
        Self {
            selected: HashMap::new(),
            history: HashMap::new(),
            history_limit,
        }
    }

    /// Select `config` as desired for its type
    ///
    /// The config must already be in `store`. Only its type and tag are
    /// read; the owning service comes from the stored copy.
    /// Returns the superseded selection, if there was one.
    pub fn add_desired_config(
        &mut self,
        store: &ConfigStore,
        config: &ConfigObject,
        user: Option<&str>,
    ) -> Result<Option<DesiredConfig>> {
        let stored = store
            .get_config(&config.config_type, &config.tag)
            .ok_or_else(|| ClusterError::ConfigNotFound {
                config_type: config.config_type.clone(),
                tag: config.tag.clone(),
            })?;

        let desired = DesiredConfig {
            config_type: stored.config_type,
            tag: stored.tag,
            service: stored.service,
            user: user.map(str::to_string),
            selected_at: Utc::now(),
        };

        let previous = self.selected.insert(desired.config_type.clone(), desired);
        if let Some(ref prev) = previous {
            self.record_history(prev.clone());
        }
        Ok(previous)
    }

    /// Restore a selection verbatim (used when loading persisted state)
    pub(crate) fn restore(&mut self, desired: DesiredConfig) {
        self.selected.insert(desired.config_type.clone(), desired);
    }

    /// Restore superseded selections for a type, newest first
    pub(crate) fn restore_history(&mut self, config_type: &str, entries: Vec<DesiredConfig>) {
        if self.history_limit == 0 || entries.is_empty() {
            return;
        }
        let mut entries: VecDeque<DesiredConfig> = entries.into();
        entries.truncate(self.history_limit);
        self.history.insert(config_type.to_string(), entries);
    }

    /// Superseded selections of every type, newest first
    pub fn history(&self) -> BTreeMap<String, Vec<DesiredConfig>> {
        self.history
            .iter()
            .map(|(t, entries)| (t.clone(), entries.iter().cloned().collect()))
            .collect()
    }

    /// Superseded selections kept per type
    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    fn record_history(&mut self, superseded: DesiredConfig) {
        if self.history_limit == 0 {
            return;
        }
        let entries = self
            .history
            .entry(superseded.config_type.clone())
            .or_default();
        entries.push_front(superseded);
        entries.truncate(self.history_limit);
    }

    /// Current selection for a type
    pub fn get_desired_config_by_type(&self, config_type: &str) -> Option<DesiredConfig> {
        self.selected.get(config_type).cloned()
    }

    /// All current selections, keyed by type
    pub fn get_desired_configs(&self) -> BTreeMap<String, DesiredConfig> {
        self.selected
            .iter()
            .map(|(t, d)| (t.clone(), d.clone()))
            .collect()
    }

    /// Superseded selections for a type, newest first
    pub fn desired_config_history(&self, config_type: &str) -> Vec<DesiredConfig> {
        self.history
            .get(config_type)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop all selections and history
    pub fn clear(&mut self) {
        self.selected.clear();
        self.history.clear();
    }
}
