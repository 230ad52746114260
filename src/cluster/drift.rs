//! Desired-versus-actual comparison

use crate::configs::{ActualConfigView, DesiredConfig, HostTag};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How one config type's hosts relate to its desired version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConfigDrift {
    /// All reporting hosts applied the desired tag
    InSync { tag: String },
    /// Reporting hosts disagree with each other
    HostsDisagree {
        desired: Option<String>,
        conflicts: BTreeSet<HostTag>,
    },
    /// Hosts agree, but on a tag other than the desired one
    Stale { desired: String, actual: String },
    /// A tag is desired but no host has reported the type
    NotReported { desired: String },
    /// Hosts report the type but nothing is desired for it
    Undesired { actual: String },
}

impl ConfigDrift {
    /// True only for `InSync`
    pub fn is_in_sync(&self) -> bool {
        matches!(self, ConfigDrift::InSync { .. })
    }
}

/// Classify every type that is desired or reported
pub fn classify(
    desired: &BTreeMap<String, DesiredConfig>,
    actual: &BTreeMap<String, ActualConfigView>,
) -> BTreeMap<String, ConfigDrift> {
    let types: BTreeSet<&String> = desired.keys().chain(actual.keys()).collect();

    types
        .into_iter()
        .filter_map(|config_type| {
            let want = desired.get(config_type).map(|d| d.tag.clone());
            let drift = match (want, actual.get(config_type)) {
                (want, Some(ActualConfigView::Drift { conflicts })) => ConfigDrift::HostsDisagree {
                    desired: want,
                    conflicts: conflicts.clone(),
                },
                (Some(want), Some(ActualConfigView::Agreed { tag, .. })) if *tag == want => {
                    ConfigDrift::InSync { tag: want }
                }
                (Some(want), Some(ActualConfigView::Agreed { tag, .. })) => ConfigDrift::Stale {
                    desired: want,
                    actual: tag.clone(),
                },
                (None, Some(ActualConfigView::Agreed { tag, .. })) => {
                    ConfigDrift::Undesired { actual: tag.clone() }
                }
                (Some(want), None) => ConfigDrift::NotReported { desired: want },
                (None, None) => return None,
            };
            Some((config_type.clone(), drift))
        })
        .collect()
}
