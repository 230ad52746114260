//! Change notifications for the persistence collaborator

use crate::services::HostComponentState;
use crate::stack::StackId;
use serde::{Deserialize, Serialize};

/// A committed change to cluster state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClusterEvent {
    ClusterRenamed {
        name: String,
    },
    ServiceAdded {
        service: String,
    },
    ServiceRemoved {
        service: String,
    },
    ComponentHostChanged {
        service: String,
        component: String,
        host: String,
        state: HostComponentState,
    },
    ConfigAdded {
        config_type: String,
        tag: String,
    },
    DesiredConfigSelected {
        config_type: String,
        tag: String,
        previous_tag: Option<String>,
    },
    ActualConfigsUpdated {
        host: String,
        config_types: Vec<String>,
    },
    HostForgotten {
        host: String,
    },
    DesiredStackChanged {
        stack: StackId,
    },
    CurrentStackChanged {
        stack: StackId,
        previous: Option<StackId>,
    },
    ClusterDeleted,
}

/// Receives every committed change, after the change is visible
///
/// Events from one lock domain arrive in the order their changes were
/// committed. Listeners run outside cluster locks, so they may read the
/// cluster back or mutate it. A mutation that commits while another thread is
/// delivering returns before its own event is delivered; that thread delivers
/// it in order.
pub trait ClusterListener: Send + Sync {
    fn on_event(&self, event: &ClusterEvent);
}
