//! Service component deployments on hosts

use serde::{Deserialize, Serialize};

/// Lifecycle state of a component on a host
///
/// Supplied by the component subsystem; the cluster only reads it to decide
/// whether a service may be removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostComponentState {
    /// Initial state
    #[default]
    Init,
    /// Install in progress
    Installing,
    /// Install failed
    InstallFailed,
    /// Installed, not running
    Installed,
    /// Start in progress
    Starting,
    /// Running
    Started,
    /// Stop in progress
    Stopping,
    /// Uninstall in progress
    Uninstalling,
    /// Uninstalled
    Uninstalled,
    /// Wipe-out in progress
    WipingOut,
    /// Upgrade in progress
    Upgrading,
    /// Disabled by the operator
    Disabled,
    /// Not known
    Unknown,
}

impl HostComponentState {
    /// True if a component in this state does not block service removal
    pub fn is_removable(&self) -> bool {
        matches!(
            self,
            HostComponentState::Init
                | HostComponentState::Installing
                | HostComponentState::InstallFailed
                | HostComponentState::Installed
                | HostComponentState::Uninstalled
                | HostComponentState::Disabled
                | HostComponentState::Unknown
        )
    }
}

impl std::fmt::Display for HostComponentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HostComponentState::Init => "INIT",
            HostComponentState::Installing => "INSTALLING",
            HostComponentState::InstallFailed => "INSTALL_FAILED",
            HostComponentState::Installed => "INSTALLED",
            HostComponentState::Starting => "STARTING",
            HostComponentState::Started => "STARTED",
            HostComponentState::Stopping => "STOPPING",
            HostComponentState::Uninstalling => "UNINSTALLING",
            HostComponentState::Uninstalled => "UNINSTALLED",
            HostComponentState::WipingOut => "WIPING_OUT",
            HostComponentState::Upgrading => "UPGRADING",
            HostComponentState::Disabled => "DISABLED",
            HostComponentState::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// One component of one service deployed on one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceComponentHost {
    /// Service name
    pub service: String,
    /// Component name
    pub component: String,
    /// Host name
    pub host: String,
    /// Lifecycle state
    pub state: HostComponentState,
}

impl ServiceComponentHost {
    /// Create a new component-host in the `Init` state
    pub fn new(service: &str, component: &str, host: &str) -> Self {
        Self {
            service: service.to_string(),
            component: component.to_string(),
            host: host.to_string(),
            state: HostComponentState::Init,
        }
    }

    /// Set the state
    pub fn with_state(mut self, state: HostComponentState) -> Self {
        self.state = state;
        self
    }

    /// True if this deployment does not block removal
    pub fn is_removable(&self) -> bool {
        self.state.is_removable()
    }
}
