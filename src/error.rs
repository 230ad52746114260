//! Error types for Strata

use thiserror::Error;

/// Result type for Strata operations
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Strata error types
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Config already exists with different content: {config_type}/{tag}")]
    DuplicateConfig { config_type: String, tag: String },

    #[error("Config not found: {config_type}/{tag}")]
    ConfigNotFound { config_type: String, tag: String },

    #[error("Service already exists: {0}")]
    DuplicateService(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Component host not found: {service}/{component} on {host}")]
    ComponentHostNotFound {
        service: String,
        component: String,
        host: String,
    },

    #[error(
        "Service {service} has active component {component} on {host} (state: {state})"
    )]
    ServiceHasActiveComponents {
        service: String,
        component: String,
        host: String,
        state: String,
    },

    #[error("Cannot move to stack {stack}: service {service} has no mapping")]
    StackVersionTransition { service: String, stack: String },

    #[error("Cluster cannot be removed: {0}")]
    ClusterNotRemovable(String),

    #[error("Invalid stack id: {0}")]
    InvalidStackId(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(String),
}
