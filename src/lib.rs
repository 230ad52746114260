//! Strata - layered, versioned cluster configuration state
//!
//! Strata keeps the configuration state of a managed cluster consistent under
//! concurrent mutation. It provides:
//!
//! - Immutable, versioned config objects addressed by type and tag
//! - One desired version per config type, with selection history
//! - Per-host reports of applied versions and cross-host drift detection
//! - Services, their component deployments and removal guards
//! - Current and desired platform stack versions with a checked transition
//! - JSON snapshot persistence

pub mod cluster;
pub mod configs;
pub mod error;
pub mod persistence;
pub mod services;
pub mod stack;

pub use cluster::{Cluster, ClusterCore, ClusterSettings};
pub use error::{ClusterError, Result};
