//! Layered, versioned cluster configuration
//!
//! Three layers are tracked per config type:
//! - every stored version (`ConfigStore`)
//! - the one version the orchestrator wants applied (`DesiredConfigSelector`)
//! - the version each host says it has applied (`ActualConfigLedger`)

pub mod actual;
pub mod desired;
pub mod object;
pub mod store;

pub use actual::{ActualConfigLedger, ActualConfigReport, ActualConfigView, DriftCache, HostTag};
pub use desired::{DesiredConfig, DesiredConfigSelector};
pub use object::ConfigObject;
pub use store::ConfigStore;
