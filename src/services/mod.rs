//! Cluster services
//!
//! Services, the components they deploy on hosts, and the guards that decide
//! when a service may be removed.

pub mod component_host;
pub mod registry;
pub mod service;

pub use component_host::{HostComponentState, ServiceComponentHost};
pub use registry::ServiceRegistry;
pub use service::{Service, ServiceComponent};
