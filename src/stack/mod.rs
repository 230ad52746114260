//! Platform stack versions
//!
//! Tracks which stack the cluster runs and which it should run, and guards
//! moving the current stack behind a compatibility check.

pub mod id;
pub mod metadata;
pub mod state;

pub use id::StackId;
pub use metadata::{StackCatalog, StackMetadata};
pub use state::{StackVersionState, VerifiedTransition};
