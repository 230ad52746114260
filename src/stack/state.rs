//! Current and desired stack version

use super::id::StackId;
use super::metadata::StackMetadata;
use crate::error::{ClusterError, Result};
use serde::{Deserialize, Serialize};

/// Proof that every service was checked against a target stack
///
/// Only `StackVersionState::verify_transition` can build one, so the current
/// stack cannot be moved without the compatibility check having passed.
#[derive(Debug)]
pub struct VerifiedTransition {
    target: StackId,
}

impl VerifiedTransition {
    /// The stack that was verified
    pub fn target(&self) -> &StackId {
        &self.target
    }
}

/// The cluster's current and desired stack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackVersionState {
    current: Option<StackId>,
    desired: Option<StackId>,
}

impl StackVersionState {
    /// Create a state with both versions set to `stack`
    pub fn new(stack: Option<StackId>) -> Self {
        Self {
            current: stack.clone(),
            desired: stack,
        }
    }

    /// Desired stack
    pub fn desired(&self) -> Option<StackId> {
        self.desired.clone()
    }

    /// Set the desired stack. Advisory; not validated.
    pub fn set_desired(&mut self, stack: StackId) -> Option<StackId> {
        self.desired.replace(stack)
    }

    /// Current stack
    pub fn current(&self) -> Option<StackId> {
        self.current.clone()
    }

    /// Check every service against `target`
    pub fn verify_transition<'a, I>(
        target: &StackId,
        services: I,
        metadata: &dyn StackMetadata,
    ) -> Result<VerifiedTransition>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for service in services {
            if !metadata.supports(service, target) {
                return Err(ClusterError::StackVersionTransition {
                    service: service.to_string(),
                    stack: target.to_string(),
                });
            }
        }
        Ok(VerifiedTransition {
            target: target.clone(),
        })
    }

    /// Commit a verified transition. Returns the previous current stack.
    pub fn set_current(&mut self, verified: VerifiedTransition) -> Option<StackId> {
        self.current.replace(verified.target)
    }

    /// True if a desired stack is set and differs from the current one
    pub fn transition_pending(&self) -> bool {
        match (&self.current, &self.desired) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(current), Some(desired)) => current != desired,
        }
    }

    /// Clear both versions
    pub fn clear(&mut self) {
        self.current = None;
        self.desired = None;
    }
}
