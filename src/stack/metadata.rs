//! Stack compatibility lookups

use super::id::StackId;
use std::collections::{HashMap, HashSet};

/// Answers whether a service can run on a stack
///
/// Implemented outside the cluster by whatever holds stack definitions.
pub trait StackMetadata: Send + Sync {
    /// True if `service` has a definition in `stack`
    fn supports(&self, service: &str, stack: &StackId) -> bool;
}

/// In-memory stack catalog: stack -> services it defines
#[derive(Debug, Clone, Default)]
pub struct StackCatalog {
    stacks: HashMap<StackId, HashSet<String>>,
}

impl StackCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stack and the services it defines
    pub fn stack<I, S>(mut self, stack: StackId, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stacks
            .entry(stack)
            .or_default()
            .extend(services.into_iter().map(Into::into));
        self
    }

    /// Known stacks
    pub fn stacks(&self) -> Vec<StackId> {
        let mut stacks: Vec<StackId> = self.stacks.keys().cloned().collect();
        stacks.sort();
        stacks
    }
}

impl StackMetadata for StackCatalog {
    fn supports(&self, service: &str, stack: &StackId) -> bool {
        self.stacks
            .get(stack)
            .map(|services| services.contains(service))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lookup() {
        let hdp2 = StackId::new("HDP", "2.0.5");
        let catalog = StackCatalog::new().stack(hdp2.clone(), ["HDFS", "YARN"]);

        assert!(catalog.supports("HDFS", &hdp2));
        assert!(!catalog.supports("HBASE", &hdp2));
        assert!(!catalog.supports("HDFS", &StackId::new("HDP", "1.3.0")));
        assert_eq!(catalog.stacks(), vec![hdp2]);
    }
}
