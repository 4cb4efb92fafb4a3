//! Keyed storage of parsed workflow definitions

use crate::workflow::{WorkflowDefinition, WorkflowId};
use dashmap::DashMap;
use std::sync::Arc;

/// Trait for definition storage backends
///
/// Definitions are immutable once stored and shared as `Arc`s.
pub trait DefinitionStore: Send + Sync {
    /// Store a definition unless one with the same ID already exists.
    ///
    /// Returns the definition that is stored under the ID afterwards.
    fn insert(&self, definition: WorkflowDefinition) -> Arc<WorkflowDefinition>;

    /// Get a definition by ID
    fn get(&self, id: &WorkflowId) -> Option<Arc<WorkflowDefinition>>;

    /// Remove a definition, returning it if present
    fn remove(&self, id: &WorkflowId) -> Option<Arc<WorkflowDefinition>>;

    /// IDs of all stored definitions
    fn ids(&self) -> Vec<WorkflowId>;

    /// Check if a definition exists
    fn contains(&self, id: &WorkflowId) -> bool {
        self.get(id).is_some()
    }
}

/// In-memory definition store
#[derive(Debug, Default)]
pub struct MemoryDefinitionStore {
    definitions: DashMap<WorkflowId, Arc<WorkflowDefinition>>,
}

impl MemoryDefinitionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl DefinitionStore for MemoryDefinitionStore {
    fn insert(&self, definition: WorkflowDefinition) -> Arc<WorkflowDefinition> {
        self.definitions
            .entry(definition.id.clone())
            .or_insert_with(|| Arc::new(definition))
            .value()
            .clone()
    }

    fn get(&self, id: &WorkflowId) -> Option<Arc<WorkflowDefinition>> {
        self.definitions.get(id).map(|entry| entry.value().clone())
    }

    fn remove(&self, id: &WorkflowId) -> Option<Arc<WorkflowDefinition>> {
        self.definitions.remove(id).map(|(_, definition)| definition)
    }

    fn ids(&self) -> Vec<WorkflowId> {
        self.definitions.iter().map(|entry| entry.key().clone()).collect()
    }

    fn contains(&self, id: &WorkflowId) -> bool {
        self.definitions.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::test_helpers::create_linear_definition;

    #[test]
    fn test_insert_and_get() {
        let store = MemoryDefinitionStore::new();
        let stored = store.insert(create_linear_definition("wf", &["A", "B"]));

        let id = WorkflowId::try_new("wf").unwrap();
        assert!(store.contains(&id));
        assert!(Arc::ptr_eq(&stored, &store.get(&id).unwrap()));
    }

    #[test]
    fn test_insert_keeps_first_definition() {
        let store = MemoryDefinitionStore::new();
        store.insert(create_linear_definition("wf", &["A"]));
        let kept = store.insert(create_linear_definition("wf", &["X", "Y", "Z"]));

        assert_eq!(kept.nodes.len(), 1);
        assert_eq!(store.ids().len(), 1);
    }

    #[test]
    fn test_remove() {
        let store = MemoryDefinitionStore::new();
        store.insert(create_linear_definition("wf", &["A"]));
        let id = WorkflowId::try_new("wf").unwrap();

        assert!(store.remove(&id).is_some());
        assert!(!store.contains(&id));
        assert!(store.get(&id).is_none());
    }
}
