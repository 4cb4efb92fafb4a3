//! Workflow instance runtime state

use crate::workflow::{NodeId, WorkflowId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Variable updates returned by action handlers
pub type VariableUpdates = HashMap<String, String>;

/// Runtime state of one workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Current node, `None` until the workflow is started
    pub current_node: Option<NodeId>,
    /// Instance variables
    pub variables: HashMap<String, String>,
    /// When the instance was created
    pub created_at: DateTime<Utc>,
}

impl WorkflowInstance {
    /// Create an unstarted instance
    pub fn new() -> Self {
        Self {
            current_node: None,
            variables: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Whether the instance has a current node
    pub fn is_started(&self) -> bool {
        self.current_node.is_some()
    }

    /// Move to a node
    pub fn transition_to(&mut self, node_id: NodeId) {
        self.current_node = Some(node_id);
    }
}

impl Default for WorkflowInstance {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide table of workflow instances keyed by workflow id
///
/// Each instance is owned by its workflow id; the map itself is safe to use
/// from many tasks at once.
#[derive(Debug, Default)]
pub struct InstanceManager {
    instances: DashMap<WorkflowId, WorkflowInstance>,
}

impl InstanceManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unstarted instance if none exists
    pub fn ensure(&self, id: &WorkflowId) {
        self.instances.entry(id.clone()).or_default();
    }

    /// Whether an instance exists
    pub fn contains(&self, id: &WorkflowId) -> bool {
        self.instances.contains_key(id)
    }

    /// Snapshot of an instance
    pub fn get(&self, id: &WorkflowId) -> Option<WorkflowInstance> {
        self.instances.get(id).map(|entry| entry.value().clone())
    }

    /// Current node of an instance
    pub fn current_node(&self, id: &WorkflowId) -> Option<NodeId> {
        self.instances
            .get(id)
            .and_then(|entry| entry.current_node.clone())
    }

    /// Move an instance to a node, creating the instance if needed
    pub fn set_current_node(&self, id: &WorkflowId, node_id: NodeId) {
        self.instances
            .entry(id.clone())
            .or_default()
            .transition_to(node_id);
    }

    /// Put an instance back into the unstarted state, keeping its variables
    pub fn clear_current_node(&self, id: &WorkflowId) {
        if let Some(mut entry) = self.instances.get_mut(id) {
            entry.current_node = None;
        }
    }

    /// Copy of an instance's variables; empty when the instance does not exist
    pub fn variables(&self, id: &WorkflowId) -> HashMap<String, String> {
        self.instances
            .get(id)
            .map(|entry| entry.variables.clone())
            .unwrap_or_default()
    }

    /// Read one variable
    pub fn variable(&self, id: &WorkflowId, key: &str) -> Option<String> {
        self.instances
            .get(id)
            .and_then(|entry| entry.variables.get(key).cloned())
    }

    /// Set one variable, creating the instance if needed
    pub fn set_variable(&self, id: &WorkflowId, key: impl Into<String>, value: impl Into<String>) {
        self.instances
            .entry(id.clone())
            .or_default()
            .variables
            .insert(key.into(), value.into());
    }

    /// Merge updates into an instance, overwriting existing keys
    pub fn merge_variables(&self, id: &WorkflowId, updates: VariableUpdates) {
        if updates.is_empty() {
            return;
        }
        self.instances
            .entry(id.clone())
            .or_default()
            .variables
            .extend(updates);
    }

    /// Drop an instance
    pub fn remove(&self, id: &WorkflowId) -> Option<WorkflowInstance> {
        self.instances.remove(id).map(|(_, instance)| instance)
    }

    /// Drop every instance
    pub fn reset(&self) {
        self.instances.clear();
    }
}
