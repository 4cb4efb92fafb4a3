//! Workflow definition type and structural validation

use crate::workflow::{NodeId, StartPoint, Transition, WorkflowNode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur when creating definition-related types
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// Workflow ID cannot be empty or whitespace only
    #[error("Workflow ID cannot be empty or whitespace only")]
    EmptyWorkflowId,
}

/// Result type for definition operations
pub type DefinitionResult<T> = Result<T, DefinitionError>;

/// Identifier shared by a workflow definition and its runtime instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    /// Create a new workflow ID, returning an error for empty input
    pub fn try_new(id: impl Into<String>) -> DefinitionResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DefinitionError::EmptyWorkflowId);
        }
        Ok(Self(id))
    }

    /// Generate a fresh, globally unique ID
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable graph parsed from one diagram source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow ID
    pub id: WorkflowId,
    /// Display name
    pub name: String,
    /// Nodes in declaration order
    pub nodes: Vec<WorkflowNode>,
    /// Transitions in declaration order
    pub transitions: Vec<Transition>,
    /// Designated entry nodes
    pub start_points: Vec<StartPoint>,
    /// Diagram text the definition was parsed from
    pub source: Option<String>,
}

impl WorkflowDefinition {
    /// Create an empty definition
    pub fn new(id: WorkflowId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            nodes: Vec::new(),
            transitions: Vec::new(),
            start_points: Vec::new(),
            source: None,
        }
    }

    /// Look up a node by ID
    pub fn node(&self, id: &NodeId) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Whether a node with this ID exists
    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Outgoing transitions of a node, in declaration order
    pub fn outgoing(&self, id: &NodeId) -> Vec<&Transition> {
        self.transitions.iter().filter(|t| &t.from == id).collect()
    }

    /// Add a node, replacing any node with the same ID in place
    pub fn add_node(&mut self, node: WorkflowNode) {
        match self.nodes.iter_mut().find(|n| n.id == node.id) {
            Some(existing) => *existing = node,
            None => self.nodes.push(node),
        }
    }

    /// Add a transition
    pub fn add_transition(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    /// Add a start point
    pub fn add_start_point(&mut self, start_point: StartPoint) {
        self.start_points.push(start_point);
    }

    /// Check graph integrity: unique node IDs and resolvable references
    pub fn validate_structure(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for node in &self.nodes {
            if !seen.insert(&node.id) {
                errors.push(format!("Duplicate node ID '{}'", node.id));
            }
        }

        for (index, transition) in self.transitions.iter().enumerate() {
            if !seen.contains(&transition.from) {
                errors.push(format!(
                    "Transition #{} references non-existent source node: '{}'",
                    index, transition.from
                ));
            }
            if !seen.contains(&transition.to) {
                errors.push(format!(
                    "Transition #{} references non-existent target node: '{}'",
                    index, transition.to
                ));
            }
        }

        for start_point in &self.start_points {
            if !seen.contains(&start_point.node_id) {
                errors.push(format!(
                    "Start point references non-existent node: '{}'",
                    start_point.node_id
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
