//! Transition-related types for workflows

use crate::workflow::NodeId;
use serde::{Deserialize, Serialize};

/// Represents a directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Source node ID
    pub from: NodeId,
    /// Target node ID
    pub to: NodeId,
    /// Optional label used when presenting the transition as a choice
    pub condition: Option<String>,
}

impl Transition {
    /// Create an unconditional transition
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }

    /// Attach a condition label
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// A designated entry node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartPoint {
    /// The node the workflow enters at
    pub node_id: NodeId,
}

impl StartPoint {
    /// Create a start point
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.condition {
            Some(condition) => write!(f, "{} --> {} : {}", self.from, self.to, condition),
            None => write!(f, "{} --> {}", self.from, self.to),
        }
    }
}
