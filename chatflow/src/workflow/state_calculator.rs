//! Pure queries over a definition: where a workflow starts and what the
//! current node looks like to a client

use crate::workflow::{NodeId, WorkflowDefinition, WorkflowNode};
use serde::{Deserialize, Serialize};

/// One option offered by a choice node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowChoice {
    /// Text shown to the user
    pub label: String,
    /// Target node ID
    pub value: String,
    /// Position among the node's outgoing transitions
    pub index: usize,
}

/// Client-facing view of the current node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatePayload {
    /// Current node ID, `None` when the workflow has no current node
    pub node_id: Option<NodeId>,
    /// Node label, or the plain note text when the label is empty
    pub display_text: String,
    /// Whether the node has more than one outgoing transition
    pub is_choice: bool,
    /// Options in declaration order; empty unless `is_choice`
    pub choices: Vec<WorkflowChoice>,
    /// Structured note attached to the node, if any
    pub metadata: Option<serde_json::Value>,
}

impl WorkflowStatePayload {
    /// Payload for a missing or unknown node
    pub fn empty() -> Self {
        Self::default()
    }
}

/// The declared entry node before any synthetic start skipping
pub fn raw_start_node(definition: &WorkflowDefinition) -> Option<NodeId> {
    definition
        .start_points
        .first()
        .map(|sp| sp.node_id.clone())
        .or_else(|| definition.nodes.first().map(|n| n.id.clone()))
}

/// Node a fresh instance should rest on
///
/// A synthetic start node (id beginning with `start`, label empty or `start`)
/// with a single successor is skipped in favour of that successor.
pub fn calculate_start_node(definition: &WorkflowDefinition) -> Option<NodeId> {
    let raw = raw_start_node(definition)?;

    if definition.start_points.is_empty() {
        return Some(raw);
    }

    let outgoing = definition.outgoing(&raw);
    if outgoing.len() == 1 && is_synthetic_start(definition.node(&raw), &raw) {
        return Some(outgoing[0].to.clone());
    }

    Some(raw)
}

fn is_synthetic_start(node: Option<&WorkflowNode>, id: &NodeId) -> bool {
    let label_is_placeholder = match node {
        Some(node) => {
            let label = node.label.trim();
            label.is_empty() || label.eq_ignore_ascii_case("start")
        }
        None => true,
    };
    label_is_placeholder && id.as_str().to_ascii_lowercase().starts_with("start")
}

/// Describe the current node for a client
pub fn calculate_current_payload(
    definition: &WorkflowDefinition,
    current: Option<&NodeId>,
) -> WorkflowStatePayload {
    let Some(node) = current.and_then(|id| definition.node(id)) else {
        return WorkflowStatePayload::empty();
    };

    let outgoing = definition.outgoing(&node.id);
    let is_choice = outgoing.len() > 1;
    let choices = if is_choice {
        outgoing
            .iter()
            .enumerate()
            .map(|(index, transition)| WorkflowChoice {
                label: choice_label(definition, transition.condition.as_deref(), &transition.to),
                value: transition.to.to_string(),
                index,
            })
            .collect()
    } else {
        Vec::new()
    };

    WorkflowStatePayload {
        node_id: Some(node.id.clone()),
        display_text: node.display_text(),
        is_choice,
        choices,
        metadata: node.json_metadata(),
    }
}

fn choice_label(definition: &WorkflowDefinition, condition: Option<&str>, target: &NodeId) -> String {
    if let Some(condition) = condition.map(str::trim).filter(|c| !c.is_empty()) {
        return condition.to_string();
    }
    definition
        .node(target)
        .map(|n| n.label.trim())
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| target.to_string())
}
