//! Test helper functions for workflow module
//!
//! This module provides common test utilities to reduce code duplication
//! across workflow tests.

#![cfg(test)]

use crate::workflow::{
    ActionDescriptor, NodeAnnotation, StartPoint, Transition, WorkflowDefinition, WorkflowId,
    WorkflowNode,
};

/// Test helper to create a node whose note declares an action
pub fn create_action_node(id: &str, descriptor: ActionDescriptor) -> WorkflowNode {
    let params: serde_json::Map<String, serde_json::Value> = descriptor
        .params
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
    let note = serde_json::json!({ "action": descriptor.name, "params": params }).to_string();

    let node = WorkflowNode::new(id, id).with_note(note);
    debug_assert!(matches!(node.annotation, Some(NodeAnnotation::Action(_))));
    node
}

/// Test helper to create `nodes[0] -> nodes[1] -> ...` with a start point on the first node
pub fn create_linear_definition(id: &str, nodes: &[&str]) -> WorkflowDefinition {
    let mut definition = WorkflowDefinition::new(
        WorkflowId::try_new(id).expect("test workflow id"),
        id.to_string(),
    );

    for node in nodes {
        definition.add_node(WorkflowNode::new(*node, *node));
    }
    for pair in nodes.windows(2) {
        definition.add_transition(Transition::new(pair[0], pair[1]));
    }
    if let Some(first) = nodes.first() {
        definition.add_start_point(StartPoint::new(*first));
    }

    definition
}

/// Test helper to create a question node with one conditional branch per option
pub fn create_choice_definition(id: &str, question: &str, options: &[(&str, &str)]) -> WorkflowDefinition {
    let mut definition = create_linear_definition(id, &[question]);

    for (condition, target) in options {
        definition.add_node(WorkflowNode::new(*target, *target));
        definition.add_transition(Transition::new(question, *target).with_condition(*condition));
    }

    definition
}
