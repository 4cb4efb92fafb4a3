//! Node-related types for workflow definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur when creating node-related types
#[derive(Debug, Error)]
pub enum NodeError {
    /// Node ID cannot be empty or whitespace only
    #[error("Node ID cannot be empty or whitespace only")]
    EmptyNodeId,
}

/// Result type for node operations
pub type NodeResult<T> = Result<T, NodeError>;

/// Identifier of a node, unique within one workflow definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new node ID
    ///
    /// # Panics
    /// Panics if the ID is empty or whitespace only. For non-panicking creation,
    /// use `try_new` instead.
    pub fn new(id: impl Into<String>) -> Self {
        Self::try_new(id).expect("Node ID cannot be empty or whitespace only")
    }

    /// Create a new node ID, returning an error for invalid input
    pub fn try_new(id: impl Into<String>) -> NodeResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(NodeError::EmptyNodeId);
        }
        Ok(Self(id))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An action declared in a node note: `{"action": "<name>", "params": {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Registered handler name
    pub name: String,
    /// Raw parameter templates; `{{variable}}` placeholders are resolved at execution time
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ActionDescriptor {
    /// Create a descriptor without parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter template
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Annotation attached to a node, classified once when the diagram is parsed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NodeAnnotation {
    /// Free-form note text (markdown)
    PlainText(String),
    /// A JSON object without an `action` key
    Metadata(serde_json::Map<String, serde_json::Value>),
    /// A JSON object declaring an action
    Action(ActionDescriptor),
}

impl NodeAnnotation {
    /// Classify raw note text.
    ///
    /// Text wrapped in braces is tried as JSON; anything that fails to parse as
    /// an object stays plain text.
    pub fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();
        if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
            return NodeAnnotation::PlainText(raw.to_string());
        }

        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(serde_json::Value::Object(map)) => match map.get("action") {
                Some(serde_json::Value::String(name)) => {
                    let params = map
                        .get("params")
                        .and_then(|p| p.as_object())
                        .map(|object| {
                            object
                                .iter()
                                .map(|(key, value)| (key.clone(), json_param_to_string(value)))
                                .collect()
                        })
                        .unwrap_or_default();
                    NodeAnnotation::Action(ActionDescriptor {
                        name: name.clone(),
                        params,
                    })
                }
                _ => NodeAnnotation::Metadata(map),
            },
            _ => NodeAnnotation::PlainText(raw.to_string()),
        }
    }
}

fn json_param_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A node in a workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique identifier within the definition
    pub id: NodeId,
    /// Human readable text, may be empty
    pub label: String,
    /// Raw note text attached in the diagram
    pub note: Option<String>,
    /// Classified note
    pub annotation: Option<NodeAnnotation>,
}

impl WorkflowNode {
    /// Create a node without a note
    pub fn new(id: impl Into<NodeId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            note: None,
            annotation: None,
        }
    }

    /// Attach a note, classifying it immediately
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.set_note(note.into());
        self
    }

    /// Replace the note and its classification
    pub fn set_note(&mut self, note: String) {
        self.annotation = Some(NodeAnnotation::classify(&note));
        self.note = Some(note);
    }

    /// The action declared on this node, if any
    pub fn action(&self) -> Option<&ActionDescriptor> {
        match &self.annotation {
            Some(NodeAnnotation::Action(descriptor)) => Some(descriptor),
            _ => None,
        }
    }

    /// Whether this node declares an action
    pub fn is_action_node(&self) -> bool {
        self.action().is_some()
    }

    /// JSON metadata object, for both action and metadata notes
    pub fn json_metadata(&self) -> Option<serde_json::Value> {
        match &self.annotation {
            Some(NodeAnnotation::Metadata(map)) => Some(serde_json::Value::Object(map.clone())),
            Some(NodeAnnotation::Action(_)) => self
                .note
                .as_deref()
                .and_then(|n| serde_json::from_str(n.trim()).ok()),
            _ => None,
        }
    }

    /// Text shown to the user for this node
    pub fn display_text(&self) -> String {
        if !self.label.trim().is_empty() {
            return self.label.clone();
        }
        match &self.annotation {
            Some(NodeAnnotation::PlainText(text)) => text.trim().to_string(),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_try_new_empty_error() {
        assert!(NodeId::try_new("").is_err());
        assert!(NodeId::try_new("  \t").is_err());
        assert_eq!(NodeId::try_new("A").unwrap().as_str(), "A");
    }

    #[test]
    #[should_panic(expected = "Node ID cannot be empty or whitespace only")]
    fn test_node_id_new_panics_on_empty() {
        NodeId::new(" ");
    }

    #[test]
    fn test_classify_action_note() {
        let annotation = NodeAnnotation::classify(
            r#"{"action":"SendMessage","params":{"text":"Hello, {{userName}}","count":3}}"#,
        );
        match annotation {
            NodeAnnotation::Action(descriptor) => {
                assert_eq!(descriptor.name, "SendMessage");
                assert_eq!(descriptor.params["text"], "Hello, {{userName}}");
                assert_eq!(descriptor.params["count"], "3");
            }
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_metadata_without_action() {
        let annotation = NodeAnnotation::classify(r#" {"color": "blue"} "#);
        assert!(matches!(annotation, NodeAnnotation::Metadata(map) if map["color"] == "blue"));
    }

    #[test]
    fn test_classify_invalid_json_stays_plain_text() {
        let annotation = NodeAnnotation::classify("{not json}");
        assert_eq!(annotation, NodeAnnotation::PlainText("{not json}".to_string()));

        let annotation = NodeAnnotation::classify("**bold** markdown");
        assert!(matches!(annotation, NodeAnnotation::PlainText(_)));
    }

    #[test]
    fn test_action_key_must_be_string() {
        let annotation = NodeAnnotation::classify(r#"{"action": 42}"#);
        assert!(matches!(annotation, NodeAnnotation::Metadata(_)));
    }

    #[test]
    fn test_display_text_falls_back_to_plain_note() {
        let node = WorkflowNode::new("n1", "").with_note("  Welcome!  ");
        assert_eq!(node.display_text(), "Welcome!");

        let node = WorkflowNode::new("n2", "Pick one").with_note("ignored");
        assert_eq!(node.display_text(), "Pick one");

        let node = WorkflowNode::new("n3", "").with_note(r#"{"action":"x"}"#);
        assert_eq!(node.display_text(), "");
        assert!(node.is_action_node());
        assert!(node.json_metadata().is_some());
    }
}
