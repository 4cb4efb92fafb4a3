//! PlantUML activity diagram parser for workflows
//!
//! Lines the parser does not understand are skipped, so any non-empty input
//! produces a best-effort graph.
//!
//! Node ids are activity labels. Repeating `:Label;` refers to the existing node
//! instead of creating a new one, which links back to it and can form a loop.

use crate::workflow::{
    NodeAnnotation, NodeId, StartPoint, Transition, WorkflowDefinition, WorkflowId, WorkflowNode,
};
use regex::Regex;
use thiserror::Error;

/// Marker PlantUML uses for the initial and final pseudo-states
const PSEUDO_STATE: &str = "[*]";

/// Label given to nodes created by the `start` keyword
const SYNTHETIC_START_LABEL: &str = "start";

/// Errors that can occur during diagram parsing
#[derive(Debug, Error)]
pub enum ParseError {
    /// The diagram source is empty or whitespace only
    #[error("Diagram source cannot be empty")]
    EmptySource,

    /// The supplied workflow id is empty or whitespace only
    #[error("Workflow id cannot be empty or whitespace only")]
    EmptyWorkflowId,

    /// One of the built-in syntax patterns failed to compile
    #[error("Failed to compile {name} pattern: {message}")]
    Pattern {
        /// Which pattern failed
        name: &'static str,
        /// Regex error message
        message: String,
    },
}

/// Result type for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Parser for PlantUML activity diagrams
#[derive(Debug)]
pub struct PlantUmlParser {
    arrow_regex: Regex,
    declaration_regex: Regex,
    note_inline_regex: Regex,
    note_block_regex: Regex,
    note_end_regex: Regex,
    start_regex: Regex,
    stop_regex: Regex,
    if_regex: Regex,
    else_regex: Regex,
    endif_regex: Regex,
    title_regex: Regex,
}

fn compile(name: &'static str, pattern: &str) -> ParseResult<Regex> {
    Regex::new(pattern).map_err(|e| ParseError::Pattern {
        name,
        message: e.to_string(),
    })
}

impl PlantUmlParser {
    /// Create a new parser with compiled syntax patterns
    pub fn new() -> ParseResult<Self> {
        Ok(Self {
            arrow_regex: compile(
                "arrow",
                r"^(?P<from>[^:]+?)\s*-+(?:\[[^\]]*\])?-*>\s*(?P<to>[^:]+?)\s*(?::\s*(?P<condition>.*))?$",
            )?,
            declaration_regex: compile("declaration", r"^:(?P<label>.*?);?$")?,
            note_inline_regex: compile(
                "inline note",
                r"(?i)^note\s+(?:left|right|top|bottom)(?:\s+of\s+\S+)?\s*:\s?(?P<text>.*)$",
            )?,
            note_block_regex: compile(
                "note block",
                r"(?i)^note\s+(?:left|right|top|bottom)(?:\s+of\s+\S+)?\s*$",
            )?,
            note_end_regex: compile("note end", r"(?i)^end\s*note$")?,
            start_regex: compile("start", r"(?i)^start;?$")?,
            stop_regex: compile("stop", r"(?i)^(?:stop|end|kill|detach);?$")?,
            if_regex: compile(
                "if",
                r"(?i)^if\s*\((?P<question>.*?)\)\s*(?:then\s*(?:\((?P<label>.*?)\))?)?;?$",
            )?,
            else_regex: compile("else", r"(?i)^else\s*(?:\((?P<label>.*?)\))?;?$")?,
            endif_regex: compile("endif", r"(?i)^end\s*if;?$")?,
            title_regex: compile("title", r"(?i)^title\s+(?P<title>.+)$")?,
        })
    }

    /// Parse diagram text into a workflow definition.
    ///
    /// `id` defaults to a fresh ULID; `name` defaults to the diagram title and
    /// then to the id.
    pub fn parse(
        &self,
        input: &str,
        id: Option<&str>,
        name: Option<&str>,
    ) -> ParseResult<WorkflowDefinition> {
        if input.trim().is_empty() {
            return Err(ParseError::EmptySource);
        }

        let id = match id {
            Some(id) => WorkflowId::try_new(id).map_err(|_| ParseError::EmptyWorkflowId)?,
            None => WorkflowId::generate(),
        };

        let mut builder = GraphBuilder::new(WorkflowDefinition::new(id, String::new()));

        for raw_line in input.lines() {
            let line = raw_line.trim();

            if let Some(note) = builder.open_note.as_mut() {
                if self.note_end_regex.is_match(line) {
                    let text = note.join("\n");
                    builder.open_note = None;
                    builder.attach_note(text);
                } else {
                    note.push(raw_line.trim_end().to_string());
                }
                continue;
            }

            if line.is_empty() || line.starts_with('\'') {
                continue;
            }

            let lower = line.to_ascii_lowercase();
            if lower.starts_with("@startuml") {
                continue;
            }
            if lower.starts_with("@enduml") {
                break;
            }

            self.parse_line(line, &mut builder);
        }

        if let Some(note) = builder.open_note.take() {
            builder.attach_note(note.join("\n"));
        }

        let (mut definition, title) = builder.finish();
        definition.name = name
            .map(str::to_string)
            .filter(|n| !n.trim().is_empty())
            .or(title)
            .unwrap_or_else(|| definition.id.to_string());
        definition.source = Some(input.to_string());

        tracing::debug!(
            workflow_id = %definition.id,
            nodes = definition.nodes.len(),
            transitions = definition.transitions.len(),
            "Parsed activity diagram"
        );

        Ok(definition)
    }

    fn parse_line(&self, line: &str, builder: &mut GraphBuilder) {
        if self.start_regex.is_match(line) {
            builder.start();
        } else if self.stop_regex.is_match(line) {
            builder.cursor.clear();
        } else if let Some(captures) = self.declaration_regex.captures(line) {
            let label = captures.name("label").map_or("", |m| m.as_str()).trim();
            builder.declare_activity(label);
        } else if let Some(captures) = self.note_inline_regex.captures(line) {
            let text = captures.name("text").map_or("", |m| m.as_str());
            builder.attach_note(text.to_string());
        } else if self.note_block_regex.is_match(line) {
            builder.open_note = Some(Vec::new());
        } else if let Some(captures) = self.if_regex.captures(line) {
            let question = captures.name("question").map_or("", |m| m.as_str());
            let label = captures.name("label").map(|m| m.as_str().to_string());
            builder.open_branch(question.trim(), label);
        } else if let Some(captures) = self.else_regex.captures(line) {
            let label = captures.name("label").map(|m| m.as_str().to_string());
            builder.else_branch(label);
        } else if self.endif_regex.is_match(line) {
            builder.close_branch();
        } else if let Some(captures) = self.title_regex.captures(line) {
            builder.title = Some(captures["title"].trim().to_string());
        } else if let Some(captures) = self.arrow_regex.captures(line) {
            let from = clean_endpoint(&captures["from"]);
            let to = clean_endpoint(&captures["to"]);
            let condition = captures
                .name("condition")
                .map(|m| m.as_str().trim().to_string())
                .filter(|c| !c.is_empty());
            builder.arrow(&from, &to, condition);
        } else {
            tracing::trace!(line, "Skipping unrecognised diagram line");
        }
    }
}

impl Default for PlantUmlParser {
    fn default() -> Self {
        Self::new().expect("Failed to create default PlantUmlParser")
    }
}

fn clean_endpoint(raw: &str) -> String {
    raw.trim().trim_matches('"').trim().to_string()
}

/// A pending edge source: the node and the condition label the edge will carry
type CursorEntry = (NodeId, Option<String>);

/// Open `if` block while parsing sequential activity syntax
struct BranchFrame {
    decision: NodeId,
    finished_branches: Vec<CursorEntry>,
    saw_else: bool,
}

/// Incrementally assembles a definition while lines are read
struct GraphBuilder {
    definition: WorkflowDefinition,
    notes: Vec<(NodeId, String)>,
    last_node: Option<NodeId>,
    cursor: Vec<CursorEntry>,
    branches: Vec<BranchFrame>,
    open_note: Option<Vec<String>>,
    title: Option<String>,
}

impl GraphBuilder {
    fn new(definition: WorkflowDefinition) -> Self {
        Self {
            definition,
            notes: Vec::new(),
            last_node: None,
            cursor: Vec::new(),
            branches: Vec::new(),
            open_note: None,
            title: None,
        }
    }

    fn ensure_node(&mut self, id: &str) -> NodeId {
        let node_id = NodeId::from(id);
        if !self.definition.contains_node(&node_id) {
            self.definition.add_node(WorkflowNode::new(node_id.clone(), id));
        }
        node_id
    }

    /// Link every pending source to `target`, then make `target` the only source
    ///
    /// Self-edges without a condition and edges that already exist are not added
    /// again, so an activity reached by an explicit arrow is not linked twice.
    fn link_from_cursor(&mut self, target: &NodeId) {
        for (from, condition) in std::mem::take(&mut self.cursor) {
            if &from == target && condition.is_none() {
                continue;
            }
            let transition = Transition {
                from,
                to: target.clone(),
                condition,
            };
            if !self.definition.transitions.contains(&transition) {
                self.definition.add_transition(transition);
            }
        }
        self.cursor.push((target.clone(), None));
    }

    fn start(&mut self) {
        let mut id = SYNTHETIC_START_LABEL.to_string();
        let mut suffix = 2;
        while self.definition.contains_node(&NodeId::from(id.as_str())) {
            id = format!("{}_{}", SYNTHETIC_START_LABEL, suffix);
            suffix += 1;
        }

        let node_id = NodeId::from(id);
        self.definition
            .add_node(WorkflowNode::new(node_id.clone(), SYNTHETIC_START_LABEL));
        self.definition.add_start_point(StartPoint::new(node_id.clone()));
        self.cursor = vec![(node_id.clone(), None)];
        self.last_node = Some(node_id);
    }

    fn declare_activity(&mut self, label: &str) {
        if label.is_empty() {
            return;
        }
        let node_id = self.ensure_node(label);
        if !self.cursor.is_empty() {
            self.link_from_cursor(&node_id);
        }
        self.last_node = Some(node_id);
    }

    fn open_branch(&mut self, question: &str, label: Option<String>) {
        let question = if question.is_empty() {
            format!("decision_{}", self.branches.len() + 1)
        } else {
            question.to_string()
        };
        let decision = self.ensure_node(&question);
        if !self.cursor.is_empty() {
            self.link_from_cursor(&decision);
        }
        self.last_node = Some(decision.clone());
        self.cursor = vec![(decision.clone(), label)];
        self.branches.push(BranchFrame {
            decision,
            finished_branches: Vec::new(),
            saw_else: false,
        });
    }

    fn else_branch(&mut self, label: Option<String>) {
        let Some(frame) = self.branches.last_mut() else {
            return;
        };
        frame.finished_branches.append(&mut self.cursor);
        frame.saw_else = true;
        self.cursor = vec![(frame.decision.clone(), label)];
    }

    fn close_branch(&mut self) {
        let Some(mut frame) = self.branches.pop() else {
            return;
        };
        frame.finished_branches.append(&mut self.cursor);
        if !frame.saw_else {
            frame.finished_branches.push((frame.decision, None));
        }
        self.cursor = frame.finished_branches;
    }

    fn arrow(&mut self, from: &str, to: &str, condition: Option<String>) {
        if from.is_empty() || to.is_empty() {
            tracing::trace!(from, to, "Skipping arrow with an empty endpoint");
            return;
        }
        match (from == PSEUDO_STATE, to == PSEUDO_STATE) {
            (true, true) => {}
            (true, false) => {
                let target = self.ensure_node(to);
                self.definition.add_start_point(StartPoint::new(target.clone()));
                self.last_node = Some(target);
            }
            (false, true) => {
                let source = self.ensure_node(from);
                self.last_node = Some(source);
            }
            (false, false) => {
                let source = self.ensure_node(from);
                let target = self.ensure_node(to);
                let transition = Transition {
                    from: source,
                    to: target.clone(),
                    condition,
                };
                if !self.definition.transitions.contains(&transition) {
                    self.definition.add_transition(transition);
                }
                // Sequential flow continues from the arrow's target
                if !self.cursor.is_empty() {
                    self.cursor = vec![(target.clone(), None)];
                }
                self.last_node = Some(target);
            }
        }
    }

    fn attach_note(&mut self, text: String) {
        match &self.last_node {
            Some(node_id) => self.notes.push((node_id.clone(), text)),
            None => tracing::trace!("Dropping note declared before any node"),
        }
    }

    fn finish(mut self) -> (WorkflowDefinition, Option<String>) {
        for (node_id, text) in std::mem::take(&mut self.notes) {
            if let Some(node) = self.definition.nodes.iter_mut().find(|n| n.id == node_id) {
                let note = match node.note.take() {
                    Some(existing) => format!("{}\n{}", existing, text),
                    None => text,
                };
                node.annotation = Some(NodeAnnotation::classify(&note));
                node.note = Some(note);
            }
        }

        (self.definition, self.title)
    }
}
