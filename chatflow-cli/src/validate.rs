//! Structural checks for workflow diagrams

use anyhow::{Context, Result};
use chatflow::workflow::{
    raw_start_node, ActionHandlerRegistry, NodeId, PlantUmlParser, WorkflowDefinition,
};
use colored::*;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::cli::OutputFormat;
use crate::exit_codes::{EXIT_ERROR, EXIT_SUCCESS, EXIT_WARNING};
use crate::handlers::cli_registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub file_path: PathBuf,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
    pub files_checked: usize,
    pub errors: usize,
    pub warnings: usize,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_issue(&mut self, issue: ValidationIssue) {
        match issue.level {
            ValidationLevel::Error => self.errors += 1,
            ValidationLevel::Warning => self.warnings += 1,
        }
        self.issues.push(issue);
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings > 0
    }
}

pub struct Validator {
    quiet: bool,
    parser: PlantUmlParser,
    registry: ActionHandlerRegistry,
}

impl Validator {
    pub fn new(quiet: bool) -> Result<Self> {
        Ok(Self {
            quiet,
            parser: PlantUmlParser::new()?,
            registry: cli_registry(),
        })
    }

    pub fn validate_files(&self, files: &[PathBuf]) -> Result<ValidationResult> {
        let mut result = ValidationResult::new();
        for file in files {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            self.validate_source(file, &text, &mut result);
            result.files_checked += 1;
        }
        Ok(result)
    }

    pub fn validate_source(&self, file_path: &Path, text: &str, result: &mut ValidationResult) {
        let issue = |level, message: String, suggestion: Option<&str>| ValidationIssue {
            level,
            file_path: file_path.to_path_buf(),
            message,
            suggestion: suggestion.map(str::to_string),
        };

        let definition = match self.parser.parse(text, Some("validate"), None) {
            Ok(definition) => definition,
            Err(e) => {
                result.add_issue(issue(ValidationLevel::Error, e.to_string(), None));
                return;
            }
        };

        if definition.nodes.is_empty() {
            result.add_issue(issue(
                ValidationLevel::Error,
                "Diagram declares no nodes".to_string(),
                Some("Add activities such as ':Hello;' or arrows such as 'A --> B'"),
            ));
            return;
        }

        if let Err(problems) = definition.validate_structure() {
            for problem in problems {
                result.add_issue(issue(ValidationLevel::Error, problem, None));
            }
        }

        if definition.start_points.is_empty() {
            result.add_issue(issue(
                ValidationLevel::Warning,
                format!(
                    "No start point declared, '{}' will be used",
                    definition.nodes[0].id
                ),
                Some("Add '[*] --> <node>' or a 'start' line"),
            ));
        }

        for node in unreachable_nodes(&definition) {
            result.add_issue(issue(
                ValidationLevel::Warning,
                format!("Node '{}' cannot be reached from the start", node),
                None,
            ));
        }

        for node in &definition.nodes {
            if let Some(action) = node.action() {
                if !self.registry.contains(&action.name) {
                    result.add_issue(issue(
                        ValidationLevel::Warning,
                        format!(
                            "Node '{}' uses action '{}' which has no handler",
                            node.id, action.name
                        ),
                        Some("The action will be skipped when the workflow runs"),
                    ));
                }
            }
        }
    }

    pub fn print_results(&self, result: &ValidationResult, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Text => self.print_text_results(result),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        }
        Ok(())
    }

    fn print_text_results(&self, result: &ValidationResult) {
        if result.issues.is_empty() {
            if !self.quiet {
                println!(
                    "{} All {} files validated successfully!",
                    "✓".green(),
                    result.files_checked
                );
            }
            return;
        }

        let mut current_file: Option<&Path> = None;
        for issue in &result.issues {
            if self.quiet && issue.level != ValidationLevel::Error {
                continue;
            }
            if current_file != Some(issue.file_path.as_path()) {
                println!("\n{}", issue.file_path.display().to_string().bold());
                current_file = Some(issue.file_path.as_path());
            }

            let level_str = match issue.level {
                ValidationLevel::Error => "ERROR".red(),
                ValidationLevel::Warning => "WARN".yellow(),
            };
            println!("  {} {}", level_str, issue.message);
            if let Some(suggestion) = &issue.suggestion {
                println!("    💡 {}", suggestion.dimmed());
            }
        }

        if !self.quiet {
            println!(
                "\n{} errors, {} warnings in {} files",
                result.errors, result.warnings, result.files_checked
            );
        }
    }
}

/// Nodes with no path from any start point, in declaration order
fn unreachable_nodes(definition: &WorkflowDefinition) -> Vec<NodeId> {
    let mut queue: VecDeque<NodeId> = definition
        .start_points
        .iter()
        .map(|sp| sp.node_id.clone())
        .collect();
    if queue.is_empty() {
        queue.extend(raw_start_node(definition));
    }

    let mut seen: HashSet<NodeId> = queue.iter().cloned().collect();
    while let Some(node_id) = queue.pop_front() {
        for transition in definition.outgoing(&node_id) {
            if seen.insert(transition.to.clone()) {
                queue.push_back(transition.to.clone());
            }
        }
    }

    definition
        .nodes
        .iter()
        .filter(|node| !seen.contains(&node.id))
        .map(|node| node.id.clone())
        .collect()
}

pub fn run_validate_command(files: &[PathBuf], quiet: bool, format: OutputFormat) -> Result<i32> {
    let validator = Validator::new(quiet)?;
    let result = validator.validate_files(files)?;
    validator.print_results(&result, format)?;

    if result.has_errors() {
        Ok(EXIT_ERROR)
    } else if result.has_warnings() {
        Ok(EXIT_WARNING)
    } else {
        Ok(EXIT_SUCCESS)
    }
}
