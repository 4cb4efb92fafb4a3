//! Print the graph parsed from a diagram

use anyhow::{Context, Result};
use chatflow::workflow::{calculate_start_node, PlantUmlParser, WorkflowDefinition};
use colored::*;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::exit_codes::EXIT_SUCCESS;

pub fn run_show_command(file: &Path, format: OutputFormat) -> Result<i32> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let id = workflow_id_for(file);
    let definition = PlantUmlParser::new()?.parse(&text, Some(&id), None)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&definition)?),
        OutputFormat::Text => print!("{}", render_text(&definition)),
    }
    Ok(EXIT_SUCCESS)
}

/// Workflow id derived from the file stem
pub fn workflow_id_for(file: &Path) -> String {
    file.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .filter(|stem| !stem.trim().is_empty())
        .unwrap_or_else(|| "workflow".to_string())
}

fn render_text(definition: &WorkflowDefinition) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} {}\n", "Workflow:".bold(), definition.name));
    out.push_str(&format!("{} {}\n", "Id:".bold(), definition.id));
    if let Some(start) = calculate_start_node(definition) {
        out.push_str(&format!("{} {}\n", "Start:".bold(), start));
    }

    out.push_str(&format!("\n{} ({})\n", "Nodes".bold(), definition.nodes.len()));
    for node in &definition.nodes {
        let marker = match (node.action(), node.json_metadata()) {
            (Some(action), _) => format!(" [action: {}]", action.name).cyan().to_string(),
            (None, Some(_)) => " [metadata]".dimmed().to_string(),
            (None, None) => String::new(),
        };
        if node.label == node.id.as_str() {
            out.push_str(&format!("  {}{}\n", node.id, marker));
        } else {
            out.push_str(&format!("  {} \"{}\"{}\n", node.id, node.label, marker));
        }
    }

    out.push_str(&format!(
        "\n{} ({})\n",
        "Transitions".bold(),
        definition.transitions.len()
    ));
    for transition in &definition.transitions {
        out.push_str(&format!("  {}\n", transition));
    }
    out
}
