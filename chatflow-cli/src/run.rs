//! Walk a workflow in the terminal

use anyhow::{bail, Context, Result};
use chatflow::workflow::{ChoiceValue, WorkflowService, WorkflowStatePayload};
use chatflow::EngineConfig;
use colored::*;
use dialoguer::{theme::ColorfulTheme, Select};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::cli::Cli;
use crate::exit_codes::EXIT_SUCCESS;
use crate::handlers::cli_registry;
use crate::show::workflow_id_for;

pub struct RunOptions {
    pub file: PathBuf,
    pub id: Option<String>,
    pub vars: Vec<String>,
    pub state_dir: Option<PathBuf>,
    pub background: bool,
}

pub async fn run_workflow_command(options: RunOptions) -> Result<i32> {
    let text = std::fs::read_to_string(&options.file)
        .with_context(|| format!("Failed to read {}", options.file.display()))?;

    let mut config = EngineConfig::new();
    if let Some(state_dir) = options.state_dir {
        config.state_dir = Some(state_dir);
    }
    if options.background {
        config.background_actions = true;
    }

    let service = WorkflowService::from_config(&config, Arc::new(cli_registry()))?;
    let id = options
        .id
        .unwrap_or_else(|| workflow_id_for(&options.file));

    for (key, value) in parse_assignments(&options.vars)? {
        service.set_variable(&id, &key, value)?;
    }

    service.import_workflow(&text, Some(&id), None).await?;
    tracing::debug!(workflow_id = %id, "Workflow imported");

    let interactive = Cli::is_interactive();
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut plain_steps = 0usize;

    loop {
        let payload = service.get_current_state_payload(&id).await?;
        if payload.node_id.is_none() {
            break;
        }
        if !payload.display_text.is_empty() {
            println!("{}", payload.display_text.bold());
        }

        let choice = if payload.is_choice {
            plain_steps = 0;
            let answer = if interactive {
                prompt_choice(&payload)?
            } else {
                read_answer(&payload, &mut input).await?
            };
            match answer {
                Some(choice) => Some(choice),
                None => {
                    println!("{} Stopped at '{}'", "■".yellow(), payload.display_text);
                    break;
                }
            }
        } else {
            plain_steps += 1;
            if plain_steps > config.max_auto_advance_steps {
                tracing::warn!(
                    workflow_id = %id,
                    "Stopping after {} steps without a choice",
                    config.max_auto_advance_steps
                );
                break;
            }
            None
        };

        if !service.advance_by_choice_value(&id, choice).await? {
            if payload.is_choice {
                println!("{} That is not one of the choices", "✗".red());
                continue;
            }
            println!("{} Workflow finished", "✓".green());
            break;
        }
    }

    tracing::debug!(workflow_id = %id, variables = ?service.variables(&id), "Final variables");
    Ok(EXIT_SUCCESS)
}

/// Parse `KEY=VALUE` pairs given with `--set`
pub fn parse_assignments(vars: &[String]) -> Result<Vec<(String, String)>> {
    vars.iter()
        .map(|var| match var.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => bail!("Invalid variable format '{}', expected KEY=VALUE", var),
        })
        .collect()
}

fn prompt_choice(payload: &WorkflowStatePayload) -> Result<Option<ChoiceValue>> {
    let labels: Vec<&str> = payload.choices.iter().map(|c| c.label.as_str()).collect();
    let selection = Select::with_theme(&ColorfulTheme::default())
        .items(&labels)
        .default(0)
        .interact_opt()?;

    Ok(selection
        .and_then(|index| payload.choices.get(index))
        .map(|choice| ChoiceValue::Text(choice.value.clone())))
}

async fn read_answer(
    payload: &WorkflowStatePayload,
    input: &mut Lines<BufReader<Stdin>>,
) -> Result<Option<ChoiceValue>> {
    for choice in &payload.choices {
        println!("  {}) {}", choice.index, choice.label);
    }

    let Some(line) = input.next_line().await? else {
        return Ok(None);
    };
    let answer = line.trim();
    if answer.is_empty() {
        return Ok(None);
    }
    Ok(Some(ChoiceValue::from(answer)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignments() {
        let vars = vec!["userName=Alice".to_string(), "greeting = hi=there".to_string()];
        let parsed = parse_assignments(&vars).unwrap();
        assert_eq!(
            parsed,
            vec![
                ("userName".to_string(), "Alice".to_string()),
                ("greeting".to_string(), " hi=there".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_assignments_rejects_missing_key() {
        assert!(parse_assignments(&["noequals".to_string()]).is_err());
        assert!(parse_assignments(&["=value".to_string()]).is_err());
    }
}
