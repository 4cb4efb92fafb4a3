use std::process;
mod cli;
mod exit_codes;
mod handlers;
mod run;
mod show;
mod validate;

use clap::CommandFactory;
use cli::{Cli, Commands, OutputFormat};
use exit_codes::{EXIT_ERROR, EXIT_SUCCESS};
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    // Fast path for help
    if cli.command.is_none() {
        if let Err(e) = Cli::command().print_help() {
            eprintln!("Failed to print help: {}", e);
            process::exit(EXIT_ERROR);
        }
        process::exit(EXIT_SUCCESS);
    }

    use tracing::Level;

    let log_level = if cli.quiet {
        Level::ERROR
    } else if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::TRACE
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(log_level)
        .init();

    let exit_code = match cli.command {
        Some(Commands::Run {
            file,
            id,
            vars,
            state_dir,
            background,
        }) => {
            tracing::info!("Running workflow {}", file.display());
            run_workflow(run::RunOptions {
                file,
                id,
                vars,
                state_dir,
                background,
            })
            .await
        }
        Some(Commands::Validate {
            files,
            quiet,
            format,
        }) => {
            tracing::info!("Running validate command");
            run_validate(files, quiet, format)
        }
        Some(Commands::Show { file, format }) => {
            tracing::info!("Showing {}", file.display());
            run_show(file, format)
        }
        None => {
            // Handled by the help fast path above
            unreachable!()
        }
    };

    process::exit(exit_code);
}

async fn run_workflow(options: run::RunOptions) -> i32 {
    match run::run_workflow_command(options).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    }
}

fn run_validate(files: Vec<PathBuf>, quiet: bool, format: OutputFormat) -> i32 {
    match validate::run_validate_command(&files, quiet, format) {
        Ok(exit_code) => exit_code,
        Err(e) => {
            tracing::error!("Validate error: {}", e);
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    }
}

fn run_show(file: PathBuf, format: OutputFormat) -> i32 {
    match show::run_show_command(&file, format) {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    }
}
