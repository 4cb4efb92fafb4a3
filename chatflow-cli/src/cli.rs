use clap::{Parser, Subcommand, ValueEnum};
use is_terminal::IsTerminal;
use std::io;
use std::path::PathBuf;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "chatflow")]
#[command(version)]
#[command(about = "Run conversational workflows described as PlantUML activity diagrams")]
#[command(long_about = "
chatflow drives conversational workflows written as PlantUML activity
diagrams. Nodes with several outgoing arrows become choices, and JSON notes
such as {\"action\":\"SendMessage\",\"params\":{\"text\":\"Hi {{name}}\"}} run
registered actions as the workflow moves through them.

Example usage:
  chatflow run onboarding.puml --set userName=Alice
  chatflow validate onboarding.puml
  chatflow show onboarding.puml --format json
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a workflow interactively
    #[command(long_about = "
Imports the diagram, starts the workflow and walks through it in the
terminal. Choice nodes are offered as a menu; when stdin is not a terminal
one answer per line is read instead (a node ID, label or zero-based index).

With --state-dir (or state_dir in .chatflow/config.yaml) the current node is
saved after every move, and running the same --id again resumes there.

Examples:
  chatflow run greeting.puml
  chatflow run greeting.puml --id alice --set userName=Alice
  chatflow run greeting.puml --state-dir .chatflow/state --background
")]
    Run {
        /// Diagram file
        file: PathBuf,
        /// Workflow ID (defaults to the file stem)
        #[arg(long)]
        id: Option<String>,
        /// Set an instance variable before the workflow starts
        #[arg(long = "set", value_name = "KEY=VALUE")]
        vars: Vec<String>,
        /// Persist workflow state in this directory
        #[arg(long)]
        state_dir: Option<PathBuf>,
        /// Run action handlers in the background
        #[arg(long)]
        background: bool,
    },
    /// Check diagrams for structural problems
    #[command(long_about = "
Parses each diagram and reports problems.

Errors: duplicate node IDs and transitions or start points that reference
missing nodes. Warnings: diagrams without a start point, nodes that cannot be
reached from the start and actions with no handler available in the CLI.

Exit codes:
  0 - No problems
  1 - Warnings found
  2 - Errors found
")]
    Validate {
        /// Diagram files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Only show errors
        #[arg(short, long)]
        quiet: bool,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the parsed graph of a diagram
    Show {
        /// Diagram file
        file: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    #[allow(dead_code)]
    pub fn try_parse_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(args)
    }

    #[allow(dead_code)]
    pub fn is_interactive() -> bool {
        io::stdin().is_terminal() && io::stdout().is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_help_works() {
        let result = Cli::try_parse_from_args(["chatflow", "--help"]);
        let error = result.unwrap_err();
        assert_eq!(error.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_no_subcommand() {
        let cli = Cli::try_parse_from_args(["chatflow"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose && !cli.debug && !cli.quiet);
    }

    #[test]
    fn test_run_collects_variables() {
        let cli = Cli::try_parse_from_args([
            "chatflow",
            "run",
            "flow.puml",
            "--id",
            "alice",
            "--set",
            "userName=Alice",
            "--set",
            "lang=en",
            "--background",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Run {
                file,
                id,
                vars,
                state_dir,
                background,
            }) => {
                assert_eq!(file, PathBuf::from("flow.puml"));
                assert_eq!(id.as_deref(), Some("alice"));
                assert_eq!(vars, vec!["userName=Alice", "lang=en"]);
                assert!(state_dir.is_none());
                assert!(background);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_validate_requires_a_file() {
        assert!(Cli::try_parse_from_args(["chatflow", "validate"]).is_err());

        let cli = Cli::try_parse_from_args(["chatflow", "validate", "a.puml", "--format", "json"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Validate {
                format: OutputFormat::Json,
                ..
            })
        ));
    }

    #[test]
    fn test_show_defaults_to_text() {
        let cli = Cli::try_parse_from_args(["chatflow", "show", "a.puml"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Show {
                format: OutputFormat::Text,
                ..
            })
        ));
    }
}
