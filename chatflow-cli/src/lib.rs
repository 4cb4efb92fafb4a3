//! chatflow CLI library
//!
//! Command-line definitions, the CLI action handlers, validation and exit
//! codes, exposed for integration tests.

/// Command-line interface definitions and argument parsing
pub mod cli;
/// Exit codes used by the CLI application
pub mod exit_codes;
/// Action handlers registered by the CLI
pub mod handlers;
/// Parsed graph output
pub mod show;
/// Diagram validation
pub mod validate;
