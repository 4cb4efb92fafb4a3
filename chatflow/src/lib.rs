//! # chatflow
//!
//! A conversational workflow engine driven by PlantUML activity diagrams.
//!
//! ## Features
//!
//! - **Diagram Parsing**: Activity diagrams become immutable workflow graphs
//! - **Action Nodes**: JSON notes bind nodes to registered async handlers
//! - **Choices**: Nodes with several exits are presented as choices
//! - **Persistence**: Optional repositories let workflows resume after a restart
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatflow::workflow::{ActionHandlerRegistry, ControllerOptions, WorkflowController};
//! use std::sync::Arc;
//!
//! # async fn run() -> chatflow::Result<()> {
//! let registry = Arc::new(ActionHandlerRegistry::with_builtin_handlers());
//! let controller = WorkflowController::new(registry, ControllerOptions::default())?;
//!
//! controller.set_variable("greeting", "userName", "Alice")?;
//! controller
//!     .import_workflow("@startuml\nstart\n:Hello;\nstop\n@enduml", Some("greeting"), None)
//!     .await?;
//!
//! let payload = controller.get_current_state_payload("greeting").await?;
//! println!("{}", payload.display_text);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Shared utilities
pub mod common;

/// Engine configuration
pub mod config;

/// Workflow parsing, state and execution
pub mod workflow;

pub use config::{ConfigError, EngineConfig};
pub use workflow::{
    ActionHandlerRegistry, ChoiceValue, WorkflowController, WorkflowDefinition, WorkflowService,
    WorkflowStatePayload,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types used throughout the library
pub mod error {
    use thiserror::Error;

    /// Main error type for the library
    #[derive(Debug, Error)]
    pub enum ChatFlowError {
        /// IO operation failed
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        /// Storage backend error
        #[error("Storage error: {0}")]
        Storage(String),

        /// Workflow not found
        #[error("Workflow not found: {0}")]
        WorkflowNotFound(String),

        /// JSON serialization/deserialization error
        #[error("JSON error: {0}")]
        Json(#[from] serde_json::Error),

        /// Diagram parsing failed
        #[error(transparent)]
        Parse(#[from] crate::workflow::ParseError),

        /// A controller operation failed
        #[error(transparent)]
        Controller(#[from] crate::workflow::ControllerError),

        /// Configuration could not be loaded
        #[error(transparent)]
        Config(#[from] crate::config::ConfigError),

        /// Other errors
        #[error("{0}")]
        Other(String),
    }

    /// Result type alias
    pub type Result<T> = std::result::Result<T, ChatFlowError>;
}

pub use error::{ChatFlowError, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{ChatFlowError, EngineConfig, Result};

    pub use crate::workflow::{
        ActionContext, ActionError, ActionHandler, ActionHandlerRegistry, ActionParams,
        ChoiceValue, ControllerOptions, NodeId, VariableUpdates, WorkflowController,
        WorkflowDefinition, WorkflowId, WorkflowService, WorkflowStatePayload,
    };
}
