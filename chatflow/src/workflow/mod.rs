//! Workflow system data structures and types
//!
//! This module provides the core types for representing and driving
//! conversational workflows described as PlantUML activity diagrams.

mod actions;
mod controller;
mod definition;
mod definition_store;
mod executor;
mod instance;
mod node;
mod parser;
mod persistence;
mod service;
mod state_calculator;
mod template;
#[cfg(test)]
mod test_helpers;
mod transition;

pub use actions::{
    ActionContext, ActionError, ActionFn, ActionHandler, ActionHandlerRegistry, ActionParams,
    ActionResult, HandlerFactory, HandlerOutput, HandlerSource, LogHandler, LogLevel,
    SetVariableHandler, WaitHandler,
};
pub use controller::{
    ChoiceValue, ControllerError, ControllerOptions, ControllerResult, WorkflowController,
};
pub use definition::{DefinitionError, DefinitionResult, WorkflowDefinition, WorkflowId};
pub use definition_store::{DefinitionStore, MemoryDefinitionStore};
pub use executor::{ActionExecutor, ActionOutcome, ExecutorOptions};
pub use instance::{InstanceManager, VariableUpdates, WorkflowInstance};
pub use node::{ActionDescriptor, NodeAnnotation, NodeError, NodeId, NodeResult, WorkflowNode};
pub use parser::{ParseError, ParseResult, PlantUmlParser};
pub use persistence::{
    FileSystemWorkflowRepository, MemoryWorkflowRepository, PersistedWorkflow, WorkflowRepository,
};
pub use service::WorkflowService;
pub use state_calculator::{
    calculate_current_payload, calculate_start_node, raw_start_node, WorkflowChoice,
    WorkflowStatePayload,
};
pub use template::TemplateResolver;
pub use transition::{StartPoint, Transition};
