//! Runs the action declared on a node

use crate::workflow::{
    ActionContext, ActionError, ActionHandlerRegistry, ActionParams, HandlerOutput, HandlerSource,
    InstanceManager, TemplateResolver, WorkflowDefinition, WorkflowId, WorkflowNode,
};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What happened when a node's action was run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The node declares no action
    NotAnAction,
    /// No handler is registered for the action name
    HandlerMissing {
        /// Action name
        action: String,
    },
    /// The handler finished; `updated` variables were merged into the instance
    Completed {
        /// Number of merged variables
        updated: usize,
    },
    /// The handler returned an error, panicked or timed out
    Failed {
        /// Action name
        action: String,
        /// Error message
        error: String,
    },
    /// The handler was started on a background task
    Dispatched,
    /// The cancellation token fired before the handler finished
    Cancelled,
}

impl ActionOutcome {
    /// Whether a handler was found and run (or started)
    pub fn handler_invoked(&self) -> bool {
        matches!(
            self,
            ActionOutcome::Completed { .. } | ActionOutcome::Failed { .. } | ActionOutcome::Dispatched
        )
    }

    /// Whether the node declared an action at all
    pub fn is_action_node(&self) -> bool {
        !matches!(self, ActionOutcome::NotAnAction)
    }
}

/// Executor settings
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Run handlers on spawned tasks instead of awaiting them
    pub background: bool,
    /// Upper bound on a single handler run
    pub timeout: Option<Duration>,
}

/// Resolves the action on a node, runs its handler and merges the result
#[derive(Debug)]
pub struct ActionExecutor {
    registry: Arc<ActionHandlerRegistry>,
    instances: Arc<InstanceManager>,
    resolver: TemplateResolver,
    options: ExecutorOptions,
}

impl ActionExecutor {
    /// Create an executor
    pub fn new(
        registry: Arc<ActionHandlerRegistry>,
        instances: Arc<InstanceManager>,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            registry,
            instances,
            resolver: TemplateResolver::default(),
            options,
        }
    }

    /// The handler registry
    pub fn registry(&self) -> &Arc<ActionHandlerRegistry> {
        &self.registry
    }

    /// Executor settings
    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Run the node's action, returning whether a handler was invoked
    pub async fn execute(
        &self,
        workflow_id: &WorkflowId,
        node: &WorkflowNode,
        definition: &WorkflowDefinition,
        cancel: CancellationToken,
    ) -> bool {
        self.execute_node(workflow_id, node, definition, cancel)
            .await
            .handler_invoked()
    }

    /// Run the node's action and report what happened
    ///
    /// Handler errors never escape: they are logged and reported as
    /// [`ActionOutcome::Failed`].
    pub async fn execute_node(
        &self,
        workflow_id: &WorkflowId,
        node: &WorkflowNode,
        definition: &WorkflowDefinition,
        cancel: CancellationToken,
    ) -> ActionOutcome {
        let Some(descriptor) = node.action() else {
            return ActionOutcome::NotAnAction;
        };

        let variables = self.instances.variables(workflow_id);
        let params = self.resolver.resolve_params(&descriptor.params, &variables);

        let Some(handler) = self.registry.resolve(&descriptor.name) else {
            tracing::warn!(
                workflow_id = %workflow_id,
                node_id = %node.id,
                action = %descriptor.name,
                "No handler registered for action"
            );
            return ActionOutcome::HandlerMissing {
                action: descriptor.name.clone(),
            };
        };

        if cancel.is_cancelled() {
            return ActionOutcome::Cancelled;
        }

        tracing::debug!(
            workflow_id = %workflow_id,
            workflow = %definition.name,
            node_id = %node.id,
            action = %descriptor.name,
            kind = handler.kind(),
            "Running action"
        );

        let context = ActionContext {
            workflow_id: workflow_id.clone(),
            node_id: node.id.clone(),
            action: descriptor.name.clone(),
            variables,
        };
        let run = run_handler(
            handler,
            context,
            params,
            cancel,
            self.options.timeout,
            self.instances.clone(),
        );

        if self.options.background {
            tokio::spawn(run);
            ActionOutcome::Dispatched
        } else {
            run.await
        }
    }
}

async fn run_handler(
    handler: HandlerSource,
    context: ActionContext,
    params: ActionParams,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    instances: Arc<InstanceManager>,
) -> ActionOutcome {
    let workflow_id = context.workflow_id.clone();
    let node_id = context.node_id.clone();
    let action = context.action.clone();

    let invocation = AssertUnwindSafe(handler.invoke(context, params, cancel.clone())).catch_unwind();
    let result = tokio::select! {
        _ = cancel.cancelled() => Err(ActionError::Cancelled),
        result = bounded(invocation, timeout) => result,
    };

    match result {
        Ok(updates) => {
            let updates = updates.unwrap_or_default();
            let updated = updates.len();
            instances.merge_variables(&workflow_id, updates);
            tracing::debug!(
                workflow_id = %workflow_id,
                node_id = %node_id,
                action = %action,
                updated,
                "Action completed"
            );
            ActionOutcome::Completed { updated }
        }
        Err(ActionError::Cancelled) => {
            tracing::info!(
                workflow_id = %workflow_id,
                node_id = %node_id,
                action = %action,
                "Action cancelled"
            );
            ActionOutcome::Cancelled
        }
        Err(error) => {
            tracing::error!(
                workflow_id = %workflow_id,
                node_id = %node_id,
                action = %action,
                "Action failed: {}",
                error
            );
            ActionOutcome::Failed {
                action,
                error: error.to_string(),
            }
        }
    }
}

async fn bounded<F>(invocation: F, timeout: Option<Duration>) -> HandlerOutput
where
    F: Future<Output = Result<HandlerOutput, Box<dyn Any + Send>>>,
{
    let caught = match timeout {
        Some(limit) => tokio::time::timeout(limit, invocation)
            .await
            .map_err(|_| ActionError::Timeout { timeout: limit })?,
        None => invocation.await,
    };
    caught.unwrap_or_else(|panic| Err(ActionError::Panicked(panic_message(panic.as_ref()))))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
