//! Action handlers and the registry that maps action names to them

use crate::workflow::{NodeId, VariableUpdates, WorkflowId};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that can occur while running an action handler
#[derive(Debug, Error)]
pub enum ActionError {
    /// Generic handler failure
    #[error("Action execution failed: {0}")]
    ExecutionError(String),
    /// A parameter was missing or malformed
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// What was wrong with it
        message: String,
    },
    /// Handler did not finish in time
    #[error("Action execution timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded
        timeout: Duration,
    },
    /// Handler observed cancellation
    #[error("Action was cancelled")]
    Cancelled,
    /// Handler panicked
    #[error("Action handler panicked: {0}")]
    Panicked(String),
    /// IO error during action execution
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    /// JSON error during action execution
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ActionError {
    /// Shorthand for [`ActionError::ExecutionError`]
    pub fn execution(message: impl Into<String>) -> Self {
        ActionError::ExecutionError(message.into())
    }

    /// Shorthand for [`ActionError::InvalidParameter`]
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        ActionError::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Result type for action operations
pub type ActionResult<T> = Result<T, ActionError>;

/// Template-resolved parameters handed to a handler
pub type ActionParams = BTreeMap<String, String>;

/// What a handler returns: optional variables to merge into the instance
pub type HandlerOutput = ActionResult<Option<VariableUpdates>>;

/// Information about the node whose action is running
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Workflow the action belongs to
    pub workflow_id: WorkflowId,
    /// Node that declared the action
    pub node_id: NodeId,
    /// Action name
    pub action: String,
    /// Snapshot of the instance variables taken before the handler ran
    pub variables: HashMap<String, String>,
}

/// A typed action handler
///
/// Unless the executor runs handlers in the background, a handler runs while
/// the controller holds the lock for its workflow. Calling back into the
/// controller for the same workflow from inside `handle` deadlocks; spawn a
/// task for follow-up work instead.
#[async_trait::async_trait]
pub trait ActionHandler: Send + Sync {
    /// Run the action
    async fn handle(
        &self,
        context: ActionContext,
        params: ActionParams,
        cancel: CancellationToken,
    ) -> HandlerOutput;

    /// Get a description of what this handler does
    fn description(&self) -> String {
        "custom action handler".to_string()
    }
}

/// Boxed closure form of a handler
pub type ActionFn = Arc<
    dyn Fn(ActionContext, ActionParams, CancellationToken) -> BoxFuture<'static, HandlerOutput>
        + Send
        + Sync,
>;

/// Builds a fresh handler for each invocation
///
/// This is the hook for wiring handlers out of a dependency container: the
/// registry asks the factory for a new instance every time the action runs.
pub trait HandlerFactory: Send + Sync {
    /// Create the handler for one invocation
    fn create(&self) -> Arc<dyn ActionHandler>;
}

impl<F> HandlerFactory for F
where
    F: Fn() -> Arc<dyn ActionHandler> + Send + Sync,
{
    fn create(&self) -> Arc<dyn ActionHandler> {
        self()
    }
}

/// How a registered action is provided
#[derive(Clone)]
pub enum HandlerSource {
    /// An async closure
    Inline(ActionFn),
    /// One handler shared by every invocation
    Shared(Arc<dyn ActionHandler>),
    /// A factory producing a handler per invocation
    Scoped(Arc<dyn HandlerFactory>),
}

impl HandlerSource {
    /// Short name of the variant, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerSource::Inline(_) => "inline",
            HandlerSource::Shared(_) => "shared",
            HandlerSource::Scoped(_) => "scoped",
        }
    }

    /// Run the handler
    pub async fn invoke(
        self,
        context: ActionContext,
        params: ActionParams,
        cancel: CancellationToken,
    ) -> HandlerOutput {
        match self {
            HandlerSource::Inline(f) => f(context, params, cancel).await,
            HandlerSource::Shared(handler) => handler.handle(context, params, cancel).await,
            HandlerSource::Scoped(factory) => {
                let handler = factory.create();
                handler.handle(context, params, cancel).await
            }
        }
    }
}

impl std::fmt::Debug for HandlerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HandlerSource::{}", self.kind())
    }
}

/// Maps action names to handlers
///
/// Names are case-sensitive. Registering a name twice replaces the earlier
/// handler.
#[derive(Debug, Default)]
pub struct ActionHandlerRegistry {
    handlers: DashMap<String, HandlerSource>,
}

impl ActionHandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the `log`, `set_variable` and `wait` handlers
    pub fn with_builtin_handlers() -> Self {
        let registry = Self::new();
        registry.register_handler("log", Arc::new(LogHandler));
        registry.register_handler("set_variable", Arc::new(SetVariableHandler));
        registry.register_handler("wait", Arc::new(WaitHandler));
        registry
    }

    /// Register an async closure
    ///
    /// The closure is subject to the same locking rule as [`ActionHandler`]:
    /// awaiting controller calls for the running workflow deadlocks.
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(ActionContext, ActionParams, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerOutput> + Send + 'static,
    {
        let handler: ActionFn = Arc::new(
            move |context: ActionContext, params: ActionParams, cancel: CancellationToken| {
                f(context, params, cancel).boxed()
            },
        );
        self.register(name.into(), HandlerSource::Inline(handler));
    }

    /// Register a shared handler
    pub fn register_handler(&self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.register(name.into(), HandlerSource::Shared(handler));
    }

    /// Register a factory that builds a handler per invocation
    pub fn register_scoped(&self, name: impl Into<String>, factory: impl HandlerFactory + 'static) {
        self.register(name.into(), HandlerSource::Scoped(Arc::new(factory)));
    }

    fn register(&self, name: String, source: HandlerSource) {
        tracing::debug!(action = %name, kind = source.kind(), "Registering action handler");
        if let Some(previous) = self.handlers.insert(name.clone(), source) {
            tracing::warn!(
                action = %name,
                previous = previous.kind(),
                "Action handler registered twice, keeping the latest"
            );
        }
    }

    /// Look up a handler by action name
    pub fn resolve(&self, name: &str) -> Option<HandlerSource> {
        self.handlers.get(name).map(|entry| entry.value().clone())
    }

    /// Whether a handler is registered for the name
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Remove a handler
    pub fn unregister(&self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    /// Registered action names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

/// Log levels accepted by the `log` handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug log level
    Debug,
    /// Informational log level
    Info,
    /// Warning log level
    Warning,
    /// Error log level
    Error,
}

impl std::str::FromStr for LogLevel {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(ActionError::invalid_parameter(
                "level",
                format!("unknown log level '{}'", other),
            )),
        }
    }
}

/// `log`: writes `message` at `level` (default info)
#[derive(Debug, Clone, Default)]
pub struct LogHandler;

#[async_trait::async_trait]
impl ActionHandler for LogHandler {
    async fn handle(
        &self,
        context: ActionContext,
        params: ActionParams,
        _cancel: CancellationToken,
    ) -> HandlerOutput {
        let message = params.get("message").map(String::as_str).unwrap_or_default();
        let level: LogLevel = params
            .get("level")
            .map(String::as_str)
            .unwrap_or_default()
            .parse()?;

        let workflow_id = context.workflow_id.as_str();
        match level {
            LogLevel::Debug => tracing::debug!(workflow_id, "{}", message),
            LogLevel::Info => tracing::info!(workflow_id, "{}", message),
            LogLevel::Warning => tracing::warn!(workflow_id, "{}", message),
            LogLevel::Error => tracing::error!(workflow_id, "{}", message),
        }
        Ok(None)
    }

    fn description(&self) -> String {
        "Log a message".to_string()
    }
}

/// `set_variable`: every parameter becomes an instance variable
#[derive(Debug, Clone, Default)]
pub struct SetVariableHandler;

#[async_trait::async_trait]
impl ActionHandler for SetVariableHandler {
    async fn handle(
        &self,
        _context: ActionContext,
        params: ActionParams,
        _cancel: CancellationToken,
    ) -> HandlerOutput {
        Ok(Some(params.into_iter().collect()))
    }

    fn description(&self) -> String {
        "Set instance variables from parameters".to_string()
    }
}

/// `wait`: sleeps for `duration_ms`, stopping early on cancellation
#[derive(Debug, Clone, Default)]
pub struct WaitHandler;

#[async_trait::async_trait]
impl ActionHandler for WaitHandler {
    async fn handle(
        &self,
        _context: ActionContext,
        params: ActionParams,
        cancel: CancellationToken,
    ) -> HandlerOutput {
        let raw = params
            .get("duration_ms")
            .ok_or_else(|| ActionError::invalid_parameter("duration_ms", "missing"))?;
        let millis: u64 = raw
            .trim()
            .parse()
            .map_err(|e| ActionError::invalid_parameter("duration_ms", format!("{}", e)))?;

        tokio::select! {
            _ = cancel.cancelled() => Err(ActionError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(millis)) => Ok(None),
        }
    }

    fn description(&self) -> String {
        "Wait for a number of milliseconds".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(action: &str) -> ActionContext {
        ActionContext {
            workflow_id: WorkflowId::try_new("wf").unwrap(),
            node_id: NodeId::new("A"),
            action: action.to_string(),
            variables: HashMap::new(),
        }
    }

    fn params(pairs: &[(&str, &str)]) -> ActionParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    struct Echo(&'static str);

    #[async_trait::async_trait]
    impl ActionHandler for Echo {
        async fn handle(
            &self,
            context: ActionContext,
            _params: ActionParams,
            _cancel: CancellationToken,
        ) -> HandlerOutput {
            let mut updates = VariableUpdates::new();
            updates.insert("echo".to_string(), format!("{}:{}", self.0, context.workflow_id));
            Ok(Some(updates))
        }
    }

    #[tokio::test]
    async fn test_register_fn_and_invoke() {
        let registry = ActionHandlerRegistry::new();
        registry.register_fn("Greet", |context, params, _cancel| async move {
            let mut updates = VariableUpdates::new();
            updates.insert(
                "greeting".to_string(),
                format!("{} from {}", params["text"], context.node_id),
            );
            Ok(Some(updates))
        });

        let handler = registry.resolve("Greet").unwrap();
        assert_eq!(handler.kind(), "inline");
        let updates = handler
            .invoke(context("Greet"), params(&[("text", "hi")]), CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updates["greeting"], "hi from A");
    }

    #[tokio::test]
    async fn test_duplicate_registration_keeps_latest() {
        let registry = ActionHandlerRegistry::new();
        registry.register_handler("Echo", Arc::new(Echo("first")));
        registry.register_handler("Echo", Arc::new(Echo("second")));

        let updates = registry
            .resolve("Echo")
            .unwrap()
            .invoke(context("Echo"), ActionParams::new(), CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updates["echo"], "second:wf");
        assert_eq!(registry.names(), vec!["Echo".to_string()]);
    }

    #[tokio::test]
    async fn test_scoped_factory_builds_per_invocation() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let created = Arc::new(AtomicUsize::new(0));
        let registry = ActionHandlerRegistry::new();
        let counter = created.clone();
        registry.register_scoped("Echo", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(Echo("scoped")) as Arc<dyn ActionHandler>
        });

        for _ in 0..3 {
            registry
                .resolve("Echo")
                .unwrap()
                .invoke(context("Echo"), ActionParams::new(), CancellationToken::new())
                .await
                .unwrap();
        }
        assert_eq!(created.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let registry = ActionHandlerRegistry::with_builtin_handlers();
        assert!(registry.contains("log"));
        assert!(!registry.contains("Log"));
        assert!(registry.resolve("LOG").is_none());
        assert!(registry.unregister("log"));
        assert!(!registry.contains("log"));
    }

    #[tokio::test]
    async fn test_set_variable_handler() {
        let updates = SetVariableHandler
            .handle(
                context("set_variable"),
                params(&[("a", "1"), ("b", "2")]),
                CancellationToken::new(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates["b"], "2");
    }

    #[tokio::test]
    async fn test_log_handler_rejects_unknown_level() {
        let result = LogHandler
            .handle(
                context("log"),
                params(&[("message", "x"), ("level", "loud")]),
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(ActionError::InvalidParameter { .. })));

        let ok = LogHandler
            .handle(context("log"), params(&[("message", "x")]), CancellationToken::new())
            .await
            .unwrap();
        assert!(ok.is_none());
    }

    #[tokio::test]
    async fn test_wait_handler_honours_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = WaitHandler
            .handle(context("wait"), params(&[("duration_ms", "60000")]), cancel)
            .await;
        assert!(matches!(result, Err(ActionError::Cancelled)));
    }

    #[tokio::test]
    async fn test_wait_handler_validates_duration() {
        let result = WaitHandler
            .handle(context("wait"), params(&[("duration_ms", "soon")]), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ActionError::InvalidParameter { .. })));

        let result = WaitHandler
            .handle(context("wait"), params(&[("duration_ms", "1")]), CancellationToken::new())
            .await;
        assert!(result.unwrap().is_none());
    }
}
