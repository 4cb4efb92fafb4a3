//! Drives workflow instances through their definitions

use crate::config::EngineConfig;
use crate::workflow::{
    calculate_current_payload, calculate_start_node, raw_start_node, ActionExecutor,
    ActionHandlerRegistry, ActionOutcome, DefinitionStore, ExecutorOptions, InstanceManager,
    MemoryDefinitionStore, NodeId, ParseError, PersistedWorkflow, PlantUmlParser, Transition,
    WorkflowDefinition, WorkflowId, WorkflowRepository, WorkflowStatePayload,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Errors raised by controller operations
///
/// Handler and persistence failures are logged, never returned.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// An ID, key or diagram text was empty
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// No definition is stored under the ID
    #[error("Workflow '{0}' not found")]
    WorkflowNotFound(String),
    /// The definition has no nodes to start on
    #[error("Workflow '{0}' has no nodes")]
    EmptyWorkflow(String),
    /// The diagram could not be parsed
    #[error("Failed to parse workflow: {0}")]
    Parse(#[from] ParseError),
}

/// Result type for controller operations
pub type ControllerResult<T> = Result<T, ControllerError>;

/// A user's answer to the current node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceValue {
    /// Target node ID, target label, condition text or a numeric index
    Text(String),
    /// Zero-based position among the outgoing transitions
    Index(usize),
}

impl From<&str> for ChoiceValue {
    fn from(value: &str) -> Self {
        ChoiceValue::Text(value.to_string())
    }
}

impl From<String> for ChoiceValue {
    fn from(value: String) -> Self {
        ChoiceValue::Text(value)
    }
}

impl From<usize> for ChoiceValue {
    fn from(value: usize) -> Self {
        ChoiceValue::Index(value)
    }
}

/// Controller settings
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Run action handlers on background tasks
    pub background_actions: bool,
    /// Upper bound on a single handler run
    pub action_timeout: Option<Duration>,
    /// Maximum automatic moves made by one operation
    pub max_auto_advance_steps: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            background_actions: false,
            action_timeout: None,
            max_auto_advance_steps: 256,
        }
    }
}

impl From<&EngineConfig> for ControllerOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            background_actions: config.background_actions,
            action_timeout: config.action_timeout(),
            max_auto_advance_steps: config.max_auto_advance_steps,
        }
    }
}

/// Orchestrates import, start, restart and advance for every workflow
///
/// Operations on one workflow ID are serialised; different IDs proceed in
/// parallel.
pub struct WorkflowController {
    parser: PlantUmlParser,
    definitions: Arc<dyn DefinitionStore>,
    instances: Arc<InstanceManager>,
    executor: ActionExecutor,
    repository: Option<Arc<dyn WorkflowRepository>>,
    locks: DashMap<WorkflowId, Arc<Mutex<()>>>,
    cancel: CancellationToken,
    options: ControllerOptions,
}

impl std::fmt::Debug for WorkflowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowController")
            .field("definitions", &self.definitions.ids().len())
            .field("has_repository", &self.repository.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl WorkflowController {
    /// Create a controller with in-memory definition storage and no repository
    pub fn new(
        registry: Arc<ActionHandlerRegistry>,
        options: ControllerOptions,
    ) -> ControllerResult<Self> {
        let instances = Arc::new(InstanceManager::new());
        let executor = ActionExecutor::new(
            registry,
            instances.clone(),
            ExecutorOptions {
                background: options.background_actions,
                timeout: options.action_timeout,
            },
        );

        Ok(Self {
            parser: PlantUmlParser::new()?,
            definitions: Arc::new(MemoryDefinitionStore::new()),
            instances,
            executor,
            repository: None,
            locks: DashMap::new(),
            cancel: CancellationToken::new(),
            options,
        })
    }

    /// Persist current nodes through a repository
    pub fn with_repository(mut self, repository: Arc<dyn WorkflowRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Use a different definition store
    pub fn with_definition_store(mut self, definitions: Arc<dyn DefinitionStore>) -> Self {
        self.definitions = definitions;
        self
    }

    /// The handler registry
    pub fn registry(&self) -> &Arc<ActionHandlerRegistry> {
        self.executor.registry()
    }

    /// The instance table
    pub fn instances(&self) -> &Arc<InstanceManager> {
        &self.instances
    }

    /// Controller settings
    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    /// Cancel every running handler and refuse new ones
    pub fn shutdown(&self) {
        tracing::info!("Cancelling running actions");
        self.cancel.cancel();
    }

    /// Parse and store a diagram, then start its instance
    ///
    /// Importing an ID that is already stored reuses the stored definition
    /// and only starts the instance if it has no current node.
    pub async fn import_workflow(
        &self,
        text: &str,
        id: Option<&str>,
        name: Option<&str>,
    ) -> ControllerResult<Arc<WorkflowDefinition>> {
        if text.trim().is_empty() {
            return Err(ControllerError::InvalidArgument(
                "diagram text cannot be empty".to_string(),
            ));
        }
        let id = match id {
            Some(id) => parse_id(id)?,
            None => WorkflowId::generate(),
        };

        let lock = self.lock_for(&id);
        let _guard = lock.lock().await;

        if let Some(existing) = self.definitions.get(&id) {
            tracing::info!(workflow_id = %id, "Workflow already imported, reusing definition");
            if self.instances.current_node(&id).is_none() {
                self.start_locked(&id, &existing).await?;
            }
            return Ok(existing);
        }

        let parsed = self.parser.parse(text, Some(id.as_str()), name)?;
        let definition = self.definitions.insert(parsed);
        tracing::info!(
            workflow_id = %id,
            name = %definition.name,
            nodes = definition.nodes.len(),
            "Imported workflow"
        );

        self.persist_definition(&definition).await;
        self.start_locked(&id, &definition).await?;
        Ok(definition)
    }

    /// Start an instance, resuming from the repository when it has a saved node
    pub async fn start_instance(&self, id: &str) -> ControllerResult<()> {
        let id = parse_id(id)?;
        let definition = self.definition(&id)?;

        let lock = self.lock_for(&id);
        let _guard = lock.lock().await;
        self.start_locked(&id, &definition).await
    }

    /// Throw away the current position and start over from the start node
    ///
    /// The repository is written but never read.
    pub async fn restart_instance(&self, id: &str) -> ControllerResult<()> {
        let id = parse_id(id)?;
        let definition = self.definition(&id)?;

        let lock = self.lock_for(&id);
        let _guard = lock.lock().await;

        self.instances.clear_current_node(&id);
        let start = calculate_start_node(&definition)
            .ok_or_else(|| ControllerError::EmptyWorkflow(id.to_string()))?;
        tracing::info!(workflow_id = %id, node_id = %start, "Restarting workflow");

        self.move_to(&id, start.clone()).await;
        let outcome = self.execute_at(&id, &definition, &start).await;
        self.auto_advance(&id, &definition, start, outcome).await;
        Ok(())
    }

    /// Describe the current node
    pub async fn get_current_state_payload(
        &self,
        id: &str,
    ) -> ControllerResult<WorkflowStatePayload> {
        let id = parse_id(id)?;
        let definition = self.definition(&id)?;
        let current = self.instances.current_node(&id);
        Ok(calculate_current_payload(&definition, current.as_ref()))
    }

    /// Follow the transition picked by `choice`
    ///
    /// Returns `false` and leaves the instance untouched when nothing matches.
    pub async fn advance_by_choice_value(
        &self,
        id: &str,
        choice: Option<ChoiceValue>,
    ) -> ControllerResult<bool> {
        let id = parse_id(id)?;
        let definition = self.definition(&id)?;

        let lock = self.lock_for(&id);
        let _guard = lock.lock().await;

        let Some(current) = self.instances.current_node(&id) else {
            tracing::debug!(workflow_id = %id, "Cannot advance an unstarted workflow");
            return Ok(false);
        };

        let outgoing = definition.outgoing(&current);
        let Some(target) = match_choice(&definition, &outgoing, choice.as_ref()) else {
            tracing::debug!(
                workflow_id = %id,
                node_id = %current,
                choice = ?choice,
                "Choice did not match any transition"
            );
            return Ok(false);
        };

        tracing::info!(workflow_id = %id, from = %current, to = %target, "Advancing workflow");
        self.move_to(&id, target.clone()).await;
        let outcome = self.execute_at(&id, &definition, &target).await;
        self.auto_advance(&id, &definition, target, outcome).await;
        Ok(true)
    }

    /// Whether a definition is stored under the ID
    pub fn workflow_exists(&self, id: &str) -> bool {
        WorkflowId::try_new(id)
            .map(|id| self.definitions.contains(&id))
            .unwrap_or(false)
    }

    /// Current node of an instance, `None` for unknown or unstarted workflows
    pub fn get_current_node_id(&self, id: &str) -> Option<NodeId> {
        let id = WorkflowId::try_new(id).ok()?;
        self.instances.current_node(&id)
    }

    /// Set an instance variable, creating the instance if needed
    pub fn set_variable(&self, id: &str, key: &str, value: impl Into<String>) -> ControllerResult<()> {
        let id = parse_id(id)?;
        if key.trim().is_empty() {
            return Err(ControllerError::InvalidArgument(
                "variable name cannot be empty".to_string(),
            ));
        }
        self.instances.set_variable(&id, key, value);
        Ok(())
    }

    /// Copy of an instance's variables
    pub fn variables(&self, id: &str) -> HashMap<String, String> {
        WorkflowId::try_new(id)
            .map(|id| self.instances.variables(&id))
            .unwrap_or_default()
    }

    fn definition(&self, id: &WorkflowId) -> ControllerResult<Arc<WorkflowDefinition>> {
        self.definitions
            .get(id)
            .ok_or_else(|| ControllerError::WorkflowNotFound(id.to_string()))
    }

    fn lock_for(&self, id: &WorkflowId) -> Arc<Mutex<()>> {
        self.locks.entry(id.clone()).or_default().clone()
    }

    async fn start_locked(
        &self,
        id: &WorkflowId,
        definition: &WorkflowDefinition,
    ) -> ControllerResult<()> {
        if let Some(saved) = self.restore_current_node(id, definition).await {
            tracing::info!(workflow_id = %id, node_id = %saved, "Resuming workflow");
            self.instances.set_current_node(id, saved);
            return Ok(());
        }

        let start = calculate_start_node(definition)
            .ok_or_else(|| ControllerError::EmptyWorkflow(id.to_string()))?;
        tracing::info!(workflow_id = %id, node_id = %start, "Starting workflow");
        self.move_to(id, start.clone()).await;

        if let Some(raw) = raw_start_node(definition).filter(|raw| raw != &start) {
            self.execute_at(id, definition, &raw).await;
        }
        let outcome = self.execute_at(id, definition, &start).await;
        self.auto_advance(id, definition, start, outcome).await;
        Ok(())
    }

    /// Keep moving along single transitions while the nodes carry actions
    async fn auto_advance(
        &self,
        id: &WorkflowId,
        definition: &WorkflowDefinition,
        mut node_id: NodeId,
        mut outcome: ActionOutcome,
    ) {
        let mut steps = 0;
        while outcome.is_action_node() {
            let outgoing = definition.outgoing(&node_id);
            if outgoing.len() != 1 {
                break;
            }
            if steps >= self.options.max_auto_advance_steps {
                tracing::warn!(
                    workflow_id = %id,
                    node_id = %node_id,
                    steps,
                    "Auto-advance step limit reached, stopping"
                );
                break;
            }
            steps += 1;

            let next = outgoing[0].to.clone();
            tracing::info!(workflow_id = %id, from = %node_id, to = %next, "Auto-advancing");
            self.move_to(id, next.clone()).await;
            outcome = self.execute_at(id, definition, &next).await;
            node_id = next;
        }
    }

    async fn execute_at(
        &self,
        id: &WorkflowId,
        definition: &WorkflowDefinition,
        node_id: &NodeId,
    ) -> ActionOutcome {
        match definition.node(node_id) {
            Some(node) => {
                self.executor
                    .execute_node(id, node, definition, self.cancel.child_token())
                    .await
            }
            None => ActionOutcome::NotAnAction,
        }
    }

    async fn move_to(&self, id: &WorkflowId, node_id: NodeId) {
        self.instances.set_current_node(id, node_id.clone());
        self.persist_current_node(id, &node_id).await;
    }

    async fn restore_current_node(
        &self,
        id: &WorkflowId,
        definition: &WorkflowDefinition,
    ) -> Option<NodeId> {
        let repository = self.repository.as_ref()?;
        let saved = match repository.get_by_id(id).await {
            Ok(record) => record?.current_node_id?,
            Err(e) => {
                tracing::warn!(workflow_id = %id, "Failed to read saved workflow: {}", e);
                return None;
            }
        };

        if definition.contains_node(&saved) {
            Some(saved)
        } else {
            tracing::warn!(
                workflow_id = %id,
                node_id = %saved,
                "Saved node no longer exists in the diagram, starting fresh"
            );
            None
        }
    }

    async fn persist_definition(&self, definition: &WorkflowDefinition) {
        let Some(repository) = self.repository.as_ref() else {
            return;
        };
        match repository.get_by_id(&definition.id).await {
            Ok(Some(_)) => {
                tracing::debug!(workflow_id = %definition.id, "Workflow already persisted");
            }
            Ok(None) => {
                let record = PersistedWorkflow::new(
                    definition.id.clone(),
                    definition.name.clone(),
                    definition.source.clone().unwrap_or_default(),
                );
                if let Err(e) = repository.create(record).await {
                    tracing::warn!(workflow_id = %definition.id, "Failed to persist workflow: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!(workflow_id = %definition.id, "Failed to read saved workflow: {}", e);
            }
        }
    }

    async fn persist_current_node(&self, id: &WorkflowId, node_id: &NodeId) {
        if let Some(repository) = self.repository.as_ref() {
            if let Err(e) = repository.update_current_node_id(id, node_id).await {
                tracing::warn!(
                    workflow_id = %id,
                    node_id = %node_id,
                    "Failed to persist current node: {}",
                    e
                );
            }
        }
    }
}

fn parse_id(id: &str) -> ControllerResult<WorkflowId> {
    WorkflowId::try_new(id)
        .map_err(|_| ControllerError::InvalidArgument("workflow ID cannot be empty".to_string()))
}

/// Pick the transition a choice refers to
///
/// Text is tried as a target ID, then as a target label or condition, then as
/// a numeric index. `None` only matches a node with a single way out.
fn match_choice(
    definition: &WorkflowDefinition,
    outgoing: &[&Transition],
    choice: Option<&ChoiceValue>,
) -> Option<NodeId> {
    let transition = match choice {
        None => match outgoing {
            [only] => Some(*only),
            _ => None,
        },
        Some(ChoiceValue::Index(index)) => outgoing.get(*index).copied(),
        Some(ChoiceValue::Text(text)) => {
            let text = text.trim();
            outgoing
                .iter()
                .find(|t| t.to.as_str() == text)
                .or_else(|| {
                    outgoing.iter().find(|t| {
                        definition
                            .node(&t.to)
                            .is_some_and(|node| node.label.trim() == text)
                    })
                })
                .or_else(|| {
                    outgoing
                        .iter()
                        .find(|t| t.condition.as_deref().map(str::trim) == Some(text))
                })
                .or_else(|| text.parse::<usize>().ok().and_then(|i| outgoing.get(i)))
                .copied()
        }
    };
    transition.map(|t| t.to.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{ActionError, MemoryWorkflowRepository, VariableUpdates};

    const CHOICE_DIAGRAM: &str = "@startuml\n[*] --> Ask\n:Ask;\nAsk --> Tea : tea please\nAsk --> Coffee\n:Coffee;\nTea --> Done\nCoffee --> Done\n@enduml";

    fn controller() -> WorkflowController {
        WorkflowController::new(
            Arc::new(ActionHandlerRegistry::new()),
            ControllerOptions::default(),
        )
        .unwrap()
    }

    fn action_chain(nodes: &[&str]) -> String {
        let mut diagram = format!("@startuml\n[*] --> {}\n", nodes[0]);
        for node in nodes {
            diagram.push_str(&format!(
                ":{};\nnote right: {{\"action\":\"Count\",\"params\":{{\"node\":\"{}\"}}}}\n",
                node, node
            ));
        }
        for pair in nodes.windows(2) {
            diagram.push_str(&format!("{} --> {}\n", pair[0], pair[1]));
        }
        diagram.push_str("@enduml");
        diagram
    }

    struct UnavailableRepository;

    #[async_trait::async_trait]
    impl WorkflowRepository for UnavailableRepository {
        async fn get_by_id(&self, _id: &WorkflowId) -> crate::Result<Option<PersistedWorkflow>> {
            Err(crate::ChatFlowError::Storage("unavailable".into()))
        }

        async fn create(&self, _workflow: PersistedWorkflow) -> crate::Result<()> {
            Err(crate::ChatFlowError::Storage("unavailable".into()))
        }

        async fn update(&self, _workflow: PersistedWorkflow) -> crate::Result<()> {
            Err(crate::ChatFlowError::Storage("unavailable".into()))
        }

        async fn update_current_node_id(
            &self,
            _id: &WorkflowId,
            _node_id: &NodeId,
        ) -> crate::Result<()> {
            Err(crate::ChatFlowError::Storage("unavailable".into()))
        }
    }

    fn register_counter(controller: &WorkflowController) {
        controller
            .registry()
            .register_fn("Count", |context, params, _cancel| async move {
                let seen = context.variables.get("visited").cloned().unwrap_or_default();
                let mut updates = VariableUpdates::new();
                updates.insert("visited".to_string(), format!("{}{}", seen, params["node"]));
                Ok(Some(updates))
            });
    }

    #[tokio::test]
    async fn test_import_rejects_empty_arguments() {
        let controller = controller();
        assert!(matches!(
            controller.import_workflow("   ", Some("wf"), None).await,
            Err(ControllerError::InvalidArgument(_))
        ));
        assert!(matches!(
            controller.import_workflow(CHOICE_DIAGRAM, Some(" "), None).await,
            Err(ControllerError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_import_generates_id_and_starts() {
        let controller = controller();
        let definition = controller
            .import_workflow(CHOICE_DIAGRAM, None, Some("Drinks"))
            .await
            .unwrap();

        assert_eq!(definition.name, "Drinks");
        assert!(controller.workflow_exists(definition.id.as_str()));
        assert_eq!(
            controller.get_current_node_id(definition.id.as_str()),
            Some(NodeId::new("Ask"))
        );
    }

    #[tokio::test]
    async fn test_reimport_reuses_definition() {
        let controller = controller();
        let first = controller
            .import_workflow(CHOICE_DIAGRAM, Some("wf"), None)
            .await
            .unwrap();
        let second = controller
            .import_workflow("@startuml\n[*] --> Other\n@enduml", Some("wf"), None)
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(controller.get_current_node_id("wf"), Some(NodeId::new("Ask")));
    }

    #[tokio::test]
    async fn test_unknown_workflow_errors() {
        let controller = controller();
        assert!(matches!(
            controller.start_instance("nope").await,
            Err(ControllerError::WorkflowNotFound(_))
        ));
        assert!(matches!(
            controller.restart_instance("nope").await,
            Err(ControllerError::WorkflowNotFound(_))
        ));
        assert!(matches!(
            controller.advance_by_choice_value("nope", None).await,
            Err(ControllerError::WorkflowNotFound(_))
        ));
        assert!(matches!(
            controller.get_current_state_payload("nope").await,
            Err(ControllerError::WorkflowNotFound(_))
        ));
        assert!(!controller.workflow_exists("nope"));
        assert!(!controller.workflow_exists(""));
        assert_eq!(controller.get_current_node_id("nope"), None);
    }

    #[tokio::test]
    async fn test_choice_payload_and_matching() {
        let controller = controller();
        controller
            .import_workflow(CHOICE_DIAGRAM, Some("wf"), None)
            .await
            .unwrap();

        let payload = controller.get_current_state_payload("wf").await.unwrap();
        assert!(payload.is_choice);
        let labels: Vec<_> = payload.choices.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["tea please", "Coffee"]);

        assert!(!controller.advance_by_choice_value("wf", None).await.unwrap());
        assert!(!controller
            .advance_by_choice_value("wf", Some("Juice".into()))
            .await
            .unwrap());
        assert!(!controller
            .advance_by_choice_value("wf", Some(5usize.into()))
            .await
            .unwrap());
        assert_eq!(controller.get_current_node_id("wf"), Some(NodeId::new("Ask")));

        assert!(controller
            .advance_by_choice_value("wf", Some("1".into()))
            .await
            .unwrap());
        assert_eq!(controller.get_current_node_id("wf"), Some(NodeId::new("Coffee")));

        assert!(controller.advance_by_choice_value("wf", None).await.unwrap());
        assert_eq!(controller.get_current_node_id("wf"), Some(NodeId::new("Done")));
    }

    #[tokio::test]
    async fn test_choice_by_condition_and_id() {
        let controller = controller();
        controller
            .import_workflow(CHOICE_DIAGRAM, Some("a"), None)
            .await
            .unwrap();
        controller
            .import_workflow(CHOICE_DIAGRAM, Some("b"), None)
            .await
            .unwrap();

        assert!(controller
            .advance_by_choice_value("a", Some("tea please".into()))
            .await
            .unwrap());
        assert_eq!(controller.get_current_node_id("a"), Some(NodeId::new("Tea")));

        assert!(controller
            .advance_by_choice_value("b", Some("Coffee".into()))
            .await
            .unwrap());
        assert_eq!(controller.get_current_node_id("b"), Some(NodeId::new("Coffee")));
    }

    #[tokio::test]
    async fn test_linear_action_chain_lands_on_last_node() {
        let controller = controller();
        register_counter(&controller);

        controller
            .import_workflow(&action_chain(&["A", "B", "C"]), Some("wf"), None)
            .await
            .unwrap();

        assert_eq!(controller.get_current_node_id("wf"), Some(NodeId::new("C")));
        assert_eq!(controller.variables("wf")["visited"], "ABC");
    }

    #[tokio::test]
    async fn test_auto_advance_is_bounded() {
        let controller = WorkflowController::new(
            Arc::new(ActionHandlerRegistry::new()),
            ControllerOptions {
                max_auto_advance_steps: 5,
                ..ControllerOptions::default()
            },
        )
        .unwrap();
        register_counter(&controller);

        let mut diagram = action_chain(&["A", "B"]);
        diagram = diagram.replace("@enduml", "B --> A\n@enduml");
        controller
            .import_workflow(&diagram, Some("loop"), None)
            .await
            .unwrap();

        assert_eq!(controller.variables("loop")["visited"], "ABABAB");
        assert_eq!(controller.get_current_node_id("loop"), Some(NodeId::new("B")));
    }

    #[tokio::test]
    async fn test_failing_handler_still_advances() {
        let controller = controller();
        controller
            .registry()
            .register_fn("Count", |_context, _params, _cancel| async move {
                Err(ActionError::execution("handler blew up"))
            });

        controller
            .import_workflow(&action_chain(&["A", "B"]), Some("wf"), None)
            .await
            .unwrap();
        assert_eq!(controller.get_current_node_id("wf"), Some(NodeId::new("B")));
        assert!(controller.variables("wf").is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_handler_still_advances() {
        let controller = controller();
        register_counter(&controller);
        controller
            .registry()
            .register_fn("Halt", |_context, _params, _cancel| async move {
                Err(ActionError::Cancelled)
            });

        let diagram = "@startuml\n[*] --> A\n:A;\nnote right: {\"action\":\"Halt\"}\nA --> B\n:B;\nnote right: {\"action\":\"Count\",\"params\":{\"node\":\"B\"}}\n@enduml";
        controller
            .import_workflow(diagram, Some("wf"), None)
            .await
            .unwrap();

        assert_eq!(controller.get_current_node_id("wf"), Some(NodeId::new("B")));
        assert_eq!(controller.variables("wf")["visited"], "B");
    }

    #[tokio::test]
    async fn test_start_runs_raw_and_resolved_start_actions_once() {
        let controller = controller();
        register_counter(&controller);

        let diagram = "@startuml\nstart\nnote right: {\"action\":\"Count\",\"params\":{\"node\":\"S\"}}\n:A;\nnote right: {\"action\":\"Count\",\"params\":{\"node\":\"A\"}}\n@enduml";
        controller
            .import_workflow(diagram, Some("wf"), None)
            .await
            .unwrap();

        assert_eq!(controller.get_current_node_id("wf"), Some(NodeId::new("A")));
        assert_eq!(controller.variables("wf")["visited"], "SA");
    }

    #[tokio::test]
    async fn test_storage_errors_do_not_fail_operations() {
        let controller = controller().with_repository(Arc::new(UnavailableRepository));
        let diagram = "@startuml\nstart\n:Hello;\n:Bye;\nstop\n@enduml";

        controller
            .import_workflow(diagram, Some("wf"), None)
            .await
            .unwrap();
        assert_eq!(controller.get_current_node_id("wf"), Some(NodeId::new("Hello")));

        controller.start_instance("wf").await.unwrap();
        assert_eq!(controller.get_current_node_id("wf"), Some(NodeId::new("Hello")));

        assert!(controller.advance_by_choice_value("wf", None).await.unwrap());
        assert_eq!(controller.get_current_node_id("wf"), Some(NodeId::new("Bye")));

        controller.restart_instance("wf").await.unwrap();
        assert_eq!(controller.get_current_node_id("wf"), Some(NodeId::new("Hello")));
    }

    #[tokio::test]
    async fn test_restart_ignores_repository() {
        let repository = Arc::new(MemoryWorkflowRepository::new());
        let controller = controller().with_repository(repository.clone());
        controller
            .import_workflow(CHOICE_DIAGRAM, Some("wf"), None)
            .await
            .unwrap();
        controller
            .advance_by_choice_value("wf", Some("Tea".into()))
            .await
            .unwrap();

        let id = WorkflowId::try_new("wf").unwrap();
        let saved = repository.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(saved.current_node_id, Some(NodeId::new("Tea")));

        controller.restart_instance("wf").await.unwrap();
        assert_eq!(controller.get_current_node_id("wf"), Some(NodeId::new("Ask")));
        let saved = repository.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(saved.current_node_id, Some(NodeId::new("Ask")));
    }

    #[tokio::test]
    async fn test_start_resumes_saved_node() {
        let repository = Arc::new(MemoryWorkflowRepository::new());
        let controller = controller().with_repository(repository.clone());
        controller
            .import_workflow(CHOICE_DIAGRAM, Some("wf"), None)
            .await
            .unwrap();
        controller
            .advance_by_choice_value("wf", Some(0usize.into()))
            .await
            .unwrap();

        controller.start_instance("wf").await.unwrap();
        assert_eq!(controller.get_current_node_id("wf"), Some(NodeId::new("Tea")));
    }

    #[tokio::test]
    async fn test_set_variable_validates_arguments() {
        let controller = controller();
        assert!(controller.set_variable("", "k", "v").is_err());
        assert!(controller.set_variable("wf", " ", "v").is_err());

        controller.set_variable("wf", "userName", "Alice").unwrap();
        assert_eq!(controller.variables("wf")["userName"], "Alice");
        assert!(controller.variables("").is_empty());
    }
}
