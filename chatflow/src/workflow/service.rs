//! Application-facing facade over the controller

use crate::config::EngineConfig;
use crate::workflow::{
    ActionHandlerRegistry, ChoiceValue, ControllerOptions, ControllerResult,
    FileSystemWorkflowRepository, NodeId, WorkflowController, WorkflowDefinition,
    WorkflowStatePayload,
};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Thin facade exposing controller operations to applications
#[derive(Debug, Clone)]
pub struct WorkflowService {
    controller: Arc<WorkflowController>,
}

impl WorkflowService {
    /// Wrap an existing controller
    pub fn new(controller: Arc<WorkflowController>) -> Self {
        Self { controller }
    }

    /// Build a controller from configuration
    ///
    /// A configured `state_dir` enables the file system repository.
    pub fn from_config(config: &EngineConfig, registry: Arc<ActionHandlerRegistry>) -> Result<Self> {
        let mut controller = WorkflowController::new(registry, ControllerOptions::from(config))?;
        if let Some(state_dir) = config.state_dir.as_ref() {
            tracing::debug!("Persisting workflows in {:?}", state_dir);
            controller =
                controller.with_repository(Arc::new(FileSystemWorkflowRepository::new(state_dir)?));
        }
        Ok(Self::new(Arc::new(controller)))
    }

    /// The wrapped controller
    pub fn controller(&self) -> &Arc<WorkflowController> {
        &self.controller
    }

    /// See [`WorkflowController::import_workflow`]
    pub async fn import_workflow(
        &self,
        text: &str,
        id: Option<&str>,
        name: Option<&str>,
    ) -> ControllerResult<Arc<WorkflowDefinition>> {
        self.controller.import_workflow(text, id, name).await
    }

    /// See [`WorkflowController::start_instance`]
    pub async fn start_instance(&self, id: &str) -> ControllerResult<()> {
        self.controller.start_instance(id).await
    }

    /// See [`WorkflowController::restart_instance`]
    pub async fn restart_instance(&self, id: &str) -> ControllerResult<()> {
        self.controller.restart_instance(id).await
    }

    /// See [`WorkflowController::get_current_state_payload`]
    pub async fn get_current_state_payload(
        &self,
        id: &str,
    ) -> ControllerResult<WorkflowStatePayload> {
        self.controller.get_current_state_payload(id).await
    }

    /// See [`WorkflowController::advance_by_choice_value`]
    pub async fn advance_by_choice_value(
        &self,
        id: &str,
        choice: Option<ChoiceValue>,
    ) -> ControllerResult<bool> {
        self.controller.advance_by_choice_value(id, choice).await
    }

    /// See [`WorkflowController::workflow_exists`]
    pub fn workflow_exists(&self, id: &str) -> bool {
        self.controller.workflow_exists(id)
    }

    /// See [`WorkflowController::get_current_node_id`]
    pub fn get_current_node_id(&self, id: &str) -> Option<NodeId> {
        self.controller.get_current_node_id(id)
    }

    /// See [`WorkflowController::set_variable`]
    pub fn set_variable(&self, id: &str, key: &str, value: impl Into<String>) -> ControllerResult<()> {
        self.controller.set_variable(id, key, value)
    }

    /// See [`WorkflowController::variables`]
    pub fn variables(&self, id: &str) -> HashMap<String, String> {
        self.controller.variables(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIAGRAM: &str = "@startuml\nstart\n:Hello;\n:Bye;\nstop\n@enduml";

    #[tokio::test]
    async fn test_service_delegates_to_controller() {
        let service = WorkflowService::from_config(
            &EngineConfig::default(),
            Arc::new(ActionHandlerRegistry::new()),
        )
        .unwrap();

        service.import_workflow(DIAGRAM, Some("wf"), None).await.unwrap();
        assert!(service.workflow_exists("wf"));
        assert_eq!(service.get_current_node_id("wf"), Some(NodeId::new("Hello")));

        let payload = service.get_current_state_payload("wf").await.unwrap();
        assert_eq!(payload.display_text, "Hello");
        assert!(!payload.is_choice);

        assert!(service.advance_by_choice_value("wf", None).await.unwrap());
        assert_eq!(service.get_current_node_id("wf"), Some(NodeId::new("Bye")));

        service.restart_instance("wf").await.unwrap();
        assert_eq!(service.get_current_node_id("wf"), Some(NodeId::new("Hello")));
    }

    #[tokio::test]
    async fn test_state_dir_enables_file_repository() {
        let temp_dir = TempDir::new().unwrap();
        let config = EngineConfig {
            state_dir: Some(temp_dir.path().join("state")),
            ..EngineConfig::default()
        };

        let service =
            WorkflowService::from_config(&config, Arc::new(ActionHandlerRegistry::new())).unwrap();
        service.import_workflow(DIAGRAM, Some("wf"), None).await.unwrap();

        assert!(temp_dir.path().join("state").join("wf.json").exists());
    }
}
