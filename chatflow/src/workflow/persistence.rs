//! Persistence of workflow definitions and their current node

use crate::workflow::{NodeId, WorkflowId};
use crate::{ChatFlowError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A workflow as saved by a repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedWorkflow {
    /// Workflow ID
    pub id: WorkflowId,
    /// Display name
    pub name: String,
    /// Diagram source text
    pub diagram: String,
    /// Node the workflow was resting on when last saved
    pub current_node_id: Option<NodeId>,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When the record was last written
    pub updated_at: DateTime<Utc>,
}

impl PersistedWorkflow {
    /// Create a record with no current node
    pub fn new(id: WorkflowId, name: impl Into<String>, diagram: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            diagram: diagram.into(),
            current_node_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Trait for workflow persistence backends
#[async_trait::async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Fetch a workflow record
    async fn get_by_id(&self, id: &WorkflowId) -> Result<Option<PersistedWorkflow>>;

    /// Create a record, replacing any existing one with the same ID
    async fn create(&self, workflow: PersistedWorkflow) -> Result<()>;

    /// Overwrite an existing record
    async fn update(&self, workflow: PersistedWorkflow) -> Result<()>;

    /// Record the current node of an existing workflow
    async fn update_current_node_id(&self, id: &WorkflowId, node_id: &NodeId) -> Result<()>;
}

/// In-memory workflow repository
#[derive(Debug, Default)]
pub struct MemoryWorkflowRepository {
    workflows: DashMap<WorkflowId, PersistedWorkflow>,
}

impl MemoryWorkflowRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    /// Whether the repository is empty
    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

#[async_trait::async_trait]
impl WorkflowRepository for MemoryWorkflowRepository {
    async fn get_by_id(&self, id: &WorkflowId) -> Result<Option<PersistedWorkflow>> {
        Ok(self.workflows.get(id).map(|entry| entry.value().clone()))
    }

    async fn create(&self, workflow: PersistedWorkflow) -> Result<()> {
        self.workflows.insert(workflow.id.clone(), workflow);
        Ok(())
    }

    async fn update(&self, mut workflow: PersistedWorkflow) -> Result<()> {
        if !self.workflows.contains_key(&workflow.id) {
            return Err(ChatFlowError::WorkflowNotFound(workflow.id.to_string()));
        }
        workflow.updated_at = Utc::now();
        self.workflows.insert(workflow.id.clone(), workflow);
        Ok(())
    }

    async fn update_current_node_id(&self, id: &WorkflowId, node_id: &NodeId) -> Result<()> {
        let mut entry = self
            .workflows
            .get_mut(id)
            .ok_or_else(|| ChatFlowError::WorkflowNotFound(id.to_string()))?;
        entry.current_node_id = Some(node_id.clone());
        entry.updated_at = Utc::now();
        Ok(())
    }
}

/// File system workflow repository
///
/// Each workflow is stored as `<base>/<id>.json`; records are cached after the
/// first read.
#[derive(Debug)]
pub struct FileSystemWorkflowRepository {
    base_path: PathBuf,
    cache: DashMap<WorkflowId, PersistedWorkflow>,
}

impl FileSystemWorkflowRepository {
    /// Create a repository rooted at `base_path`, creating the directory if needed
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }

        Ok(Self {
            base_path,
            cache: DashMap::new(),
        })
    }

    /// Directory holding the workflow files
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn workflow_path(&self, id: &WorkflowId) -> Result<PathBuf> {
        let id = id.as_str();
        if id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(ChatFlowError::Storage(format!(
                "Workflow ID '{}' cannot be used as a file name",
                id
            )));
        }
        Ok(self.base_path.join(format!("{}.json", id)))
    }

    async fn write(&self, workflow: &PersistedWorkflow) -> Result<()> {
        let path = self.workflow_path(&workflow.id)?;
        let content = serde_json::to_string_pretty(workflow)?;
        tokio::fs::write(&path, content).await?;
        self.cache.insert(workflow.id.clone(), workflow.clone());
        Ok(())
    }

    async fn read(&self, id: &WorkflowId) -> Result<Option<PersistedWorkflow>> {
        if let Some(workflow) = self.cache.get(id) {
            return Ok(Some(workflow.clone()));
        }

        let path = self.workflow_path(id)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let workflow: PersistedWorkflow = serde_json::from_str(&content)?;
        self.cache.insert(id.clone(), workflow.clone());
        Ok(Some(workflow))
    }
}

#[async_trait::async_trait]
impl WorkflowRepository for FileSystemWorkflowRepository {
    async fn get_by_id(&self, id: &WorkflowId) -> Result<Option<PersistedWorkflow>> {
        self.read(id).await
    }

    async fn create(&self, workflow: PersistedWorkflow) -> Result<()> {
        self.write(&workflow).await
    }

    async fn update(&self, mut workflow: PersistedWorkflow) -> Result<()> {
        if self.read(&workflow.id).await?.is_none() {
            return Err(ChatFlowError::WorkflowNotFound(workflow.id.to_string()));
        }
        workflow.updated_at = Utc::now();
        self.write(&workflow).await
    }

    async fn update_current_node_id(&self, id: &WorkflowId, node_id: &NodeId) -> Result<()> {
        let mut workflow = self
            .read(id)
            .await?
            .ok_or_else(|| ChatFlowError::WorkflowNotFound(id.to_string()))?;
        workflow.current_node_id = Some(node_id.clone());
        workflow.updated_at = Utc::now();
        self.write(&workflow).await
    }
}
