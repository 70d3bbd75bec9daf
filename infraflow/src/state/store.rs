//! Persistence for workflow results, keyed by workflow id.

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::core::WorkflowResult;
use crate::errors::{ProvisionError, ProvisionResult};

/// Storage backend for workflow results.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Inserts a new workflow. Fails if the id is already present.
    async fn create(&self, result: &WorkflowResult) -> ProvisionResult<()>;

    /// Replaces the stored snapshot of a workflow.
    async fn put(&self, result: &WorkflowResult) -> ProvisionResult<()>;

    /// Returns the stored snapshot, if any.
    async fn get(&self, workflow_id: &str) -> ProvisionResult<Option<WorkflowResult>>;

    /// Returns every stored workflow id.
    async fn list(&self) -> ProvisionResult<Vec<String>>;
}

/// In-memory store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    results: DashMap<String, WorkflowResult>,
}

impl InMemoryWorkflowStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored workflows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create(&self, result: &WorkflowResult) -> ProvisionResult<()> {
        match self.results.entry(result.workflow_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ProvisionError::Store(format!(
                "workflow '{}' already exists",
                result.workflow_id
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(result.clone());
                Ok(())
            }
        }
    }

    async fn put(&self, result: &WorkflowResult) -> ProvisionResult<()> {
        self.results.insert(result.workflow_id.clone(), result.clone());
        Ok(())
    }

    async fn get(&self, workflow_id: &str) -> ProvisionResult<Option<WorkflowResult>> {
        Ok(self.results.get(workflow_id).map(|r| r.value().clone()))
    }

    async fn list(&self) -> ProvisionResult<Vec<String>> {
        let mut ids: Vec<String> = self.results.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

/// Stores one JSON document per workflow at `<dir>/<workflow_id>.json`.
#[derive(Debug, Clone)]
pub struct FileWorkflowStore {
    dir: PathBuf,
}

impl FileWorkflowStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> ProvisionResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, workflow_id: &str) -> ProvisionResult<PathBuf> {
        if workflow_id.is_empty()
            || workflow_id.starts_with('.')
            || workflow_id.contains(['/', '\\'])
        {
            return Err(ProvisionError::Store(format!(
                "workflow id '{workflow_id}' is not a valid file name"
            )));
        }
        Ok(self.dir.join(format!("{workflow_id}.json")))
    }
}

#[async_trait]
impl WorkflowStore for FileWorkflowStore {
    async fn create(&self, result: &WorkflowResult) -> ProvisionResult<()> {
        let path = self.path_for(&result.workflow_id)?;
        let body = serde_json::to_vec_pretty(result)?;

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ProvisionError::Store(format!(
                    "workflow '{}' already exists",
                    result.workflow_id
                )));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&body).await?;
        file.flush().await?;
        Ok(())
    }

    async fn put(&self, result: &WorkflowResult) -> ProvisionResult<()> {
        let path = self.path_for(&result.workflow_id)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(result)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, workflow_id: &str) -> ProvisionResult<Option<WorkflowResult>> {
        let path = self.path_for(workflow_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> ProvisionResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
