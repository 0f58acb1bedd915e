//! Persistence Adapter: paired save/load per collection, split by trait the way a
//! `TaskRepository` abstraction would be. The dispatcher and stores never touch a file
//! directly; they go through this trait so embedders can swap in a database without
//! touching core logic.

use crate::actions::Action;
use crate::agents::AgentDescriptor;
use crate::error::{OrchestratorError, Result};
use crate::queues::QueueConfig;
use crate::tasks::Task;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Durable projection of an `UndoEntry` (§6.4/§9): the thunk that performs the undo is a
/// closure captured at execution time and is never serializable, so a restored entry
/// carries only its description and refuses to execute. Callers that `undo_by_id` a
/// restored entry get a `NotFound`-shaped no-op rather than a stale or reconstructed thunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoHistoryRecord {
    pub id: crate::ids::UndoId,
    pub task_id: crate::ids::TaskId,
    pub action: String,
    pub description: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&crate::undo::UndoSummary> for UndoHistoryRecord {
    fn from(summary: &crate::undo::UndoSummary) -> Self {
        Self {
            id: summary.id,
            task_id: summary.task_id,
            action: summary.action.clone(),
            description: summary.description.clone(),
            created_at: summary.created_at,
        }
    }
}

#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn save_actions(&self, actions: &[Action]) -> Result<()>;
    async fn load_actions(&self) -> Result<Vec<Action>>;

    async fn save_agents(&self, agents: &[AgentDescriptor]) -> Result<()>;
    async fn load_agents(&self) -> Result<Vec<AgentDescriptor>>;

    async fn save_queues(&self, queues: &HashMap<String, QueueConfig>) -> Result<()>;
    async fn load_queues(&self) -> Result<HashMap<String, QueueConfig>>;

    async fn save_pending_tasks(&self, tasks: &[Task]) -> Result<()>;
    async fn load_pending_tasks(&self) -> Result<Vec<Task>>;

    async fn save_undo_history(&self, history: &[UndoHistoryRecord]) -> Result<()>;
    async fn load_undo_history(&self) -> Result<Vec<UndoHistoryRecord>>;
}

/// Keeps every collection in memory; survives nothing past process exit. Used by the
/// CLI harness and by tests.
#[derive(Default)]
pub struct InMemoryAdapter {
    actions: RwLock<Vec<Action>>,
    agents: RwLock<Vec<AgentDescriptor>>,
    queues: RwLock<HashMap<String, QueueConfig>>,
    pending_tasks: RwLock<Vec<Task>>,
    undo_history: RwLock<Vec<UndoHistoryRecord>>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryAdapter {
    async fn save_actions(&self, actions: &[Action]) -> Result<()> {
        *self.actions.write().await = actions.to_vec();
        Ok(())
    }

    async fn load_actions(&self) -> Result<Vec<Action>> {
        Ok(self.actions.read().await.clone())
    }

    async fn save_agents(&self, agents: &[AgentDescriptor]) -> Result<()> {
        *self.agents.write().await = agents.to_vec();
        Ok(())
    }

    async fn load_agents(&self) -> Result<Vec<AgentDescriptor>> {
        Ok(self.agents.read().await.clone())
    }

    async fn save_queues(&self, queues: &HashMap<String, QueueConfig>) -> Result<()> {
        *self.queues.write().await = queues.clone();
        Ok(())
    }

    async fn load_queues(&self) -> Result<HashMap<String, QueueConfig>> {
        Ok(self.queues.read().await.clone())
    }

    async fn save_pending_tasks(&self, tasks: &[Task]) -> Result<()> {
        *self.pending_tasks.write().await = tasks.to_vec();
        Ok(())
    }

    async fn load_pending_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.pending_tasks.read().await.clone())
    }

    async fn save_undo_history(&self, history: &[UndoHistoryRecord]) -> Result<()> {
        *self.undo_history.write().await = history.to_vec();
        Ok(())
    }

    async fn load_undo_history(&self) -> Result<Vec<UndoHistoryRecord>> {
        Ok(self.undo_history.read().await.clone())
    }
}

/// One JSON file per collection under `root`. Reference implementation for embedders who
/// want durability without running a database.
pub struct FileAdapter {
    root: PathBuf,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl FileAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn path_for(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.json"))
    }

    async fn write_json<T: serde::Serialize>(&self, collection: &str, value: &T) -> Result<()> {
        let _guard = self.lock.lock().await;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| OrchestratorError::Persistence(e.to_string()))?;
        let data = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(self.path_for(collection), data)
            .await
            .map_err(|e| OrchestratorError::Persistence(e.to_string()))?;
        debug!("wrote {} collection to disk", collection);
        Ok(())
    }

    async fn read_json<T: serde::de::DeserializeOwned + Default>(&self, collection: &str) -> Result<T> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(collection);
        if !path.exists() {
            return Ok(T::default());
        }
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| OrchestratorError::Persistence(e.to_string()))?;
        Ok(serde_json::from_slice(&data)?)
    }
}

#[async_trait]
impl PersistenceAdapter for FileAdapter {
    async fn save_actions(&self, actions: &[Action]) -> Result<()> {
        self.write_json("actions", &actions.to_vec()).await
    }

    async fn load_actions(&self) -> Result<Vec<Action>> {
        self.read_json("actions").await
    }

    async fn save_agents(&self, agents: &[AgentDescriptor]) -> Result<()> {
        self.write_json("agents", &agents.to_vec()).await
    }

    async fn load_agents(&self) -> Result<Vec<AgentDescriptor>> {
        self.read_json("agents").await
    }

    async fn save_queues(&self, queues: &HashMap<String, QueueConfig>) -> Result<()> {
        self.write_json("queues", queues).await
    }

    async fn load_queues(&self) -> Result<HashMap<String, QueueConfig>> {
        self.read_json("queues").await
    }

    async fn save_pending_tasks(&self, tasks: &[Task]) -> Result<()> {
        self.write_json("pending_tasks", &tasks.to_vec()).await
    }

    async fn load_pending_tasks(&self) -> Result<Vec<Task>> {
        self.read_json("pending_tasks").await
    }

    async fn save_undo_history(&self, history: &[UndoHistoryRecord]) -> Result<()> {
        self.write_json("undo_history", &history.to_vec()).await
    }

    async fn load_undo_history(&self) -> Result<Vec<UndoHistoryRecord>> {
        self.read_json("undo_history").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_adapter_round_trips_actions() {
        let adapter = InMemoryAdapter::new();
        let action = Action::new("aa", "d");
        adapter.save_actions(&[action.clone()]).await.unwrap();
        let loaded = adapter.load_actions().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "aa");
    }

    #[tokio::test]
    async fn file_adapter_round_trips_actions() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileAdapter::new(dir.path());
        let action = Action::new("aa", "d");
        adapter.save_actions(&[action.clone()]).await.unwrap();

        let loaded = adapter.load_actions().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "aa");
    }

    #[tokio::test]
    async fn file_adapter_returns_default_when_no_file_exists_yet() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileAdapter::new(dir.path());
        let loaded = adapter.load_actions().await.unwrap();
        assert!(loaded.is_empty());
    }

    fn undo_record() -> UndoHistoryRecord {
        UndoHistoryRecord {
            id: crate::ids::UndoId::new(),
            task_id: crate::ids::TaskId::new(),
            action: "create_note".to_string(),
            description: "create_note (n1)".to_string(),
            created_at: crate::ids::now(),
        }
    }

    #[tokio::test]
    async fn in_memory_adapter_round_trips_undo_history() {
        let adapter = InMemoryAdapter::new();
        let record = undo_record();
        adapter.save_undo_history(&[record.clone()]).await.unwrap();

        let loaded = adapter.load_undo_history().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, record.id);
        assert_eq!(loaded[0].description, record.description);
    }

    #[tokio::test]
    async fn file_adapter_round_trips_undo_history() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileAdapter::new(dir.path());
        let record = undo_record();
        adapter.save_undo_history(&[record.clone()]).await.unwrap();

        let loaded = adapter.load_undo_history().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, record.id);
    }
}
