//! Task Store (§4.4) and the dispatchable `Task`/`ClassifiedTask` records (§3).

use crate::error::{OrchestratorError, Result};
use crate::ids::{now, AgentId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Output of the classifier (§3). `action == "unknown"` signals no-op; the SDK facade
/// must not route unknowns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedTask {
    pub action: String,
    pub content: String,
    pub params: serde_json::Value,
    pub priority: u8,
    pub confidence: f32,
}

impl ClassifiedTask {
    pub fn is_unknown(&self) -> bool {
        self.action == "unknown"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    DeadLetter,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::DeadLetter
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub action: String,
    pub content: String,
    pub params: serde_json::Value,
    pub priority: u8,
    pub queue: String,
    pub status: TaskStatus,
    pub attempt: u32,
    pub max_attempts: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
    /// The serializable half of an agent's result; a captured undo thunk (if any)
    /// lives in the `UndoLog`, not here: thunks are not serializable.
    pub result: Option<serde_json::Value>,
    pub agent_id: Option<AgentId>,
}

impl Task {
    pub fn from_classified(classified: ClassifiedTask, queue: String, max_attempts: u32) -> Self {
        Self {
            id: TaskId::new(),
            action: classified.action,
            content: classified.content,
            params: classified.params,
            priority: classified.priority,
            queue,
            status: TaskStatus::Pending,
            attempt: 1,
            max_attempts,
            created_at: now(),
            started_at: None,
            completed_at: None,
            last_error: None,
            result: None,
            agent_id: None,
        }
    }
}

#[derive(Clone)]
pub struct TaskStore {
    tasks: Arc<Mutex<HashMap<TaskId, Task>>>,
    by_queue: Arc<Mutex<HashMap<String, Vec<TaskId>>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            by_queue: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn insert(&self, task: Task) -> Task {
        let id = task.id;
        let queue = task.queue.clone();

        self.tasks.lock().await.insert(id, task.clone());
        self.by_queue.lock().await.entry(queue).or_default().push(id);

        debug!("inserted task {} into queue index", id);
        task
    }

    pub async fn get(&self, id: TaskId) -> Option<Task> {
        self.tasks.lock().await.get(&id).cloned()
    }

    pub async fn update(&self, task: Task) {
        self.tasks.lock().await.insert(task.id, task);
    }

    /// `list(None)` returns every task; `list(Some(queue))` uses the secondary index.
    pub async fn list(&self, queue: Option<&str>) -> Vec<Task> {
        match queue {
            None => self.tasks.lock().await.values().cloned().collect(),
            Some(queue) => {
                let by_queue = self.by_queue.lock().await;
                let tasks = self.tasks.lock().await;
                by_queue
                    .get(queue)
                    .into_iter()
                    .flatten()
                    .filter_map(|id| tasks.get(id).cloned())
                    .collect()
            }
        }
    }

    /// Returns a task with `status = pending`, `attempt += 1`, if `attempt < max_attempts`;
    /// otherwise returns `None` and leaves the stored task untouched (§4.4).
    pub async fn prepare_retry(&self, id: TaskId) -> Option<Task> {
        let mut tasks = self.tasks.lock().await;
        let task = tasks.get_mut(&id)?;

        if task.attempt >= task.max_attempts {
            return None;
        }

        task.attempt += 1;
        task.status = TaskStatus::Pending;
        task.started_at = None;
        Some(task.clone())
    }

    /// Transitions `pending | running → cancelled`; terminal states reject the
    /// transition (§4.4).
    pub async fn cancel(&self, id: TaskId) -> Result<Task> {
        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))?;

        if task.status.is_terminal() {
            return Err(OrchestratorError::Validation(format!(
                "task {} is already terminal ({:?})",
                id, task.status
            )));
        }

        task.status = TaskStatus::Cancelled;
        task.completed_at = Some(now());
        Ok(task.clone())
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}
