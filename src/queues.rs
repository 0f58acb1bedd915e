//! Queue Manager (§4.2): named queues with independent concurrency, capacity, overflow
//! policy, and pause state. Pending-task insertion is priority-ordered, FIFO within a
//! priority band: a new task is inserted immediately before the first queued task of
//! strictly lower priority, matching `findIndex` semantics.

use crate::error::{OrchestratorError, Result};
use crate::tasks::Task;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    Drop,
    Error,
    Deadletter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub max_size: Option<usize>,
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_size: None,
            overflow: OverflowPolicy::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub name: String,
    pub pending: usize,
    pub running: usize,
    pub paused: bool,
}

struct QueueState {
    config: QueueConfig,
    pending: VecDeque<Task>,
    running: usize,
    paused: bool,
}

impl QueueState {
    fn new(config: QueueConfig) -> Self {
        Self {
            config,
            pending: VecDeque::new(),
            running: 0,
            paused: false,
        }
    }
}

/// What the manager decided to do with an enqueued task, when the queue was at capacity.
pub enum EnqueueOutcome {
    Queued,
    Dropped,
    DeadLettered(Task),
}

#[derive(Clone)]
pub struct QueueManager {
    queues: Arc<Mutex<HashMap<String, QueueState>>>,
}

impl QueueManager {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn create(&self, name: impl Into<String>, config: QueueConfig) -> Result<()> {
        let name = name.into();
        let mut queues = self.queues.lock().await;
        if queues.contains_key(&name) {
            return Err(OrchestratorError::DuplicateName(name));
        }
        queues.insert(name.clone(), QueueState::new(config));
        info!("created queue: {}", name);
        Ok(())
    }

    /// Rejects deletion while tasks are still running in the queue.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let mut queues = self.queues.lock().await;
        let state = queues
            .get(name)
            .ok_or_else(|| OrchestratorError::NotFound(name.to_string()))?;
        if state.running > 0 {
            return Err(OrchestratorError::Validation(format!(
                "queue {} has {} task(s) running",
                name, state.running
            )));
        }
        queues.remove(name);
        Ok(())
    }

    pub async fn pause(&self, name: &str) -> Result<()> {
        self.with_queue_mut(name, |q| q.paused = true).await
    }

    pub async fn resume(&self, name: &str) -> Result<()> {
        self.with_queue_mut(name, |q| q.paused = false).await
    }

    pub async fn clear(&self, name: &str) -> Result<usize> {
        let mut queues = self.queues.lock().await;
        let state = queues
            .get_mut(name)
            .ok_or_else(|| OrchestratorError::NotFound(name.to_string()))?;
        let cleared = state.pending.len();
        state.pending.clear();
        Ok(cleared)
    }

    async fn with_queue_mut(&self, name: &str, f: impl FnOnce(&mut QueueState)) -> Result<()> {
        let mut queues = self.queues.lock().await;
        let state = queues
            .get_mut(name)
            .ok_or_else(|| OrchestratorError::NotFound(name.to_string()))?;
        f(state);
        Ok(())
    }

    /// Inserts `task` into its queue respecting capacity and overflow policy. The queue
    /// must already exist (the router resolves names before enqueuing).
    pub async fn enqueue(&self, task: Task) -> Result<EnqueueOutcome> {
        let mut queues = self.queues.lock().await;
        let state = queues
            .get_mut(&task.queue)
            .ok_or_else(|| OrchestratorError::NotFound(task.queue.clone()))?;

        if let Some(max) = state.config.max_size {
            if state.pending.len() >= max {
                return match state.config.overflow {
                    OverflowPolicy::Drop => {
                        warn!("queue {} full, dropping task {}", task.queue, task.id);
                        Ok(EnqueueOutcome::Dropped)
                    }
                    OverflowPolicy::Error => Err(OrchestratorError::QueueFull {
                        queue: task.queue.clone(),
                    }),
                    OverflowPolicy::Deadletter => {
                        warn!("queue {} full, dead-lettering task {}", task.queue, task.id);
                        Ok(EnqueueOutcome::DeadLettered(task))
                    }
                };
            }
        }

        let insert_at = state
            .pending
            .iter()
            .position(|queued| queued.priority < task.priority)
            .unwrap_or(state.pending.len());
        state.pending.insert(insert_at, task);
        Ok(EnqueueOutcome::Queued)
    }

    /// Pops the next runnable task if the queue isn't paused and has a free concurrency
    /// slot. Marks the slot occupied; callers must call `complete` when the task settles.
    pub async fn try_dequeue(&self, name: &str) -> Option<Task> {
        let mut queues = self.queues.lock().await;
        let state = queues.get_mut(name)?;
        if state.paused || state.running >= state.config.concurrency {
            return None;
        }
        let task = state.pending.pop_front()?;
        state.running += 1;
        Some(task)
    }

    pub async fn complete(&self, name: &str) {
        let mut queues = self.queues.lock().await;
        if let Some(state) = queues.get_mut(name) {
            state.running = state.running.saturating_sub(1);
        }
    }

    pub async fn stats(&self, name: &str) -> Option<QueueStats> {
        let queues = self.queues.lock().await;
        queues.get(name).map(|state| QueueStats {
            name: name.to_string(),
            pending: state.pending.len(),
            running: state.running,
            paused: state.paused,
        })
    }

    pub async fn list_names(&self) -> Vec<String> {
        self.queues.lock().await.keys().cloned().collect()
    }

    /// The queue's configured overflow policy, read by the dispatcher to decide whether
    /// retry exhaustion should dead-letter a task instead of failing it (§4.8).
    pub async fn overflow_policy(&self, name: &str) -> Option<OverflowPolicy> {
        self.queues.lock().await.get(name).map(|state| state.config.overflow)
    }
}

impl Default for QueueManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::ClassifiedTask;

    fn task(priority: u8) -> Task {
        Task::from_classified(
            ClassifiedTask {
                action: "a".to_string(),
                content: "c".to_string(),
                params: serde_json::json!({}),
                priority,
                confidence: 1.0,
            },
            "q".to_string(),
            3,
        )
    }

    #[tokio::test]
    async fn priority_inserts_before_first_lower_priority_task_fifo_within_band() {
        let manager = QueueManager::new();
        manager.create("q", QueueConfig::default()).await.unwrap();

        manager.enqueue(task(1)).await.unwrap();
        manager.enqueue(task(1)).await.unwrap();
        let high = task(3);
        let high_id = high.id;
        manager.enqueue(high).await.unwrap();

        // concurrency 1, so draining in order reveals priority ordering.
        let first = manager.try_dequeue("q").await.unwrap();
        assert_eq!(first.id, high_id);
    }

    #[tokio::test]
    async fn concurrency_cap_blocks_further_dequeue() {
        let manager = QueueManager::new();
        manager
            .create(
                "q",
                QueueConfig {
                    concurrency: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        manager.enqueue(task(1)).await.unwrap();
        manager.enqueue(task(1)).await.unwrap();

        assert!(manager.try_dequeue("q").await.is_some());
        assert!(manager.try_dequeue("q").await.is_none());
        manager.complete("q").await;
        assert!(manager.try_dequeue("q").await.is_some());
    }

    #[tokio::test]
    async fn overflow_drop_discards_silently() {
        let manager = QueueManager::new();
        manager
            .create(
                "q",
                QueueConfig {
                    concurrency: 1,
                    max_size: Some(1),
                    overflow: OverflowPolicy::Drop,
                },
            )
            .await
            .unwrap();
        manager.enqueue(task(1)).await.unwrap();
        let outcome = manager.enqueue(task(1)).await.unwrap();
        assert!(matches!(outcome, EnqueueOutcome::Dropped));
    }

    #[tokio::test]
    async fn overflow_error_rejects() {
        let manager = QueueManager::new();
        manager
            .create(
                "q",
                QueueConfig {
                    concurrency: 1,
                    max_size: Some(1),
                    overflow: OverflowPolicy::Error,
                },
            )
            .await
            .unwrap();
        manager.enqueue(task(1)).await.unwrap();
        let result = manager.enqueue(task(1)).await;
        assert!(matches!(result, Err(OrchestratorError::QueueFull { .. })));
    }

    #[tokio::test]
    async fn overflow_deadletter_returns_the_task() {
        let manager = QueueManager::new();
        manager
            .create(
                "q",
                QueueConfig {
                    concurrency: 1,
                    max_size: Some(1),
                    overflow: OverflowPolicy::Deadletter,
                },
            )
            .await
            .unwrap();
        manager.enqueue(task(1)).await.unwrap();
        let outcome = manager.enqueue(task(1)).await.unwrap();
        assert!(matches!(outcome, EnqueueOutcome::DeadLettered(_)));
    }

    #[tokio::test]
    async fn paused_queue_yields_nothing() {
        let manager = QueueManager::new();
        manager.create("q", QueueConfig::default()).await.unwrap();
        manager.enqueue(task(1)).await.unwrap();
        manager.pause("q").await.unwrap();
        assert!(manager.try_dequeue("q").await.is_none());
    }

    #[tokio::test]
    async fn overflow_policy_reports_the_configured_policy() {
        let manager = QueueManager::new();
        manager
            .create(
                "q",
                QueueConfig {
                    concurrency: 1,
                    max_size: Some(1),
                    overflow: OverflowPolicy::Deadletter,
                },
            )
            .await
            .unwrap();
        assert_eq!(manager.overflow_policy("q").await, Some(OverflowPolicy::Deadletter));
        assert_eq!(manager.overflow_policy("missing").await, None);
    }

    #[tokio::test]
    async fn delete_rejects_while_running() {
        let manager = QueueManager::new();
        manager.create("q", QueueConfig::default()).await.unwrap();
        manager.enqueue(task(1)).await.unwrap();
        manager.try_dequeue("q").await.unwrap();
        assert!(manager.delete("q").await.is_err());
    }
}
