//! Dispatcher (§4.8): one worker task per queue, picking ready tasks, assigning agents,
//! running them, and managing retry/dead-letter transitions. This is the module the rest
//! of the crate exists to feed.

use crate::agents::AgentRegistry;
use crate::context::ContextHandle;
use crate::error::OrchestratorError;
use crate::events::{Event, EventBus, EventKind};
use crate::hooks::HookManager;
use crate::ids::TaskId;
use crate::queues::QueueManager;
use crate::tasks::{Task, TaskStatus, TaskStore};
use crate::undo::UndoLog;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Base delay for exponential backoff: `base * 2^(attempt-1)`, capped at `max`.
fn exponential_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(max)
}

/// Per-task cancellation flag. `cancelTask` on a running task flips this; the agent's
/// eventual return value is discarded when it does.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct DispatcherConfig {
    pub poll_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

pub struct Dispatcher {
    queues: QueueManager,
    tasks: TaskStore,
    agents: AgentRegistry,
    hooks: Arc<HookManager>,
    events: EventBus,
    undo: Arc<UndoLog>,
    context: ContextHandle,
    config: DispatcherConfig,
    cancellations: Arc<tokio::sync::Mutex<std::collections::HashMap<TaskId, CancelToken>>>,
    notify: Arc<Notify>,
}

impl Dispatcher {
    pub fn new(
        queues: QueueManager,
        tasks: TaskStore,
        agents: AgentRegistry,
        hooks: Arc<HookManager>,
        events: EventBus,
        undo: Arc<UndoLog>,
        context: ContextHandle,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            queues,
            tasks,
            agents,
            hooks,
            events,
            undo,
            context,
            config,
            cancellations: Arc::new(tokio::sync::Mutex::new(std::collections::HashMap::new())),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Wakes every idle worker loop; called after `enqueue`/`resume` so dispatch isn't
    /// gated on the idle poll tick.
    pub fn notify_work_available(&self) {
        self.notify.notify_waiters();
    }

    /// Spawns one worker loop per queue name currently known to the queue manager. The
    /// returned handles run until the process exits or are aborted by the caller; there is
    /// no explicit shutdown signal because the core has no notion of a "stop the runtime"
    /// operation distinct from dropping the SDK facade.
    pub async fn spawn_workers(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let queue_names = self.queues.list_names().await;
        queue_names
            .into_iter()
            .map(|name| {
                let dispatcher = Arc::clone(self);
                tokio::spawn(async move { dispatcher.run_queue_worker(name).await })
            })
            .collect()
    }

    async fn run_queue_worker(self: Arc<Self>, queue: String) {
        loop {
            match self.queues.try_dequeue(&queue).await {
                Some(task) => self.run_task(task).await,
                None => {
                    let _ = tokio::time::timeout(self.config.poll_interval, self.notify.notified()).await;
                }
            }
        }
    }

    pub async fn cancel_task(&self, id: TaskId) -> crate::error::Result<()> {
        let task = self
            .tasks
            .get(id)
            .await
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))?;

        if task.status.is_terminal() {
            return Err(OrchestratorError::Validation(format!("task {} is already terminal", id)));
        }

        if task.status == TaskStatus::Running {
            if let Some(token) = self.cancellations.lock().await.get(&id) {
                token.cancel();
            }
        }

        self.tasks.cancel(id).await?;
        self.events.emit(Event::new(EventKind::Cancelled, Some(id), serde_json::json!({})));
        Ok(())
    }

    async fn run_task(&self, mut task: Task) {
        let queue = task.queue.clone();
        task.status = TaskStatus::Running;
        task.started_at = Some(crate::ids::now());

        if let Some(agent_id) = self.agents.find_for_task(&task).await.map(|(id, _)| id) {
            task.agent_id = Some(agent_id);
        }
        self.tasks.update(task.clone()).await;
        self.events.emit(Event::new(EventKind::Started, Some(task.id), serde_json::json!({})));

        let outcome = self.execute_once(&task).await;
        self.queues.complete(&queue).await;
        self.cancellations.lock().await.remove(&task.id);

        match outcome {
            Ok(value) => self.finish_success(task, value).await,
            Err(ExecuteError::Cancelled) => {
                // cancel_task already transitioned the task; nothing further to do.
            }
            Err(ExecuteError::Failed(err)) => self.handle_failure(task, err).await,
        }
        self.notify_work_available();
    }

    async fn execute_once(&self, task: &Task) -> Result<crate::agents::AgentOutcome, ExecuteError> {
        let Some((agent_id, agent)) = self.agents.find_for_task(task).await else {
            return Err(ExecuteError::Failed(OrchestratorError::NoAgent {
                task_id: task.id.to_string(),
            }));
        };

        let descriptor = self
            .agents
            .list()
            .await
            .into_iter()
            .find(|d| d.id == agent_id)
            .expect("descriptor for just-resolved agent must exist");

        let ctx = self.context.get().await;
        if !self.hooks.before_execute(task, &descriptor, &ctx).await {
            let _ = self.tasks.cancel(task.id).await;
            self.events
                .emit(Event::new(EventKind::Cancelled, Some(task.id), serde_json::json!({})));
            return Err(ExecuteError::Cancelled);
        }

        let token = CancelToken::default();
        self.cancellations.lock().await.insert(task.id, token.clone());

        let result = agent.resolve(task, &ctx).await;

        if token.is_cancelled() {
            return Err(ExecuteError::Cancelled);
        }

        result.map_err(ExecuteError::Failed)
    }

    async fn finish_success(&self, mut task: Task, outcome: crate::agents::AgentOutcome) {
        task.status = TaskStatus::Completed;
        task.completed_at = Some(crate::ids::now());
        task.result = Some(outcome.value.clone());
        self.tasks.update(task.clone()).await;

        if let Some(undo) = outcome.undo {
            self.undo
                .push(task.id, task.action.clone(), format!("{} ({})", task.action, task.id), undo)
                .await;
        }

        self.hooks.after_execute(&task, &outcome.value).await;
        self.events.emit(Event::new(
            EventKind::Completed,
            Some(task.id),
            serde_json::json!({ "result": outcome.value }),
        ));
        info!("task {} completed", task.id);
    }

    async fn handle_failure(&self, mut task: Task, err: OrchestratorError) {
        self.hooks.on_error(&task, &err, "execute").await;

        let decision = self.hooks.on_retry(&task, &err, task.attempt).await;
        let permanent = err.is_permanent();

        if decision.retry && !permanent {
            let delay = decision
                .delay
                .unwrap_or_else(|| exponential_backoff(task.attempt, self.config.backoff_base, self.config.backoff_max));

            if let Some(retried) = self.tasks.prepare_retry(task.id).await {
                self.events.emit(Event::new(
                    EventKind::Retry,
                    Some(task.id),
                    serde_json::json!({ "attempt": retried.attempt }),
                ));
                tokio::time::sleep(delay).await;
                match self.queues.enqueue(retried).await {
                    Ok(_) => {
                        self.events
                            .emit(Event::new(EventKind::Queued, Some(task.id), serde_json::json!({})));
                    }
                    Err(e) => warn!("failed to re-enqueue task {}: {}", task.id, e),
                }
                self.notify_work_available();
                return;
            }
        }

        let deadletter = permanent || self.should_deadletter(&task.queue).await;

        task.last_error = Some(err.to_string());
        task.completed_at = Some(crate::ids::now());
        task.status = if deadletter {
            TaskStatus::DeadLetter
        } else {
            TaskStatus::Failed
        };
        self.tasks.update(task.clone()).await;

        let kind = if deadletter { EventKind::DeadLetter } else { EventKind::Failed };
        self.events
            .emit(Event::new(kind, Some(task.id), serde_json::json!({ "error": err.to_string() })));
        warn!("task {} terminal: {:?}", task.id, task.status);
    }

    async fn should_deadletter(&self, queue: &str) -> bool {
        matches!(
            self.queues.overflow_policy(queue).await,
            Some(crate::queues::OverflowPolicy::Deadletter)
        )
    }
}

enum ExecuteError {
    Cancelled,
    Failed(OrchestratorError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt_and_caps() {
        let base = Duration::from_millis(200);
        let max = Duration::from_millis(1000);
        assert_eq!(exponential_backoff(1, base, max), Duration::from_millis(200));
        assert_eq!(exponential_backoff(2, base, max), Duration::from_millis(400));
        assert_eq!(exponential_backoff(3, base, max), Duration::from_millis(800));
        assert_eq!(exponential_backoff(10, base, max), max);
    }

    #[test]
    fn cancel_token_starts_uncancelled() {
        let token = CancelToken::default();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
