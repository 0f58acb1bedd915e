//! SDK Facade (§4.10): wires every component, owns the singleton `AppContext`, and
//! exposes the full operation surface embedders use.

use crate::actions::{Action, ActionStore, ActionUpdate};
use crate::agents::{Agent, AgentDescriptor, AgentRegistry, AgentUpdate};
use crate::classifier::Classifier;
use crate::config::SdkConfig;
use crate::context::{AppContext, ContextHandle};
use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::error::{OrchestratorError, Result};
use crate::events::{Event, EventBus, Subscription};
use crate::hooks::{Hooks, HookManager, NoopHooks};
use crate::ids::{AgentId, RuleId, TaskId};
use crate::queues::{EnqueueOutcome, QueueConfig, QueueManager, QueueStats};
use crate::router::{Router, RuleInput};
use crate::tasks::{ClassifiedTask, Task, TaskStore};
use crate::undo::{UndoLog, UndoSummary};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod actions {
    pub use crate::actions::{Action, ActionUpdate, ParameterSpec, ParameterType};
}
pub mod queues {
    pub use crate::queues::{OverflowPolicy, QueueConfig};
}
pub mod agents {
    pub use crate::agents::{Agent, AgentDescriptor, AgentUpdate};
}
pub mod router {
    pub use crate::router::RuleInput;
}

pub struct Sdk {
    actions: ActionStore,
    agents: AgentRegistry,
    queues: QueueManager,
    router: Router,
    tasks: TaskStore,
    undo: Arc<UndoLog>,
    context: ContextHandle,
    events: EventBus,
    classifier: Arc<dyn Classifier>,
    dispatcher: Arc<Dispatcher>,
    hooks: Arc<HookManager>,
    listening: Arc<AtomicBool>,
    config: SdkConfig,
}

impl Sdk {
    pub fn new(config: SdkConfig, classifier: Arc<dyn Classifier>, hooks: Box<dyn Hooks>) -> Self {
        let action_store = ActionStore::new();
        let agent_registry = AgentRegistry::new();
        let queue_manager = QueueManager::new();
        let router = Router::new();
        let task_store = TaskStore::new();
        let undo_log = Arc::new(UndoLog::new(config.undo_capacity));
        let context = ContextHandle::default();
        let events = EventBus::new();
        let hook_manager = Arc::new(HookManager::new(hooks));

        if let Some(default_queue) = &config.default_queue {
            router.set_default_queue_now(default_queue.clone());
        }

        let dispatcher = Arc::new(Dispatcher::new(
            queue_manager.clone(),
            task_store.clone(),
            agent_registry.clone(),
            hook_manager.clone(),
            events.clone(),
            undo_log.clone(),
            context.clone(),
            DispatcherConfig {
                poll_interval: Duration::from_millis(config.poll_interval_ms),
                backoff_base: Duration::from_millis(crate::constants::DEFAULT_BACKOFF_BASE_MS),
                backoff_max: Duration::from_millis(crate::constants::DEFAULT_BACKOFF_MAX_MS),
            },
        ));

        Self {
            actions: action_store,
            agents: agent_registry,
            queues: queue_manager,
            router,
            tasks: task_store,
            undo: undo_log,
            context,
            events,
            classifier,
            dispatcher,
            hooks: hook_manager,
            listening: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Convenience constructor for embedders without custom hooks.
    pub fn with_classifier(config: SdkConfig, classifier: Arc<dyn Classifier>) -> Self {
        Self::new(config, classifier, Box::new(NoopHooks))
    }

    // -- actions.* --------------------------------------------------------------

    pub async fn create_action(&self, action: Action) -> Result<Action> {
        self.actions.create(action).await
    }

    pub async fn read_action(&self, name: &str) -> Option<Action> {
        self.actions.read(name).await
    }

    pub async fn update_action(&self, name: &str, delta: ActionUpdate) -> Result<Action> {
        self.actions.update(name, delta).await
    }

    pub async fn delete_action(&self, name: &str) -> Result<()> {
        self.actions.delete(name).await
    }

    pub async fn list_actions(&self, enabled_only: bool) -> Vec<Action> {
        self.actions.list(enabled_only).await
    }

    pub async fn enable_action(&self, name: &str) -> Result<()> {
        self.actions.enable(name).await
    }

    pub async fn disable_action(&self, name: &str) -> Result<()> {
        self.actions.disable(name).await
    }

    // -- queues.* -----------------------------------------------------------------

    pub async fn create_queue(&self, name: impl Into<String>, cfg: QueueConfig) -> Result<()> {
        self.queues.create(name, cfg).await
    }

    pub async fn delete_queue(&self, name: &str) -> Result<()> {
        self.queues.delete(name).await
    }

    pub async fn list_queues(&self) -> Vec<String> {
        self.queues.list_names().await
    }

    pub async fn pause_queue(&self, name: &str) -> Result<()> {
        self.queues.pause(name).await
    }

    pub async fn resume_queue(&self, name: &str) -> Result<()> {
        let result = self.queues.resume(name).await;
        self.dispatcher.notify_work_available();
        result
    }

    pub async fn clear_queue(&self, name: &str) -> Result<usize> {
        self.queues.clear(name).await
    }

    pub async fn queue_stats(&self, name: &str) -> Option<QueueStats> {
        self.queues.stats(name).await
    }

    // -- router.* -------------------------------------------------------------------

    pub async fn add_rule(&self, input: RuleInput) -> RuleId {
        self.router.add_rule(input).await
    }

    pub async fn remove_rule(&self, id: RuleId) -> Result<()> {
        self.router.remove_rule(id).await
    }

    pub async fn list_rules(&self) -> Vec<crate::router::RoutingRule> {
        self.router.list_rules().await
    }

    // -- agents.* -------------------------------------------------------------------

    pub async fn register_agent(
        &self,
        name: impl Into<String>,
        queues: Vec<String>,
        actions: Vec<String>,
        priority: i32,
        agent: Arc<dyn Agent>,
    ) -> Result<AgentId> {
        let id = self.agents.register(name, queues, actions, priority, agent).await?;
        self.dispatcher.notify_work_available();
        Ok(id)
    }

    pub async fn unregister_agent(&self, id: AgentId) -> Result<()> {
        self.agents.unregister(id).await
    }

    pub async fn read_agent(&self, id: AgentId) -> Option<AgentDescriptor> {
        self.agents.read(id).await
    }

    pub async fn update_agent(&self, id: AgentId, delta: AgentUpdate) -> Result<AgentDescriptor> {
        self.agents.update(id, delta).await
    }

    pub async fn list_agents(&self) -> Vec<AgentDescriptor> {
        self.agents.list().await
    }

    pub async fn enable_agent(&self, id: AgentId) -> Result<()> {
        self.agents.set_enabled(id, true).await
    }

    pub async fn disable_agent(&self, id: AgentId) -> Result<()> {
        self.agents.set_enabled(id, false).await
    }

    // -- tasks.* --------------------------------------------------------------------

    pub async fn list_tasks(&self, queue: Option<&str>) -> Vec<Task> {
        self.tasks.list(queue).await
    }

    pub async fn get_task(&self, id: TaskId) -> Option<Task> {
        self.tasks.get(id).await
    }

    pub async fn cancel_task(&self, id: TaskId) -> Result<()> {
        self.dispatcher.cancel_task(id).await
    }

    pub async fn retry_task(&self, id: TaskId) -> Result<()> {
        let task = self
            .tasks
            .prepare_retry(id)
            .await
            .ok_or_else(|| OrchestratorError::Validation(format!("task {} has no retries remaining", id)))?;
        self.queues.enqueue(task).await?;
        self.dispatcher.notify_work_available();
        Ok(())
    }

    // -- context --------------------------------------------------------------------

    pub async fn get_context(&self) -> AppContext {
        self.context.get().await
    }

    pub async fn set_context(&self, ctx: AppContext) {
        self.context.set(ctx).await;
    }

    pub async fn update_context<F>(&self, f: F)
    where
        F: FnOnce(AppContext) -> AppContext,
    {
        self.context.update(f).await;
    }

    // -- undo.* ---------------------------------------------------------------------

    pub async fn can_undo(&self) -> bool {
        self.undo.can_undo().await
    }

    pub async fn undo(&self) -> bool {
        let undone = self.undo.undo().await;
        if undone {
            self.events
                .emit(Event::new(crate::events::EventKind::Undo, None, serde_json::json!({})));
        }
        undone
    }

    pub async fn undo_by_id(&self, id: crate::ids::UndoId) -> bool {
        self.undo.undo_by_id(id).await
    }

    pub async fn undo_history(&self, limit: Option<usize>) -> Vec<UndoSummary> {
        self.undo.get_history(limit).await
    }

    // -- events -----------------------------------------------------------------------

    pub fn on(&self) -> Subscription {
        self.events.subscribe()
    }

    // -- listening lifecycle ------------------------------------------------------------

    pub async fn start_listening(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        self.listening.store(true, Ordering::SeqCst);
        info!("orchestrator listening");
        self.dispatcher.spawn_workers().await
    }

    pub fn stop_listening(&self) {
        self.listening.store(false, Ordering::SeqCst);
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Entry path for both voice input and callers bypassing voice (§4.10): applies
    /// `beforeClassify`, classifies, emits `classified`, routes, and enqueues.
    pub async fn submit(&self, utterance: impl Into<String>) -> Result<Option<TaskId>> {
        let utterance = crate::validation::sanitize_content(
            &utterance.into(),
            crate::constants::DEFAULT_MAX_CONTENT_LENGTH,
        );
        let ctx = self.context.get().await;

        let utterance = match self.hooks.before_classify(utterance, &ctx).await {
            Some(u) => u,
            None => return Ok(None),
        };

        let enabled_actions = self.actions.list(true).await;
        let classified = match self.classify(&utterance, &enabled_actions, &ctx).await {
            Ok(Some(task)) => task,
            Ok(None) => return Ok(None),
            Err(e) => {
                if matches!(self.config.errors.on_classify_error, crate::config::OnClassifyError::Throw) {
                    return Err(e);
                }
                return Ok(None);
            }
        };

        self.events.emit(Event::new(
            crate::events::EventKind::Classified,
            None,
            serde_json::json!({ "action": classified.action }),
        ));

        let classified = match self.hooks.before_route(classified, &ctx).await {
            Some(task) => task,
            None => return Ok(None),
        };

        let queue = self.router.route(&classified).await?;
        let task = Task::from_classified(classified, queue, crate::constants::DEFAULT_MAX_ATTEMPTS);
        let id = task.id;
        let stored = task.clone();

        match self.queues.enqueue(task).await? {
            EnqueueOutcome::Queued => {
                self.tasks.insert(stored).await;
                self.events
                    .emit(Event::new(crate::events::EventKind::Queued, Some(id), serde_json::json!({})));
                self.dispatcher.notify_work_available();
                Ok(Some(id))
            }
            // A dropped task never enters any store (§4.2 scenario 2).
            EnqueueOutcome::Dropped => Ok(None),
            EnqueueOutcome::DeadLettered(mut task) => {
                task.status = crate::tasks::TaskStatus::DeadLetter;
                task.completed_at = Some(crate::ids::now());
                self.tasks.insert(task).await;
                self.events.emit(Event::new(
                    crate::events::EventKind::DeadLetter,
                    Some(id),
                    serde_json::json!({ "reason": "queue full" }),
                ));
                Ok(Some(id))
            }
        }
    }

    async fn classify(
        &self,
        utterance: &str,
        enabled_actions: &[Action],
        ctx: &AppContext,
    ) -> Result<Option<ClassifiedTask>> {
        self.classifier.classify(utterance, enabled_actions, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::CustomClassifier;

    fn echo_classifier() -> Arc<dyn Classifier> {
        Arc::new(CustomClassifier::new(Arc::new(|utterance, _actions, _ctx| {
            Box::pin(async move {
                Ok(Some(ClassifiedTask {
                    action: "echo".to_string(),
                    content: utterance,
                    params: serde_json::json!({}),
                    priority: 1,
                    confidence: 1.0,
                }))
            })
        })))
    }

    #[tokio::test]
    async fn submit_routes_and_enqueues_via_default_queue() {
        let sdk = Sdk::with_classifier(SdkConfig::with_custom_classifier(), echo_classifier());
        sdk.create_queue("default", QueueConfig::default()).await.unwrap();
        sdk.add_rule(RuleInput {
            priority: 0,
            action: None,
            pattern: None,
            condition: None,
            target_queue: "default".to_string(),
        })
        .await;

        let id = sdk.submit("hello").await.unwrap();
        assert!(id.is_some());
        let tasks = sdk.list_tasks(Some("default")).await;
        assert_eq!(tasks.len(), 1);
    }

    #[tokio::test]
    async fn submit_with_no_matching_route_errors() {
        let sdk = Sdk::with_classifier(SdkConfig::with_custom_classifier(), echo_classifier());
        assert!(sdk.submit("hello").await.is_err());
    }

    struct NoopAgent;

    #[async_trait::async_trait]
    impl Agent for NoopAgent {
        async fn resolve(&self, _task: &Task, _ctx: &AppContext) -> Result<crate::agents::AgentOutcome> {
            Ok(crate::agents::AgentOutcome::value(serde_json::json!({})))
        }
    }

    #[tokio::test]
    async fn register_agent_rejects_a_duplicate_name() {
        let sdk = Sdk::with_classifier(SdkConfig::with_custom_classifier(), echo_classifier());
        sdk.register_agent("echo", vec![], vec![], 0, Arc::new(NoopAgent)).await.unwrap();
        let result = sdk.register_agent("echo", vec![], vec![], 0, Arc::new(NoopAgent)).await;
        assert!(matches!(result, Err(OrchestratorError::DuplicateName(_))));
    }

    #[tokio::test]
    async fn read_and_update_agent_round_trip() {
        let sdk = Sdk::with_classifier(SdkConfig::with_custom_classifier(), echo_classifier());
        let id = sdk
            .register_agent("echo", vec!["q".to_string()], vec![], 0, Arc::new(NoopAgent))
            .await
            .unwrap();

        assert_eq!(sdk.read_agent(id).await.unwrap().priority, 0);

        sdk.update_agent(
            id,
            crate::agents::AgentUpdate {
                priority: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(sdk.read_agent(id).await.unwrap().priority, 5);
    }
}
