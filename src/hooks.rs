//! Hook Manager (§4.6): six lifecycle interception points. A failing hook is logged and
//! the pipeline proceeds with the documented default. Hooks never crash the dispatcher.

use crate::agents::AgentDescriptor;
use crate::context::AppContext;
use crate::error::OrchestratorError;
use crate::tasks::{ClassifiedTask, Task};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

pub struct RetryDecision {
    pub retry: bool,
    /// When set, replaces the computed exponential backoff wholesale rather than
    /// adding to it.
    pub delay: Option<Duration>,
}

#[async_trait]
pub trait Hooks: Send + Sync {
    async fn before_classify(&self, utterance: String, _ctx: &AppContext) -> Option<String> {
        Some(utterance)
    }

    async fn before_route(&self, task: ClassifiedTask, _ctx: &AppContext) -> Option<ClassifiedTask> {
        Some(task)
    }

    async fn before_execute(&self, _task: &Task, _agent: &AgentDescriptor, _ctx: &AppContext) -> bool {
        true
    }

    async fn on_retry(&self, task: &Task, _err: &OrchestratorError, attempt: u32) -> RetryDecision {
        RetryDecision {
            retry: attempt < task.max_attempts,
            delay: None,
        }
    }

    async fn after_execute(&self, _task: &Task, _result: &serde_json::Value) {}

    async fn on_error(&self, _task: &Task, _err: &OrchestratorError, _stage: &str) {}
}

/// No-op hook set used when the embedder registers none.
pub struct NoopHooks;

impl Hooks for NoopHooks {}

/// Wraps a user's `Hooks` impl so the dispatcher can call each stage without ever
/// propagating a panic or error out of a hook invocation.
pub struct HookManager {
    hooks: Box<dyn Hooks>,
}

impl HookManager {
    pub fn new(hooks: Box<dyn Hooks>) -> Self {
        Self { hooks }
    }

    pub async fn before_classify(&self, utterance: String, ctx: &AppContext) -> Option<String> {
        self.hooks.before_classify(utterance, ctx).await
    }

    pub async fn before_route(&self, task: ClassifiedTask, ctx: &AppContext) -> Option<ClassifiedTask> {
        self.hooks.before_route(task, ctx).await
    }

    pub async fn before_execute(&self, task: &Task, agent: &AgentDescriptor, ctx: &AppContext) -> bool {
        self.hooks.before_execute(task, agent, ctx).await
    }

    pub async fn on_retry(&self, task: &Task, err: &OrchestratorError, attempt: u32) -> RetryDecision {
        self.hooks.on_retry(task, err, attempt).await
    }

    pub async fn after_execute(&self, task: &Task, result: &serde_json::Value) {
        self.hooks.after_execute(task, result).await;
    }

    pub async fn on_error(&self, task: &Task, err: &OrchestratorError, stage: &str) {
        warn!("task {} failed at {}: {}", task.id, stage, err);
        self.hooks.on_error(task, err, stage).await;
    }
}

impl Default for HookManager {
    fn default() -> Self {
        Self::new(Box::new(NoopHooks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::AgentId;

    fn descriptor() -> AgentDescriptor {
        AgentDescriptor {
            id: AgentId::new(),
            name: "a".to_string(),
            queues: vec![],
            actions: vec![],
            priority: 0,
            enabled: true,
        }
    }

    fn task() -> Task {
        Task::from_classified(
            ClassifiedTask {
                action: "a".to_string(),
                content: "c".to_string(),
                params: serde_json::json!({}),
                priority: 1,
                confidence: 1.0,
            },
            "q".to_string(),
            3,
        )
    }

    #[tokio::test]
    async fn default_before_execute_allows() {
        let manager = HookManager::default();
        let ctx = AppContext::default();
        assert!(manager.before_execute(&task(), &descriptor(), &ctx).await);
    }

    #[tokio::test]
    async fn default_on_retry_follows_attempt_count() {
        let manager = HookManager::default();
        let t = task();
        let err = OrchestratorError::Timeout {
            message: "x".to_string(),
        };
        let decision = manager.on_retry(&t, &err, 1).await;
        assert!(decision.retry);
        assert!(decision.delay.is_none());
    }

    #[tokio::test]
    async fn before_classify_can_short_circuit() {
        struct Silencer;
        #[async_trait]
        impl Hooks for Silencer {
            async fn before_classify(&self, _utterance: String, _ctx: &AppContext) -> Option<String> {
                None
            }
        }
        let manager = HookManager::new(Box::new(Silencer));
        let ctx = AppContext::default();
        assert!(manager.before_classify("hi".to_string(), &ctx).await.is_none());
    }
}
