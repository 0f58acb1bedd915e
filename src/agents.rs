//! Agent Registry (§4.5): named agents subscribed to queues and/or actions, each
//! implementing the `Agent` trait. Open, string-keyed registration (rather than a closed
//! enum of agent kinds) so embedders can add agents without touching this crate.

use crate::context::AppContext;
use crate::error::{OrchestratorError, Result};
use crate::ids::AgentId;
use crate::tasks::Task;
use crate::undo::UndoThunk;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// What an agent produces: the serializable half of the result plus an optional undo
/// thunk (§9: thunks aren't serializable, so they never enter the `Task` record itself).
pub struct AgentOutcome {
    pub value: serde_json::Value,
    pub undo: Option<UndoThunk>,
}

impl AgentOutcome {
    pub fn value(value: serde_json::Value) -> Self {
        Self { value, undo: None }
    }

    pub fn with_undo(value: serde_json::Value, undo: UndoThunk) -> Self {
        Self { value, undo: Some(undo) }
    }
}

/// An agent executes a task and optionally returns a value plus an undo closure.
/// Implemented by embedders; the dispatcher calls `resolve` once per attempt.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn resolve(&self, task: &Task, ctx: &AppContext) -> Result<AgentOutcome>;

    /// Narrower pre-check than queue/action subscription; defaults to accepting
    /// everything routed to this agent.
    fn can_handle(&self, _task: &Task) -> bool {
        true
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: AgentId,
    pub name: String,
    pub queues: Vec<String>,
    pub actions: Vec<String>,
    /// Higher runs first when more than one agent can handle a task.
    pub priority: i32,
    pub enabled: bool,
}

struct Registration {
    descriptor: AgentDescriptor,
    agent: Arc<dyn Agent>,
}

/// Fields a caller may change via `update`; `None` leaves the field untouched. Renaming
/// migrates the name index atomically alongside the descriptor (§4.5).
#[derive(Default)]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub queues: Option<Vec<String>>,
    pub actions: Option<Vec<String>>,
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
}

#[derive(Clone)]
pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<AgentId, Registration>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(
        &self,
        name: impl Into<String>,
        queues: Vec<String>,
        actions: Vec<String>,
        priority: i32,
        agent: Arc<dyn Agent>,
    ) -> Result<AgentId> {
        let name = name.into();
        let mut agents = self.agents.write().await;
        if agents.values().any(|r| r.descriptor.name == name) {
            warn!("duplicate agent name: {}", name);
            return Err(OrchestratorError::DuplicateName(name));
        }

        let id = AgentId::new();
        let descriptor = AgentDescriptor {
            id,
            name,
            queues,
            actions,
            priority,
            enabled: true,
        };
        info!("registered agent {} ({})", descriptor.name, id);
        agents.insert(id, Registration { descriptor, agent });
        Ok(id)
    }

    pub async fn unregister(&self, id: AgentId) -> Result<()> {
        self.agents
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))
    }

    pub async fn set_enabled(&self, id: AgentId, enabled: bool) -> Result<()> {
        let mut agents = self.agents.write().await;
        let registration = agents
            .get_mut(&id)
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))?;
        registration.descriptor.enabled = enabled;
        Ok(())
    }

    pub async fn read(&self, id: AgentId) -> Option<AgentDescriptor> {
        self.agents.read().await.get(&id).map(|r| r.descriptor.clone())
    }

    pub async fn update(&self, id: AgentId, delta: AgentUpdate) -> Result<AgentDescriptor> {
        let mut agents = self.agents.write().await;

        if let Some(name) = delta.name.as_ref() {
            if agents
                .iter()
                .any(|(existing_id, r)| existing_id != &id && &r.descriptor.name == name)
            {
                warn!("duplicate agent name: {}", name);
                return Err(OrchestratorError::DuplicateName(name.clone()));
            }
        }

        let registration = agents
            .get_mut(&id)
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))?;

        if let Some(name) = delta.name {
            registration.descriptor.name = name;
        }
        if let Some(queues) = delta.queues {
            registration.descriptor.queues = queues;
        }
        if let Some(actions) = delta.actions {
            registration.descriptor.actions = actions;
        }
        if let Some(priority) = delta.priority {
            registration.descriptor.priority = priority;
        }
        if let Some(enabled) = delta.enabled {
            registration.descriptor.enabled = enabled;
        }
        debug!("updated agent: {}", id);
        Ok(registration.descriptor.clone())
    }

    pub async fn list(&self) -> Vec<AgentDescriptor> {
        self.agents
            .read()
            .await
            .values()
            .map(|r| r.descriptor.clone())
            .collect()
    }

    /// Picks the highest-priority enabled agent subscribed to `task`'s queue or action
    /// that also passes `can_handle`. Ties break on registration order (HashMap
    /// iteration isn't stable, so callers needing deterministic tie-breaks should give
    /// distinct priorities).
    pub async fn find_for_task(&self, task: &Task) -> Option<(AgentId, Arc<dyn Agent>)> {
        let agents = self.agents.read().await;
        agents
            .values()
            .filter(|r| r.descriptor.enabled)
            .filter(|r| {
                r.descriptor.queues.iter().any(|q| q == &task.queue)
                    || r.descriptor.actions.iter().any(|a| a == &task.action)
            })
            .filter(|r| r.agent.can_handle(task))
            .max_by_key(|r| r.descriptor.priority)
            .map(|r| (r.descriptor.id, r.agent.clone()))
    }

    pub async fn warn_if_unreachable(&self, queue: &str) {
        let agents = self.agents.read().await;
        let reachable = agents
            .values()
            .any(|r| r.descriptor.enabled && r.descriptor.queues.iter().any(|q| q == queue));
        if !reachable {
            warn!("queue {} has no enabled agent subscribed to it", queue);
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::ClassifiedTask;

    struct Echo;

    #[async_trait]
    impl Agent for Echo {
        async fn resolve(&self, task: &Task, _ctx: &AppContext) -> Result<AgentOutcome> {
            Ok(AgentOutcome::value(serde_json::json!({ "echoed": task.content })))
        }
    }

    fn task(queue: &str, action: &str) -> Task {
        Task::from_classified(
            ClassifiedTask {
                action: action.to_string(),
                content: "hi".to_string(),
                params: serde_json::json!({}),
                priority: 1,
                confidence: 1.0,
            },
            queue.to_string(),
            3,
        )
    }

    #[tokio::test]
    async fn finds_agent_by_queue_subscription() {
        let registry = AgentRegistry::new();
        registry
            .register("echo", vec!["notes".to_string()], vec![], 0, Arc::new(Echo))
            .await
            .unwrap();

        let found = registry.find_for_task(&task("notes", "create_note")).await;
        assert!(found.is_some());
        assert!(registry.find_for_task(&task("other", "x")).await.is_none());
    }

    #[tokio::test]
    async fn higher_priority_agent_wins() {
        let registry = AgentRegistry::new();
        registry
            .register("low", vec!["q".to_string()], vec![], 0, Arc::new(Echo))
            .await
            .unwrap();
        let high = registry
            .register("high", vec!["q".to_string()], vec![], 10, Arc::new(Echo))
            .await
            .unwrap();

        let (winner, _) = registry.find_for_task(&task("q", "a")).await.unwrap();
        assert_eq!(winner, high);
    }

    #[tokio::test]
    async fn register_rejects_a_duplicate_name() {
        let registry = AgentRegistry::new();
        registry
            .register("echo", vec!["q".to_string()], vec![], 0, Arc::new(Echo))
            .await
            .unwrap();
        let result = registry.register("echo", vec!["q".to_string()], vec![], 0, Arc::new(Echo)).await;
        assert!(matches!(result, Err(OrchestratorError::DuplicateName(_))));
    }

    #[tokio::test]
    async fn update_renames_and_migrates_the_name_index() {
        let registry = AgentRegistry::new();
        let id = registry
            .register("echo", vec!["q".to_string()], vec![], 0, Arc::new(Echo))
            .await
            .unwrap();

        registry
            .update(
                id,
                AgentUpdate {
                    name: Some("echo2".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(registry.read(id).await.unwrap().name, "echo2");
        registry
            .register("echo", vec!["q".to_string()], vec![], 0, Arc::new(Echo))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_rejects_renaming_onto_an_existing_name() {
        let registry = AgentRegistry::new();
        registry
            .register("echo", vec!["q".to_string()], vec![], 0, Arc::new(Echo))
            .await
            .unwrap();
        let other = registry
            .register("other", vec!["q".to_string()], vec![], 0, Arc::new(Echo))
            .await
            .unwrap();

        let result = registry
            .update(
                other,
                AgentUpdate {
                    name: Some("echo".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(OrchestratorError::DuplicateName(_))));
    }

    #[tokio::test]
    async fn disabled_agent_is_skipped() {
        let registry = AgentRegistry::new();
        let id = registry
            .register("echo", vec!["q".to_string()], vec![], 0, Arc::new(Echo))
            .await
            .unwrap();
        registry.set_enabled(id, false).await.unwrap();

        assert!(registry.find_for_task(&task("q", "a")).await.is_none());
    }
}
