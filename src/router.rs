//! Router (§4.3): priority-ordered rules that map a classified task to a queue name.

use crate::error::{OrchestratorError, Result};
use crate::ids::RuleId;
use crate::tasks::ClassifiedTask;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A rule's `condition` criterion (§3: `match: {action?, pattern?, condition?}`). Not
/// serializable, like `UndoThunk`; skipped on (de)serialization and absent on reload.
pub type RouteCondition = Arc<dyn Fn(&ClassifiedTask) -> bool + Send + Sync>;

#[derive(Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    pub id: RuleId,
    /// Higher priority rules are tried first; ties keep insertion order.
    pub priority: i32,
    pub action: Option<String>,
    #[serde(with = "pattern_serde")]
    pub pattern: Option<Regex>,
    #[serde(skip)]
    pub condition: Option<RouteCondition>,
    pub target_queue: String,
}

/// `Regex` isn't `Serialize`/`Deserialize`; persist the pattern source instead.
mod pattern_serde {
    use regex::Regex;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Regex>, s: S) -> Result<S::Ok, S::Error> {
        value.as_ref().map(|r| r.as_str()).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Regex>, D::Error> {
        let source: Option<String> = Option::deserialize(d)?;
        source
            .map(|s| Regex::new(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

pub struct RuleInput {
    pub priority: i32,
    pub action: Option<String>,
    pub pattern: Option<Regex>,
    pub condition: Option<RouteCondition>,
    pub target_queue: String,
}

#[derive(Clone)]
pub struct Router {
    rules: Arc<RwLock<Vec<RoutingRule>>>,
    default_queue: Arc<std::sync::RwLock<Option<String>>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(RwLock::new(Vec::new())),
            default_queue: Arc::new(std::sync::RwLock::new(None)),
        }
    }

    /// Synchronous so it can be called from the SDK facade's non-async constructor.
    pub fn set_default_queue_now(&self, queue: impl Into<String>) {
        *self.default_queue.write().unwrap() = Some(queue.into());
    }

    pub async fn add_rule(&self, input: RuleInput) -> RuleId {
        let id = RuleId::new();
        let rule = RoutingRule {
            id,
            priority: input.priority,
            action: input.action,
            pattern: input.pattern,
            condition: input.condition,
            target_queue: input.target_queue,
        };
        let mut rules = self.rules.write().await;
        let insert_at = rules
            .iter()
            .position(|r| r.priority < rule.priority)
            .unwrap_or(rules.len());
        rules.insert(insert_at, rule);
        id
    }

    pub async fn remove_rule(&self, id: RuleId) -> Result<()> {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|r| r.id != id);
        if rules.len() == before {
            return Err(OrchestratorError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn update_rule(&self, id: RuleId, input: RuleInput) -> Result<()> {
        self.remove_rule(id).await?;
        let rule = RoutingRule {
            id,
            priority: input.priority,
            action: input.action,
            pattern: input.pattern,
            condition: input.condition,
            target_queue: input.target_queue,
        };
        let mut rules = self.rules.write().await;
        let insert_at = rules
            .iter()
            .position(|r| r.priority < rule.priority)
            .unwrap_or(rules.len());
        rules.insert(insert_at, rule);
        Ok(())
    }

    pub async fn list_rules(&self) -> Vec<RoutingRule> {
        self.rules.read().await.clone()
    }

    pub async fn set_default_queue(&self, queue: impl Into<String>) {
        self.set_default_queue_now(queue);
    }

    /// First matching rule wins. A rule with no criteria set matches every task; otherwise
    /// it matches if ANY set criterion matches: `action` equal, `pattern` matching the
    /// task's `action`, or `condition` returning true. Falls back to the default queue,
    /// then fails if none is set.
    pub async fn route(&self, task: &ClassifiedTask) -> Result<String> {
        let rules = self.rules.read().await;
        for rule in rules.iter() {
            if Self::rule_matches(rule, task) {
                debug!("routed action {} to queue {}", task.action, rule.target_queue);
                return Ok(rule.target_queue.clone());
            }
        }

        self.default_queue
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| OrchestratorError::NotFound(format!("no route for action {}", task.action)))
    }

    fn rule_matches(rule: &RoutingRule, task: &ClassifiedTask) -> bool {
        let mut has_criterion = false;
        let mut matched = false;

        if let Some(action) = rule.action.as_ref() {
            has_criterion = true;
            matched = matched || action == &task.action;
        }
        if let Some(pattern) = rule.pattern.as_ref() {
            has_criterion = true;
            matched = matched || pattern.is_match(&task.action);
        }
        if let Some(condition) = rule.condition.as_ref() {
            has_criterion = true;
            matched = matched || condition(task);
        }

        !has_criterion || matched
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(action: &str, content: &str) -> ClassifiedTask {
        ClassifiedTask {
            action: action.to_string(),
            content: content.to_string(),
            params: serde_json::json!({}),
            priority: 1,
            confidence: 1.0,
        }
    }

    #[tokio::test]
    async fn rules_are_tried_in_priority_order() {
        let router = Router::new();
        router
            .add_rule(RuleInput {
                priority: 0,
                action: Some("note".to_string()),
                pattern: None,
                condition: None,
                target_queue: "low".to_string(),
            })
            .await;
        router
            .add_rule(RuleInput {
                priority: 10,
                action: Some("note".to_string()),
                pattern: None,
                condition: None,
                target_queue: "high".to_string(),
            })
            .await;

        let queue = router.route(&classified("note", "x")).await.unwrap();
        assert_eq!(queue, "high");
    }

    #[tokio::test]
    async fn pattern_matches_against_action_not_content() {
        let router = Router::new();
        router
            .add_rule(RuleInput {
                priority: 0,
                action: None,
                pattern: Some(Regex::new("^send_").unwrap()),
                condition: None,
                target_queue: "mail".to_string(),
            })
            .await;

        let queue = router.route(&classified("send_email", "hello")).await.unwrap();
        assert_eq!(queue, "mail");
        assert!(router.route(&classified("other", "send_ something")).await.is_err());
    }

    #[tokio::test]
    async fn any_set_criterion_matching_is_enough() {
        let router = Router::new();
        router
            .add_rule(RuleInput {
                priority: 0,
                action: Some("note".to_string()),
                pattern: Some(Regex::new("^never_matches$").unwrap()),
                condition: None,
                target_queue: "notes".to_string(),
            })
            .await;

        let queue = router.route(&classified("note", "x")).await.unwrap();
        assert_eq!(queue, "notes");
    }

    #[tokio::test]
    async fn condition_criterion_can_match_on_its_own() {
        let router = Router::new();
        router
            .add_rule(RuleInput {
                priority: 0,
                action: None,
                pattern: None,
                condition: Some(Arc::new(|task: &ClassifiedTask| task.priority >= 3)),
                target_queue: "urgent".to_string(),
            })
            .await;

        let mut urgent = classified("anything", "x");
        urgent.priority = 3;
        assert_eq!(router.route(&urgent).await.unwrap(), "urgent");
        assert!(router.route(&classified("anything", "x")).await.is_err());
    }

    #[tokio::test]
    async fn falls_back_to_default_queue() {
        let router = Router::new();
        router.set_default_queue("fallback").await;
        let queue = router.route(&classified("unmatched", "x")).await.unwrap();
        assert_eq!(queue, "fallback");
    }

    #[tokio::test]
    async fn no_match_and_no_default_is_an_error() {
        let router = Router::new();
        assert!(router.route(&classified("unmatched", "x")).await.is_err());
    }
}
