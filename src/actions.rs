//! Action Store (§4.1): CRUD of classifiable intents, enable/disable, name-keyed.

use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ParameterSpec {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    pub param_type: ParameterType,
    pub required: bool,
    pub default: Option<serde_json::Value>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Action {
    #[validate(length(min = 2, max = 64))]
    pub name: String,
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    #[validate(nested)]
    pub parameters: Vec<ParameterSpec>,
    pub examples: Vec<String>,
    pub enabled: bool,
}

impl Action {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            examples: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_parameter(mut self, param: ParameterSpec) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }
}

/// Fields a caller may change via `update`; `None` leaves the field untouched.
#[derive(Debug, Default, Clone)]
pub struct ActionUpdate {
    pub description: Option<String>,
    pub parameters: Option<Vec<ParameterSpec>>,
    pub examples: Option<Vec<String>>,
    pub enabled: Option<bool>,
}

#[derive(Clone)]
pub struct ActionStore {
    actions: Arc<RwLock<HashMap<String, Action>>>,
}

impl ActionStore {
    pub fn new() -> Self {
        Self {
            actions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn create(&self, action: Action) -> Result<Action> {
        action
            .validate()
            .map_err(|e| OrchestratorError::Validation(e.to_string()))?;
        crate::validation::validate_action_name(&action.name)?;

        let mut actions = self.actions.write().await;
        if actions.contains_key(&action.name) {
            warn!("duplicate action name: {}", action.name);
            return Err(OrchestratorError::DuplicateName(action.name));
        }
        info!("created action: {}", action.name);
        actions.insert(action.name.clone(), action.clone());
        Ok(action)
    }

    pub async fn read(&self, name: &str) -> Option<Action> {
        let actions = self.actions.read().await;
        actions.get(name).cloned()
    }

    pub async fn update(&self, name: &str, delta: ActionUpdate) -> Result<Action> {
        let mut actions = self.actions.write().await;
        let action = actions
            .get_mut(name)
            .ok_or_else(|| OrchestratorError::NotFound(name.to_string()))?;

        if let Some(description) = delta.description {
            action.description = description;
        }
        if let Some(parameters) = delta.parameters {
            action.parameters = parameters;
        }
        if let Some(examples) = delta.examples {
            action.examples = examples;
        }
        if let Some(enabled) = delta.enabled {
            action.enabled = enabled;
        }
        debug!("updated action: {}", name);
        Ok(action.clone())
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let mut actions = self.actions.write().await;
        actions
            .remove(name)
            .ok_or_else(|| OrchestratorError::NotFound(name.to_string()))?;
        info!("deleted action: {}", name);
        Ok(())
    }

    pub async fn list(&self, enabled_only: bool) -> Vec<Action> {
        let actions = self.actions.read().await;
        actions
            .values()
            .filter(|a| !enabled_only || a.enabled)
            .cloned()
            .collect()
    }

    pub async fn enable(&self, name: &str) -> Result<()> {
        self.update(
            name,
            ActionUpdate {
                enabled: Some(true),
                ..Default::default()
            },
        )
        .await?;
        Ok(())
    }

    pub async fn disable(&self, name: &str) -> Result<()> {
        self.update(
            name,
            ActionUpdate {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await?;
        Ok(())
    }
}

impl Default for ActionStore {
    fn default() -> Self {
        Self::new()
    }
}
