//! AppContext (§3): the opaque ambient snapshot passed into hooks, the classifier, and
//! agents. Treated as copy-on-write for hook returns; in-place mutation only through
//! `update`.

use crate::tasks::Task;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppContext {
    pub active_document: Option<String>,
    pub selected_text: Option<String>,
    pub current_user: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub conversation_history: Vec<String>,
    pub last_task: Option<Task>,
}

/// Holder for the SDK facade's singleton context; `get` clones a snapshot (copy-on-read
/// matches the copy-on-write contract hooks see), `update` replaces it in place.
#[derive(Clone)]
pub struct ContextHandle {
    inner: Arc<RwLock<AppContext>>,
}

impl ContextHandle {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ctx)),
        }
    }

    pub async fn get(&self) -> AppContext {
        self.inner.read().await.clone()
    }

    pub async fn set(&self, ctx: AppContext) {
        *self.inner.write().await = ctx;
    }

    /// Applies `f` to a clone of the current context and stores the result, matching
    /// the copy-on-write discipline hooks use when they return a modified context.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(AppContext) -> AppContext,
    {
        let mut guard = self.inner.write().await;
        let updated = f(guard.clone());
        *guard = updated;
    }
}

impl Default for ContextHandle {
    fn default() -> Self {
        Self::new(AppContext::default())
    }
}
