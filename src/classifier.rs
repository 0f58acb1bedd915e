//! Classifier (§4.7): turns an utterance into a `ClassifiedTask`. Three implementations
//! share one trait so the core stays swap-able.

use crate::actions::Action;
use crate::context::AppContext;
use crate::error::{OrchestratorError, Result};
use crate::tasks::ClassifiedTask;
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use std::future::Future;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        utterance: &str,
        enabled_actions: &[Action],
        ctx: &AppContext,
    ) -> Result<Option<ClassifiedTask>>;
}

#[derive(Deserialize)]
struct AiResponse {
    action: String,
    params: serde_json::Value,
    confidence: f32,
    priority: u8,
}

/// Builds a structured prompt (system section enumerates actions, context section lists
/// document/user/history) and calls a chat completion endpoint. Debounces bursts of
/// utterances arriving within `debounce_ms` and sheds requests past the per-minute ceiling.
pub struct AiClassifier {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    debounce: Duration,
    confidence_floor: f32,
    generation: Arc<AtomicU64>,
    limiter: Arc<RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>>,
}

impl AiClassifier {
    pub fn new(api_key: String, model: String, debounce_ms: u64, max_requests_per_minute: u32, confidence_floor: f32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(max_requests_per_minute.max(1)).unwrap());
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            debounce: Duration::from_millis(debounce_ms),
            confidence_floor,
            generation: Arc::new(AtomicU64::new(0)),
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    fn build_prompt(&self, utterance: &str, enabled_actions: &[Action], ctx: &AppContext) -> String {
        let action_list: Vec<String> = enabled_actions
            .iter()
            .map(|a| {
                format!(
                    "- {}: {} (params: {:?})",
                    a.name,
                    a.description,
                    a.parameters.iter().map(|p| &p.name).collect::<Vec<_>>()
                )
            })
            .collect();

        format!(
            "You classify spoken utterances into one of these actions:\n{}\n\n\
             Context: document={:?} user={:?} history={:?}\n\n\
             Utterance: {}\n\n\
             Respond with JSON: {{\"action\": string, \"params\": object, \"confidence\": number, \"priority\": 1|2|3}}. \
             Use action \"unknown\" if nothing matches.",
            action_list.join("\n"),
            ctx.active_document,
            ctx.current_user,
            ctx.conversation_history,
            utterance
        )
    }
}

#[async_trait]
impl Classifier for AiClassifier {
    async fn classify(
        &self,
        utterance: &str,
        enabled_actions: &[Action],
        ctx: &AppContext,
    ) -> Result<Option<ClassifiedTask>> {
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
            if self.generation.load(Ordering::SeqCst) != my_generation {
                debug!("utterance superseded during debounce window");
                return Ok(None);
            }
        }

        if self.limiter.check().is_err() {
            warn!("classifier rate limit exceeded, shedding request");
            return Err(OrchestratorError::Classify("rate limit exceeded".to_string()));
        }

        let prompt = self.build_prompt(utterance, enabled_actions, ctx);
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 512,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let parsed: AiResponse = response.json().await?;

        if parsed.action == "unknown" || parsed.confidence < self.confidence_floor {
            return Ok(None);
        }

        Ok(Some(ClassifiedTask {
            action: parsed.action,
            content: utterance.to_string(),
            params: parsed.params,
            priority: parsed.priority,
            confidence: parsed.confidence,
        }))
    }
}

type CustomFn = Arc<
    dyn Fn(
            String,
            Vec<Action>,
            AppContext,
        ) -> Pin<Box<dyn Future<Output = Result<Option<ClassifiedTask>>> + Send>>
        + Send
        + Sync,
>;

/// Delegates entirely to a user-supplied function.
#[derive(Clone)]
pub struct CustomClassifier {
    f: CustomFn,
}

impl CustomClassifier {
    pub fn new(f: CustomFn) -> Self {
        Self { f }
    }
}

#[async_trait]
impl Classifier for CustomClassifier {
    async fn classify(
        &self,
        utterance: &str,
        enabled_actions: &[Action],
        ctx: &AppContext,
    ) -> Result<Option<ClassifiedTask>> {
        (self.f)(utterance.to_string(), enabled_actions.to_vec(), ctx.clone()).await
    }
}

/// Tries the custom classifier first; falls back to AI when it returns `None`.
pub struct HybridClassifier {
    custom: CustomClassifier,
    ai: AiClassifier,
}

impl HybridClassifier {
    pub fn new(custom: CustomClassifier, ai: AiClassifier) -> Self {
        Self { custom, ai }
    }
}

#[async_trait]
impl Classifier for HybridClassifier {
    async fn classify(
        &self,
        utterance: &str,
        enabled_actions: &[Action],
        ctx: &AppContext,
    ) -> Result<Option<ClassifiedTask>> {
        if let Some(task) = self.custom.classify(utterance, enabled_actions, ctx).await? {
            return Ok(Some(task));
        }
        self.ai.classify(utterance, enabled_actions, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn custom_classifier_delegates_to_closure() {
        let custom = CustomClassifier::new(Arc::new(|utterance, _actions, _ctx| {
            Box::pin(async move {
                Ok(Some(ClassifiedTask {
                    action: "create_note".to_string(),
                    content: utterance,
                    params: serde_json::json!({}),
                    priority: 2,
                    confidence: 1.0,
                }))
            })
        }));

        let result = custom.classify("take a note", &[], &AppContext::default()).await.unwrap();
        assert_eq!(result.unwrap().action, "create_note");
    }

    #[tokio::test]
    async fn custom_classifier_returning_none_means_unmatched() {
        let custom = CustomClassifier::new(Arc::new(|_, _, _| Box::pin(async { Ok(None) })));
        let result = custom.classify("gibberish", &[], &AppContext::default()).await.unwrap();
        assert!(result.is_none());
    }
}
