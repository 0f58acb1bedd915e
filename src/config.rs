//! Construction-time configuration for the SDK facade (§6.5).

use crate::constants::{
    DEFAULT_CONFIDENCE_FLOOR, DEFAULT_DEBOUNCE_MS, DEFAULT_MAX_REQUESTS_PER_MINUTE,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_UNDO_CAPACITY,
};
use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifierMode {
    Ai,
    Custom,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OnClassifyError {
    Ignore,
    Throw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub mode: ClassifierMode,
    pub api_key: Option<String>,
    pub ai_model: String,
    pub debounce_ms: u64,
    pub max_requests_per_minute: u32,
    pub confidence_floor: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPolicy {
    pub on_classify_error: OnClassifyError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdkConfig {
    pub default_queue: Option<String>,
    pub classifier: ClassifierConfig,
    pub errors: ErrorPolicy,
    pub undo_capacity: usize,
    pub poll_interval_ms: u64,
}

impl SdkConfig {
    /// Builds a config for a `Custom` classifier with no network dependency. The
    /// common case for embedding tests and the CLI harness.
    pub fn with_custom_classifier() -> Self {
        Self {
            default_queue: None,
            classifier: ClassifierConfig {
                mode: ClassifierMode::Custom,
                api_key: None,
                ai_model: String::new(),
                debounce_ms: DEFAULT_DEBOUNCE_MS,
                max_requests_per_minute: DEFAULT_MAX_REQUESTS_PER_MINUTE,
                confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
            },
            errors: ErrorPolicy {
                on_classify_error: OnClassifyError::Ignore,
            },
            undo_capacity: DEFAULT_UNDO_CAPACITY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    /// Loads configuration from the process environment: required variables hard-fail
    /// construction, optional ones fall back to defaults.
    pub fn load_from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("loaded .env file from {:?}", path),
            Err(e) => tracing::debug!("no .env file loaded: {}", e),
        }

        let mode = match env::var("CLASSIFIER_MODE").unwrap_or_else(|_| "custom".to_string()).as_str() {
            "ai" => ClassifierMode::Ai,
            "hybrid" => ClassifierMode::Hybrid,
            _ => ClassifierMode::Custom,
        };

        let api_key = env::var("CLASSIFIER_API_KEY").ok();
        if matches!(mode, ClassifierMode::Ai | ClassifierMode::Hybrid) && api_key.is_none() {
            return Err(OrchestratorError::Configuration(
                "CLASSIFIER_API_KEY is required when classifier mode is ai or hybrid".to_string(),
            ));
        }

        let classifier = ClassifierConfig {
            mode,
            api_key,
            ai_model: env::var("CLASSIFIER_AI_MODEL")
                .unwrap_or_else(|_| "claude-3-5-sonnet-20241022".to_string()),
            debounce_ms: env::var("CLASSIFIER_DEBOUNCE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_DEBOUNCE_MS),
            max_requests_per_minute: env::var("CLASSIFIER_MAX_RPM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_REQUESTS_PER_MINUTE),
            confidence_floor: env::var("CLASSIFIER_CONFIDENCE_FLOOR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_CONFIDENCE_FLOOR),
        };

        let on_classify_error = match env::var("ON_CLASSIFY_ERROR")
            .unwrap_or_else(|_| "ignore".to_string())
            .as_str()
        {
            "throw" => OnClassifyError::Throw,
            _ => OnClassifyError::Ignore,
        };

        Ok(Self {
            default_queue: env::var("DEFAULT_QUEUE").ok(),
            classifier,
            errors: ErrorPolicy { on_classify_error },
            undo_capacity: env::var("UNDO_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_UNDO_CAPACITY),
            poll_interval_ms: env::var("POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        })
    }
}
