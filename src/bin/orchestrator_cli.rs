//! Thin demo harness wiring a custom-classifier `Sdk` instance with in-memory
//! persistence. Reads utterances from stdin, one per line, and prints emitted events.
//!
//! Run with: cargo run --bin orchestrator-cli

use clap::Parser;
use std::io::{self, BufRead};
use std::sync::Arc;
use taskflow_core::agents::{Agent, AgentOutcome};
use taskflow_core::classifier::{Classifier, CustomClassifier};
use taskflow_core::config::SdkConfig;
use taskflow_core::context::AppContext;
use taskflow_core::error::Result;
use taskflow_core::queues::QueueConfig;
use taskflow_core::router::RuleInput;
use taskflow_core::tasks::{ClassifiedTask, Task};
use taskflow_core::Sdk;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "orchestrator-cli", about = "Interactive demo for the orchestration core")]
struct Cli {
    /// Name of the default queue every task routes to.
    #[arg(long, default_value = "default")]
    queue: String,

    /// Queue concurrency.
    #[arg(long, default_value_t = 2)]
    concurrency: usize,
}

struct EchoAgent;

#[async_trait::async_trait]
impl Agent for EchoAgent {
    async fn resolve(&self, task: &Task, _ctx: &AppContext) -> Result<AgentOutcome> {
        Ok(AgentOutcome::value(serde_json::json!({ "echoed": task.content })))
    }
}

/// Classifies every line as a `speak` action; a real embedder would supply a parser or
/// an AI classifier instead.
fn demo_classifier() -> Arc<dyn Classifier> {
    Arc::new(CustomClassifier::new(Arc::new(|utterance, _actions, _ctx| {
        Box::pin(async move {
            Ok(Some(ClassifiedTask {
                action: "speak".to_string(),
                content: utterance,
                params: serde_json::json!({}),
                priority: 2,
                confidence: 1.0,
            }))
        })
    })))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let cli = Cli::parse();

    let mut config = SdkConfig::with_custom_classifier();
    config.default_queue = Some(cli.queue.clone());

    let sdk = Arc::new(Sdk::with_classifier(config, demo_classifier()));

    sdk.create_queue(
        cli.queue.clone(),
        QueueConfig {
            concurrency: cli.concurrency,
            max_size: None,
            overflow: taskflow_core::queues::OverflowPolicy::Error,
        },
    )
    .await?;

    sdk.add_rule(RuleInput {
        priority: 0,
        action: None,
        pattern: None,
        condition: None,
        target_queue: cli.queue.clone(),
    })
    .await;

    let agent_id = sdk
        .register_agent("echo", vec![cli.queue.clone()], vec![], 0, Arc::new(EchoAgent))
        .await?;
    info!("registered demo agent {}", agent_id);

    let mut events = sdk.on();
    let sdk_for_listener = sdk.clone();
    tokio::spawn(async move {
        let _workers = sdk_for_listener.start_listening().await;
        while let Some(event) = events.recv().await {
            println!("event: {:?}", event.kind);
        }
    });

    info!("reading utterances from stdin, one per line (Ctrl-D to stop)");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match sdk.submit(line).await {
            Ok(Some(id)) => info!("submitted task {}", id),
            Ok(None) => info!("utterance produced no task"),
            Err(e) => tracing::error!("submit failed: {}", e),
        }
    }

    Ok(())
}
