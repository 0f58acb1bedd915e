//! # Taskflow Core
//!
//! A voice-driven task orchestration runtime: utterances are classified into named
//! actions, routed to named queues, and dispatched to registered agents under
//! concurrency, retry, priority, and lifecycle-hook discipline.
//!
//! ## Architecture
//!
//! - **Action Store**: CRUD of classifiable intents.
//! - **Classifier**: AI, custom, or hybrid utterance-to-task classification.
//! - **Router**: priority-ordered rules mapping a classified task to a queue.
//! - **Queue Manager**: named queues with concurrency caps and overflow policy.
//! - **Agent Registry**: named resolvers subscribed to queues and/or actions.
//! - **Dispatcher**: one worker per queue; retry, backoff, and dead-lettering.
//! - **Hook Manager**: six lifecycle interception points.
//! - **Task Store**: task records and their lifecycle transitions.
//! - **Undo Log**: bounded MRU list of compensating actions.
//! - **SDK Facade**: wires the above and owns the ambient `AppContext`.

/// Action registry: CRUD of classifiable intents.
pub mod actions;
/// Agent registry and the `Agent` plugin trait.
pub mod agents;
/// Classifier trait and AI/custom/hybrid implementations.
pub mod classifier;
/// Construction-time configuration for the SDK facade.
pub mod config;
/// System-wide default values.
pub mod constants;
/// Ambient snapshot passed into hooks, classifier, and agents.
pub mod context;
/// Dispatcher: picks, runs, retries, and dead-letters tasks.
pub mod dispatcher;
/// Error types and handling.
pub mod error;
/// Fan-out event bus for dispatcher lifecycle events.
pub mod events;
/// Six lifecycle interception points.
pub mod hooks;
/// Opaque identifiers and clock utilities.
pub mod ids;
/// Reference persistence adapters (in-memory, file-backed JSON).
pub mod persistence;
/// Named queues with concurrency, capacity, and overflow discipline.
pub mod queues;
/// Priority-ordered routing rules.
pub mod router;
/// The SDK facade wiring every component.
pub mod sdk;
/// Task records, lifecycle, and the task store.
pub mod tasks;
/// Bounded MRU undo log.
pub mod undo;
/// Content and name validation.
pub mod validation;

pub use error::{OrchestratorError, Result};
pub use sdk::Sdk;
