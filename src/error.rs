use thiserror::Error;

/// Convenience alias for Results with [`OrchestratorError`].
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Crate-wide error taxonomy, one variant per error kind in the error handling design.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("duplicate name: {0}")]
    DuplicateName(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("queue full: {queue}")]
    QueueFull { queue: String },

    #[error("no agent available for task {task_id}")]
    NoAgent { task_id: String },

    #[error("agent error: {message}")]
    Agent { message: String },

    #[error("timeout: {message}")]
    Timeout { message: String },

    #[error("classify error: {0}")]
    Classify(String),

    #[error("undo error: {0}")]
    Undo(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OrchestratorError {
    /// Whether this error class is considered "permanent" per the dispatcher's
    /// retry/dead-letter decision (§4.8, §7): permanent errors skip retry even when the
    /// hook would otherwise allow one.
    pub fn is_permanent(&self) -> bool {
        matches!(self, OrchestratorError::NoAgent { .. })
    }
}
