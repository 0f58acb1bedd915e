//! System-wide default values. Overridable per-instance through `SdkConfig`.

/// Dispatcher idle polling tick (§4.8).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Default undo log capacity (§3, §4.9).
pub const DEFAULT_UNDO_CAPACITY: usize = 100;

/// Default max attempts for a task that doesn't specify one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff: `base * 2^(attempt-1)`.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 200;

/// Backoff cap, regardless of attempt count.
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// AI classifier debounce window (§4.7).
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;

/// AI classifier requests-per-minute ceiling (§4.7).
pub const DEFAULT_MAX_REQUESTS_PER_MINUTE: u32 = 30;

/// Confidence floor below which the AI classifier returns no task.
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.5;

/// Max length of an utterance's content after sanitization, in characters (§4.7).
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 4000;
