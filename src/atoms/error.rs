// ── Luma Atoms: Error Types ────────────────────────────────────────────────
// Canonical error enums for the engine, built with `thiserror`.
//
// Design rules:
//   • `EngineError` variants are coarse-grained by domain.
//   • Backend failures carry their own taxonomy (`BackendError`) because the
//     pipeline maps each class to a distinct user-facing message and retry
//     policy (rate limit → wait, quota → upgrade, outage → retry now).
//   • Extractor and state-machine failures never become errors at all: they
//     degrade to the neutral signal or to inaction at their own boundary.
//   • `EngineError` → `String` conversion is provided so host-app boundaries
//     (`Result<T, String>`) can call `.map_err(Into::into)` without
//     boilerplate.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Generation backend failure, already classified.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// A generation is already in flight for this conversation.
    /// The caller should surface "still thinking" and not start a second one.
    #[error("A response is already streaming for conversation {conversation}")]
    StillThinking { conversation: String },

    /// Conversation store failure (record missing, frozen record mutated…).
    #[error("Store error: {0}")]
    Store(String),

    /// Engine configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not yet have a dedicated variant.
    /// Prefer adding a specific variant over using this in new code.
    #[error("{0}")]
    Other(String),
}

// ── Backend error taxonomy ─────────────────────────────────────────────────
// One variant per failure class the product reacts to differently.
// `user_message` / `retry_hint` are the single source of truth for what the
// pipeline shows and suggests after a failure.

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// 429-class throttling. `retry_after_secs` comes from the
    /// `Retry-After` header when the server sent one.
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// 402-class quota / payment exhaustion.
    #[error("Quota exceeded: {message}")]
    QuotaExceeded { message: String },

    /// Authentication / authorization failure. Never retried.
    #[error("Auth error: {0}")]
    Auth(String),

    /// Non-retryable API error with an HTTP status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Connection / read failure before or during the stream.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// What the caller should suggest to the user after a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryHint {
    /// Back off briefly before retrying (rate limiting).
    ShortDelay { secs: u64 },
    /// Retrying will not help until the plan/quota changes.
    Upgrade,
    /// Transient failure; an immediate retry is reasonable.
    Immediate,
}

impl BackendError {
    /// Short, non-technical, user-visible message for this failure class.
    pub fn user_message(&self) -> &'static str {
        match self {
            BackendError::RateLimited { .. } => {
                "I'm getting a lot of requests right now — give me a few seconds and try again."
            }
            BackendError::QuotaExceeded { .. } => {
                "I've hit my usage limit for now. Upgrading the plan will let us keep talking."
            }
            BackendError::Auth(_) => {
                "I couldn't reach my brain — something is off with the connection settings."
            }
            BackendError::Api { .. } | BackendError::Transport(_) => {
                "Something went wrong on my side. Mind trying that once more?"
            }
        }
    }

    /// Retry policy for this failure class.
    pub fn retry_hint(&self) -> RetryHint {
        match self {
            BackendError::RateLimited { retry_after_secs, .. } => RetryHint::ShortDelay {
                secs: retry_after_secs.unwrap_or(5),
            },
            BackendError::QuotaExceeded { .. } | BackendError::Auth(_) => RetryHint::Upgrade,
            BackendError::Api { .. } | BackendError::Transport(_) => RetryHint::Immediate,
        }
    }
}

// ── Migration bridge: String → EngineError ─────────────────────────────────

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Other(s.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All engine operations should return this type.
pub type EngineResult<T> = Result<T, EngineError>;

// ── Conversion: EngineError → String ───────────────────────────────────────
// Lets host-app boundary functions call `.map_err(EngineError::into)` directly.

impl From<EngineError> for String {
    fn from(e: EngineError) -> Self {
        e.to_string()
    }
}
