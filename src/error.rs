use std::path::PathBuf;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Unknown subscription tier `{0}` (expected free, pro, or unlimited)")]
    UnknownTier(String),

    #[error("Unknown agent kind `{0}` (expected claude or gemini)")]
    UnknownAgentKind(String),
}

/// Errors raised while launching a new agent. Fatal to that spawn attempt,
/// never to the engine itself.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Agent binary not found: `{binary}`")]
    BinaryNotFound { binary: String },

    #[error("Resource exhausted while spawning agent: {0}")]
    ResourceExhausted(String),

    #[error("Subscription tier allows at most {cap} concurrent agents")]
    TierLimitExceeded { cap: usize },
}

/// Caller errors on engine operations targeting a specific agent. Recovered
/// locally by the collaborator (e.g. shown as a UI message).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Agent not found: {id}")]
    AgentNotFound { id: String },

    #[error("Agent {id} is not running")]
    AgentNotRunning { id: String },

    #[error("Failed to write to agent {id}: {message}")]
    WriteFailed { id: String, message: String },
}

/// Errors related to session snapshot export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Session snapshot unavailable: engine is shutting down")]
    SnapshotUnavailable,

    #[error("Failed to serialize session snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
