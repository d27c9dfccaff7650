use shared::EntityId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("gave up after {attempts} failed connection attempts; restart required")]
    AttemptsExhausted { attempts: u32 },
    #[error("connection manager has been shut down")]
    ShutDown,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The server assigned a different identity than the one already held.
    /// Continuing would mix two players' state, so the session must restart.
    #[error("server reassigned identity from {held} to {assigned}; session must restart")]
    IdentityConflict { held: EntityId, assigned: EntityId },
    #[error("connection lost after {attempts} reconnect attempts")]
    ConnectionLost { attempts: u32 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
