use sentinel_bandits::BanditError;
use thiserror::Error;

/// Errors surfaced to callers of the engine.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Bandit state error: {0}")]
    Bandit(#[from] BanditError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Failures of the hint-generation collaborator. Never leaves the engine:
/// every variant is replaced by the fallback payload.
#[derive(Debug, Error)]
pub enum HintError {
    #[error("GROK_API_KEY is not configured")]
    MissingApiKey,
    #[error("Hint request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unparseable hint reply: {0}")]
    Unparseable(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
