use thiserror::Error;

#[derive(Debug, Error)]
pub enum BanditError {
    #[error("Snapshot deserialization failed: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("Invalid action: {0}")]
    InvalidAction(String),
    #[error("Weight vector for {action} has {found} entries, expected {expected}")]
    DimensionMismatch {
        action: String,
        expected: usize,
        found: usize,
    },
}

pub type Result<T> = std::result::Result<T, BanditError>;
