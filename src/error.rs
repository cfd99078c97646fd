use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("load timed out after {0:?}")]
    Timeout(Duration),
    #[error("load cancelled")]
    Cancelled,
    #[error("invoice sync failed: {0}")]
    Sync(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl StudioError {
    /// Message suitable for an error banner. Read failures all collapse into
    /// the same text; callers offer a retry instead of a diagnosis.
    pub fn user_message(&self) -> &'static str {
        match self {
            StudioError::Sync(_) => "failed to sync financial data",
            StudioError::InvalidInput(_) => "invalid input",
            _ => "failed to load data",
        }
    }
}

impl From<reqwest::Error> for StudioError {
    fn from(err: reqwest::Error) -> Self {
        StudioError::Sync(err.to_string())
    }
}

impl From<serde_json::Error> for StudioError {
    fn from(err: serde_json::Error) -> Self {
        StudioError::InvalidInput(err.to_string())
    }
}
