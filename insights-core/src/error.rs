//! Error type shared by every stage of the insights pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InsightsError {
    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("invalid locale tag {0:?}")]
    InvalidLocale(String),
    #[error("malformed result row: {0}")]
    MalformedRow(String),
    #[error("cache error: {0}")]
    Cache(String),
    /// Failures of the external query executor, passed through untouched.
    #[error(transparent)]
    Executor(anyhow::Error),
}

impl InsightsError {
    /// Whether the caller sent something unusable (as opposed to a backend failure).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            InsightsError::MissingParameter(_)
                | InsightsError::InvalidFilter(_)
                | InsightsError::InvalidLocale(_)
        )
    }
}
