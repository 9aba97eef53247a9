use thiserror::Error;

/// Error taxonomy for the whole core. Every failure is terminal for the
/// single request or event that triggered it; there are no retries at this
/// layer.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Missing or malformed input (400-equivalent). Nothing was persisted.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Actor is not a participant, or not the creator (403-equivalent).
    /// No store mutation occurred.
    #[error("not authorized")]
    Forbidden,

    /// Unknown conversation id (404-equivalent).
    #[error("conversation not found")]
    NotFound,

    /// Store-layer failure (500-equivalent). Broadcast is skipped.
    #[error("storage failure: {0}")]
    Persistence(String),
}

impl From<rusqlite::Error> for ChatError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
