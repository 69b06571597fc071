use thiserror::Error;

/// Error taxonomy for the messaging core. Every inbound handler maps its
/// failure onto one of these and answers on the wire; no error ever tears
/// down the connection.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ChatError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("not allowed")]
    Unauthorized,
    #[error("conversation not found")]
    NotFound,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("rate limit exceeded, slow down")]
    RateLimited,
    #[error("temporary failure: {0}")]
    Transient(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Text sent to the client. `Unauthorized` and `NotFound` share one
    /// message so a caller cannot distinguish "exists but not yours" from
    /// "does not exist".
    pub fn wire_message(&self) -> String {
        match self {
            ChatError::Unauthorized | ChatError::NotFound => "conversation not found".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Transient(_))
    }
}
