//! Protocol-layer error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("recipient must not be empty")]
    EmptyRecipient,

    #[error("message size {size} exceeds max_message_size {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("security policy rejected message: {0}")]
    SecurityRejected(String),

    #[error("unknown broadcast group: {0}")]
    UnknownGroup(String),

    #[error("queue for '{agent_id}' is at capacity ({capacity})")]
    QueueFull { agent_id: String, capacity: usize },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("circuit breaker open for protocol backend")]
    CircuitOpen,

    #[error("{operation} did not complete within {timeout:?}")]
    Timeout { operation: String, timeout: std::time::Duration },
}

impl ProtocolError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
