//! Worker-layer error taxonomy (spec §7, WorkerAgent row).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("malformed task content: {0}")]
    MalformedTask(String),

    #[error("handler failed: {0}")]
    HandlerFailed(String),

    #[error("worker is not in a state that accepts '{operation}': current state is {state}")]
    InvalidState { operation: &'static str, state: &'static str },

    #[error(transparent)]
    Protocol(#[from] taskmesh_protocol::ProtocolError),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
