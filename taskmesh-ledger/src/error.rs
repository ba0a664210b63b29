use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("task not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("task already exists: {0}")]
    AlreadyExists(uuid::Uuid),

    #[error("invalid status transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: taskmesh_shared::model::TaskStatus,
        to: taskmesh_shared::model::TaskStatus,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
