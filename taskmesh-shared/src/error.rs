//! Workspace-wide error taxonomy (spec §7).
//!
//! Each downstream crate defines its own `thiserror` enum for
//! component-local detail and converts into [`TaskMeshError`] at the
//! boundary where callers need a single type (Coordinator façade,
//! Orchestrator retry logic).

use thiserror::Error;

/// Top-level error taxonomy, one variant per row of spec §7's table.
#[derive(Debug, Error)]
pub enum TaskMeshError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("security policy rejected operation: {0}")]
    SecurityRejected(String),

    #[error("worker handler error: {0}")]
    WorkerHandler(String),

    #[error("worker timeout after {0:?}")]
    WorkerTimeout(std::time::Duration),

    #[error("ledger write failed: {0}")]
    LedgerWrite(String),

    #[error("planning failed: {0}")]
    Planning(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TaskMeshError {
    /// Whether the orchestrator's retry logic should attempt this error
    /// class again (spec §7: "retry only transient classes").
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::WorkerHandler(_) | Self::WorkerTimeout(_)
        )
    }
}

pub type TaskMeshResult<T> = Result<T, TaskMeshError>;
