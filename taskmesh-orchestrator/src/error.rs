//! Orchestrator error taxonomy (spec §7, Orchestrator-facing rows).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("planning failed: {0}")]
    Planning(String),

    #[error(transparent)]
    Pool(#[from] taskmesh_pool::PoolError),

    #[error(transparent)]
    Ledger(#[from] taskmesh_ledger::LedgerError),

    #[error(transparent)]
    Protocol(#[from] taskmesh_protocol::ProtocolError),

    #[error("task '{0}' exhausted its retry budget")]
    RetriesExhausted(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("task '{0}' timed out")]
    Timeout(String),
}

impl OrchestratorError {
    /// Per spec §7: retry only transient classes (pool/protocol
    /// transport issues); planning and ledger failures surface directly.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Pool(_) | Self::Protocol(_) | Self::Timeout(_))
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
