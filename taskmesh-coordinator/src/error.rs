//! Façade error taxonomy (spec §7): wraps every collaborator's error
//! plus the coordinator's own bound-enforcement failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Orchestrator(#[from] taskmesh_orchestrator::OrchestratorError),

    #[error(transparent)]
    Pool(#[from] taskmesh_pool::PoolError),

    #[error(transparent)]
    Protocol(#[from] taskmesh_protocol::ProtocolError),

    #[error(transparent)]
    Ledger(#[from] taskmesh_ledger::LedgerError),

    #[error(transparent)]
    Worker(#[from] taskmesh_worker::WorkerError),

    #[error("worker pool already has the maximum of {0} workers")]
    MaxWorkersExceeded(usize),

    #[error("worker '{0}' is not owned by this coordinator")]
    NotCoordinatorOwned(String),
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
