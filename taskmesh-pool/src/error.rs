//! Pool/balancer error taxonomy (spec §4.5/§4.6).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker '{0}' not found")]
    NotFound(String),

    #[error("worker '{0}' already registered")]
    AlreadyExists(String),

    #[error("no workers registered for capability")]
    NoWorkerAvailable,

    #[error("workers exist but none match the required capability")]
    NoCapableWorker,

    #[error("cannot scale below min_workers or above max_workers")]
    OutOfBounds,
}

pub type PoolResult<T> = Result<T, PoolError>;
