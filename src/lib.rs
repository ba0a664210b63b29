//! `taskmesh`: a multi-agent orchestration core. Decomposes high-level
//! task requests into dependent subtasks via a pluggable reasoning
//! service, schedules them onto a pool of worker agents over a
//! message-passing protocol, and tracks progress and results in a
//! pluggable ledger.
//!
//! This crate re-exports the [`taskmesh_coordinator::Coordinator`]
//! façade; the workspace members (`taskmesh-protocol`, `taskmesh-ledger`,
//! `taskmesh-pool`, `taskmesh-worker`, `taskmesh-orchestrator`) are the
//! implementation and can be depended on directly by callers that only
//! need one layer.

pub use taskmesh_coordinator::{
    ComponentHealth, Coordinator, CoordinatorError, CoordinatorResult, DefaultTaskHandler, ExecuteTaskRequest, HealthReport, HealthStatus,
    MonitoringStats, DEFAULT_CAPABILITIES,
};
pub use taskmesh_orchestrator::{ExecutionResult, ExecutionStatus, PlanRequest};
pub use taskmesh_protocol::{Protocol, SharedProtocol};
pub use taskmesh_shared::config::TaskMeshConfig;
pub use taskmesh_shared::model;
