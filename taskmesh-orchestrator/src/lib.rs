//! Orchestrator (spec C8 / §4.8): turns a single high-level request into
//! a DAG of subtasks dispatched across a [`taskmesh_pool::WorkerPool`]
//! and tracked in a [`taskmesh_ledger::Ledger`], with bounded retries
//! and a single replanning attempt on exhausted retries.

mod dag;
pub mod error;
mod orchestrator;
mod plan;
pub mod reasoning;

pub use dag::Dag;
pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{ExecutionResult, ExecutionStatus, Orchestrator};
pub use plan::{parse_plan_response, Plan, PlanRequest, SubtaskSpec};
pub use reasoning::{HttpReasoningService, ReasoningService, ScriptedReasoningService};
