//! The capability-set handler contract (spec §4.4 / "Polymorphism of
//! task handlers"): `HandleTask`, `GetCapabilities`, `GetName`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;

use taskmesh_shared::model::Task;

/// Per-invocation context passed to a handler, carrying the cancellation
/// signal that must propagate to any broker client the handler opens
/// (spec §5: "cancellation must flow to all children").
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub cancellation: CancellationToken,
}

impl TaskContext {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self { cancellation }
    }
}

#[async_trait]
pub trait TaskHandler: Send + Sync + std::fmt::Debug {
    /// Execute `task`, returning its output on success or a human-readable
    /// error string on failure.
    async fn handle_task(&self, ctx: &TaskContext, task: &Task) -> Result<Json, String>;

    /// Capability tags this handler satisfies (matched against `Task::task_type`).
    fn capabilities(&self) -> Vec<String>;

    /// Display name used in spans, metrics, and worker registration.
    fn name(&self) -> String;
}

pub type SharedTaskHandler = Arc<dyn TaskHandler>;
