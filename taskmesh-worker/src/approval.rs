//! Human-approval decorator (spec §4.4): wraps a handler so that tasks
//! of configured types require an external approval decision before the
//! wrapped handler ever runs.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value as Json};

use taskmesh_shared::model::Task;

use crate::handler::{SharedTaskHandler, TaskContext, TaskHandler};

/// Decides whether a task may proceed. Production code typically backs
/// this with a human-in-the-loop channel; tests use a fixed decision.
#[async_trait]
pub trait ApprovalGate: Send + Sync + std::fmt::Debug {
    async fn approve(&self, task: &Task) -> bool;
}

/// Gate that always returns the same decision, for tests and for the
/// "approve everything" default.
#[derive(Debug, Clone, Copy)]
pub struct FixedApprovalGate(pub bool);

#[async_trait]
impl ApprovalGate for FixedApprovalGate {
    async fn approve(&self, _task: &Task) -> bool {
        self.0
    }
}

#[derive(Debug)]
pub struct HumanApprovalDecorator {
    inner: SharedTaskHandler,
    gate: Arc<dyn ApprovalGate>,
    gated_task_types: HashSet<String>,
}

impl HumanApprovalDecorator {
    pub fn new(inner: SharedTaskHandler, gate: Arc<dyn ApprovalGate>, gated_task_types: impl IntoIterator<Item = String>) -> Self {
        Self {
            inner,
            gate,
            gated_task_types: gated_task_types.into_iter().collect(),
        }
    }

    fn requires_approval(&self, task: &Task) -> bool {
        self.gated_task_types.contains(&task.task_type)
    }
}

#[async_trait]
impl TaskHandler for HumanApprovalDecorator {
    async fn handle_task(&self, ctx: &TaskContext, task: &Task) -> Result<Json, String> {
        if self.requires_approval(task) && !self.gate.approve(task).await {
            return Ok(json!({
                "status": "rejected",
                "message": format!("task type '{}' requires human approval and was not approved", task.task_type),
            }));
        }
        self.inner.handle_task(ctx, task).await
    }

    fn capabilities(&self) -> Vec<String> {
        self.inner.capabilities()
    }

    fn name(&self) -> String {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::TaskContext;
    use serde_json::json as js;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug)]
    struct EchoHandler;

    #[async_trait]
    impl TaskHandler for EchoHandler {
        async fn handle_task(&self, _ctx: &TaskContext, task: &Task) -> Result<Json, String> {
            Ok(js!({ "echoed": task.name }))
        }

        fn capabilities(&self) -> Vec<String> {
            vec!["code_generation".to_string()]
        }

        fn name(&self) -> String {
            "echo".to_string()
        }
    }

    fn ctx() -> TaskContext {
        TaskContext::new(CancellationToken::new())
    }

    #[tokio::test]
    async fn rejected_approval_short_circuits_inner_handler() {
        let decorator = HumanApprovalDecorator::new(
            Arc::new(EchoHandler),
            Arc::new(FixedApprovalGate(false)),
            ["code_generation".to_string()],
        );
        let task = Task::new("t", "code_generation", "creator", js!({}));
        let output = decorator.handle_task(&ctx(), &task).await.unwrap();
        assert_eq!(output["status"], "rejected");
    }

    #[tokio::test]
    async fn approved_task_reaches_inner_handler() {
        let decorator = HumanApprovalDecorator::new(
            Arc::new(EchoHandler),
            Arc::new(FixedApprovalGate(true)),
            ["code_generation".to_string()],
        );
        let task = Task::new("t", "code_generation", "creator", js!({}));
        let output = decorator.handle_task(&ctx(), &task).await.unwrap();
        assert_eq!(output["echoed"], "t");
    }

    #[tokio::test]
    async fn ungated_task_type_bypasses_gate() {
        let decorator = HumanApprovalDecorator::new(
            Arc::new(EchoHandler),
            Arc::new(FixedApprovalGate(false)),
            ["research".to_string()],
        );
        let task = Task::new("t", "code_generation", "creator", js!({}));
        let output = decorator.handle_task(&ctx(), &task).await.unwrap();
        assert_eq!(output["echoed"], "t");
    }
}
