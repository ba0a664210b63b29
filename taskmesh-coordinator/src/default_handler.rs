//! The stand-in handler `Initialize` registers for the default worker
//! pool (spec §4.9: "wires a default pool of workers"). Real deployments
//! register their own [`taskmesh_worker::TaskHandler`] via
//! [`crate::Coordinator::create_custom_worker`]; this one exists purely
//! so the façade is usable out of the box and so the seed tests (spec §8
//! S1) have a deterministic `"Mock result for {name}"` handler to exercise.

use async_trait::async_trait;
use serde_json::{json, Value as Json};

use taskmesh_shared::model::Task;
use taskmesh_worker::TaskContext;

#[derive(Debug)]
pub struct DefaultTaskHandler {
    capability: String,
}

impl DefaultTaskHandler {
    pub fn new(capability: impl Into<String>) -> Self {
        Self { capability: capability.into() }
    }
}

#[async_trait]
impl taskmesh_worker::TaskHandler for DefaultTaskHandler {
    async fn handle_task(&self, _ctx: &TaskContext, task: &Task) -> Result<Json, String> {
        Ok(json!({ "status": "completed", "result": format!("Mock result for {}", task.name) }))
    }

    fn capabilities(&self) -> Vec<String> {
        vec![self.capability.clone()]
    }

    fn name(&self) -> String {
        format!("default-{}", self.capability)
    }
}
