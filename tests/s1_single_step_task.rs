//! S1: a single-step task runs end to end through the `Coordinator`
//! façade and completes via its default worker pool.

use std::sync::Arc;

use serde_json::json;

use taskmesh_ledger::{InMemoryLedger, Ledger};
use taskmesh_orchestrator::{ExecutionStatus, ScriptedReasoningService};
use taskmesh_protocol::{InMemoryProtocol, Protocol};
use taskmesh_shared::config::TaskMeshConfig;
use taskmesh_shared::model::{SecurityPolicy, TaskPriority};
use taskmesh_coordinator::{Coordinator, ExecuteTaskRequest, DEFAULT_CAPABILITIES};

#[tokio::test]
async fn single_step_task_completes_via_default_worker() {
    let raw_plan = json!({
        "subtasks": [{"name": "Simple", "assigned_to": "code_generation", "dependencies": [], "priority": 5, "input": "x"}]
    })
    .to_string();

    let protocol: Arc<dyn Protocol> = Arc::new(InMemoryProtocol::new(SecurityPolicy::default(), 64));
    let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new());
    let reasoning = Arc::new(ScriptedReasoningService::new(vec![raw_plan]));

    let coordinator = Coordinator::initialize(
        "coordinator-s1",
        TaskMeshConfig::default(),
        Arc::clone(&protocol),
        Arc::clone(&ledger),
        reasoning,
        DEFAULT_CAPABILITIES.len(),
    )
    .await
    .unwrap();

    let request = ExecuteTaskRequest {
        name: "Simple".to_string(),
        description: String::new(),
        task_type: "code_generation".to_string(),
        priority: TaskPriority::Normal,
        input: json!("x"),
    };
    let result = coordinator.execute_task(request).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    let output = result.outputs.get("Simple").and_then(|v| v.get("result")).cloned();
    assert_eq!(output, Some(json!("Mock result for Simple")));

    let completed = ledger.list_tasks(&Default::default()).await.unwrap();
    assert_eq!(completed.iter().filter(|t| t.status == taskmesh_shared::model::TaskStatus::Completed).count(), 1);

    let metrics = protocol.metrics();
    assert!(metrics.sent >= 1);
    assert!(metrics.received >= 1);

    coordinator.shutdown().await.unwrap();
}
