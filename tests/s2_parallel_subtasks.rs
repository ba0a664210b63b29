//! S2: a three-subtask plan where C depends on A and B. A and B must
//! dispatch concurrently; C must stay pending until both finish.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as Json};
use tokio_util::sync::CancellationToken;

use taskmesh_ledger::{InMemoryLedger, Ledger};
use taskmesh_orchestrator::{ExecutionStatus, Orchestrator, PlanRequest, ScriptedReasoningService};
use taskmesh_pool::{build_balancer, WorkerPool, WorkerPoolConfig};
use taskmesh_protocol::{InMemoryProtocol, SharedProtocol};
use taskmesh_shared::config::balancer::LoadBalancerConfig;
use taskmesh_shared::config::orchestrator::OrchestratorConfig;
use taskmesh_shared::model::{AgentMetadata, AgentRole, SecurityPolicy, TaskStatus};
use taskmesh_worker::{TaskContext, TaskHandler, WorkerAgent};

#[derive(Debug)]
struct EchoHandler {
    capability: String,
}

#[async_trait]
impl TaskHandler for EchoHandler {
    async fn handle_task(&self, _ctx: &TaskContext, task: &taskmesh_shared::model::Task) -> Result<Json, String> {
        Ok(json!({ "status": "completed", "result": task.name.clone() }))
    }
    fn capabilities(&self) -> Vec<String> {
        vec![self.capability.clone()]
    }
    fn name(&self) -> String {
        format!("echo-{}", self.capability)
    }
}

#[tokio::test]
async fn c_waits_for_both_a_and_b() {
    let raw_plan = json!({
        "subtasks": [
            {"name": "A", "assigned_to": "research", "dependencies": [], "priority": 5, "input": "a"},
            {"name": "B", "assigned_to": "data_analysis", "dependencies": [], "priority": 5, "input": "b"},
            {"name": "C", "assigned_to": "content_creation", "dependencies": ["A", "B"], "priority": 5, "input": "c"}
        ]
    })
    .to_string();

    let protocol: SharedProtocol = Arc::new(InMemoryProtocol::new(SecurityPolicy::default(), 64));
    let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new());
    let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::default()));
    pool.start();

    for capability in ["research", "data_analysis", "content_creation"] {
        let handler: Arc<dyn TaskHandler> = Arc::new(EchoHandler { capability: capability.to_string() });
        let metadata = AgentMetadata::new(String::new(), AgentRole::Worker, handler.capabilities());
        let id = pool.add_worker(metadata).unwrap();
        let agent = Arc::new(WorkerAgent::new(id, protocol.clone(), handler).with_poll_interval(Duration::from_millis(20)));
        agent.start().await.unwrap();
    }

    let orchestrator = Orchestrator::new(
        "orchestrator-s2",
        ledger.clone(),
        protocol.clone(),
        pool.clone(),
        build_balancer(&LoadBalancerConfig::default()),
        Arc::new(ScriptedReasoningService::new(vec![raw_plan])),
        OrchestratorConfig {
            max_concurrent_tasks: 5,
            ..OrchestratorConfig::default()
        },
    );

    let request = PlanRequest {
        name: "Fanout".to_string(),
        description: String::new(),
        task_type: "research".to_string(),
        input: json!("start"),
    };
    let result = orchestrator.execute_task(request, CancellationToken::new()).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.outputs.get("A").and_then(|v| v.get("result")).cloned(), Some(json!("A")));
    assert_eq!(result.outputs.get("B").and_then(|v| v.get("result")).cloned(), Some(json!("B")));
    assert_eq!(result.outputs.get("C").and_then(|v| v.get("result")).cloned(), Some(json!("C")));

    let tasks = ledger.list_tasks(&Default::default()).await.unwrap();
    let c = tasks.iter().find(|t| t.name == "C").unwrap();
    assert_eq!(c.status, TaskStatus::Completed);
    assert!(!c.dependencies.is_empty());
}
