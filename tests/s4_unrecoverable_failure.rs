//! S4: a handler that always errors must exhaust retries and surface
//! as a failed result, not a completed one, with replanning disabled so
//! the failure is final after the configured retry budget.

use std::sync::atomic::{AtomicU32, Ordering};
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
use taskmesh_shared::model::{AgentMetadata, AgentRole, SecurityPolicy, Task, TaskStatus};
use taskmesh_worker::{TaskContext, TaskHandler, WorkerAgent};

#[derive(Debug)]
struct AlwaysFailingHandler {
    invocations: AtomicU32,
}

#[async_trait]
impl TaskHandler for AlwaysFailingHandler {
    async fn handle_task(&self, _ctx: &TaskContext, _task: &Task) -> Result<Json, String> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Err("handler always fails".to_string())
    }
    fn capabilities(&self) -> Vec<String> {
        vec!["code_generation".to_string()]
    }
    fn name(&self) -> String {
        "always-failing".to_string()
    }
}

#[tokio::test]
async fn exhausted_retries_surface_as_failed() {
    let raw_plan = json!({
        "subtasks": [{"name": "Simple", "assigned_to": "code_generation", "dependencies": [], "priority": 5, "input": "x"}]
    })
    .to_string();

    let protocol: SharedProtocol = Arc::new(InMemoryProtocol::new(SecurityPolicy::default(), 64));
    let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new());
    let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::default()));
    pool.start();

    let handler = Arc::new(AlwaysFailingHandler { invocations: AtomicU32::new(0) });
    let metadata = AgentMetadata::new(String::new(), AgentRole::Worker, handler.capabilities());
    let worker_id = pool.add_worker(metadata).unwrap();
    let agent = Arc::new(WorkerAgent::new(worker_id, protocol.clone(), handler.clone() as Arc<dyn TaskHandler>).with_poll_interval(Duration::from_millis(20)));
    agent.start().await.unwrap();

    let orchestrator = Orchestrator::new(
        "orchestrator-s4",
        ledger.clone(),
        protocol.clone(),
        pool.clone(),
        build_balancer(&LoadBalancerConfig::default()),
        Arc::new(ScriptedReasoningService::new(vec![raw_plan])),
        OrchestratorConfig {
            max_retries: 3,
            retry_delay: Duration::from_millis(20),
            enable_replanning: false,
            ..OrchestratorConfig::default()
        },
    );

    let request = PlanRequest {
        name: "Simple".to_string(),
        description: String::new(),
        task_type: "code_generation".to_string(),
        input: json!("x"),
    };
    let result = orchestrator.execute_task(request, CancellationToken::new()).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.error.is_some());
    assert_eq!(handler.invocations.load(Ordering::SeqCst), 4);

    let tasks = ledger.list_tasks(&Default::default()).await.unwrap();
    let task = tasks.iter().find(|t| t.name == "Simple").unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(!result.outputs.contains_key("Simple"));
}
