//! S3: a handler that fails twice then succeeds must complete once
//! bounded retries catch up with it, leaving two failure progress
//! entries ahead of the final success.

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
struct FlakyHandler {
    invocations: AtomicU32,
}

#[async_trait]
impl TaskHandler for FlakyHandler {
    async fn handle_task(&self, _ctx: &TaskContext, task: &Task) -> Result<Json, String> {
        let count = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        if count < 3 {
            Err(format!("transient failure #{count}"))
        } else {
            Ok(json!({ "status": "completed", "result": format!("Mock result for {}", task.name) }))
        }
    }
    fn capabilities(&self) -> Vec<String> {
        vec!["code_generation".to_string()]
    }
    fn name(&self) -> String {
        "flaky".to_string()
    }
}

#[tokio::test]
async fn third_attempt_succeeds_after_two_failures() {
    let raw_plan = json!({
        "subtasks": [{"name": "Simple", "assigned_to": "code_generation", "dependencies": [], "priority": 5, "input": "x"}]
    })
    .to_string();

    let protocol: SharedProtocol = Arc::new(InMemoryProtocol::new(SecurityPolicy::default(), 64));
    let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new());
    let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::default()));
    pool.start();

    let handler = Arc::new(FlakyHandler { invocations: AtomicU32::new(0) });
    let metadata = AgentMetadata::new(String::new(), AgentRole::Worker, handler.capabilities());
    let worker_id = pool.add_worker(metadata).unwrap();
    let agent = Arc::new(WorkerAgent::new(worker_id, protocol.clone(), handler.clone() as Arc<dyn TaskHandler>).with_poll_interval(Duration::from_millis(20)));
    agent.start().await.unwrap();

    let orchestrator = Orchestrator::new(
        "orchestrator-s3",
        ledger.clone(),
        protocol.clone(),
        pool.clone(),
        build_balancer(&LoadBalancerConfig::default()),
        Arc::new(ScriptedReasoningService::new(vec![raw_plan])),
        OrchestratorConfig {
            max_retries: 3,
            retry_delay: Duration::from_millis(20),
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

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(handler.invocations.load(Ordering::SeqCst), 3);

    let tasks = ledger.list_tasks(&Default::default()).await.unwrap();
    let task = tasks.iter().find(|t| t.name == "Simple").unwrap();
    assert_eq!(task.status, TaskStatus::Completed);

    let progress = ledger.get_progress(task.id).await.unwrap();
    let failures = progress.iter().filter(|p| p.status == TaskStatus::Failed).count();
    assert_eq!(failures, 2);
}
