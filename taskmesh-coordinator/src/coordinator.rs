//! `Coordinator` (spec C9 / §4.9): the top-level façade wiring protocol,
//! ledger, pool, and orchestrator, and exposing the operations external
//! callers use instead of reaching into any one component directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use taskmesh_ledger::Ledger;
use taskmesh_orchestrator::{ExecutionResult, Orchestrator, PlanRequest, ReasoningService};
use taskmesh_pool::{build_balancer, WorkerPool, WorkerPoolConfig};
use taskmesh_protocol::SharedProtocol;
use taskmesh_shared::config::TaskMeshConfig;
use taskmesh_shared::model::{AgentMetadata, AgentRole, Message, MessageType, TaskPriority};
use taskmesh_worker::{SharedTaskHandler, WorkerAgent};

use crate::default_handler::DefaultTaskHandler;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::health::{ComponentHealth, HealthReport};
use crate::stats::MonitoringStats;

/// Capabilities `Initialize` wires a default worker for (spec §4.9).
pub const DEFAULT_CAPABILITIES: [&str; 5] = ["code_generation", "data_analysis", "research", "content_creation", "review/qa"];

#[derive(Debug, Clone)]
pub struct ExecuteTaskRequest {
    pub name: String,
    pub description: String,
    pub task_type: String,
    pub priority: TaskPriority,
    pub input: Json,
}

pub struct Coordinator {
    id: String,
    protocol: SharedProtocol,
    ledger: Arc<dyn Ledger>,
    pool: Arc<WorkerPool>,
    orchestrator: Orchestrator,
    max_workers: usize,
    /// Agents this coordinator itself spawned (default pool + custom
    /// workers) and therefore owns the lifecycle of. Workers registered
    /// via `register_worker` describe an externally-owned process and are
    /// metadata-only (spec §4.9 "Registration writes only metadata").
    owned_agents: StdMutex<HashMap<String, Arc<WorkerAgent>>>,
    cancellation: CancellationToken,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator").field("id", &self.id).finish()
    }
}

impl Coordinator {
    /// Wires a fresh pool, registers the default capability set with
    /// [`DefaultTaskHandler`], and returns the ready-to-use façade.
    pub async fn initialize(
        id: impl Into<String>,
        config: TaskMeshConfig,
        protocol: SharedProtocol,
        ledger: Arc<dyn Ledger>,
        reasoning: Arc<dyn ReasoningService>,
        max_workers: usize,
    ) -> CoordinatorResult<Self> {
        let id = id.into();
        let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::default()));
        pool.start();

        let balancer = build_balancer(&config.balancer);
        let orchestrator = Orchestrator::new(
            format!("{id}-orchestrator"),
            Arc::clone(&ledger),
            Arc::clone(&protocol),
            Arc::clone(&pool),
            balancer,
            reasoning,
            config.orchestrator.clone(),
        );

        let coordinator = Self {
            id,
            protocol,
            ledger,
            pool,
            orchestrator,
            max_workers,
            owned_agents: StdMutex::new(HashMap::new()),
            cancellation: CancellationToken::new(),
        };

        for capability in DEFAULT_CAPABILITIES {
            coordinator.create_custom_worker(Arc::new(DefaultTaskHandler::new(capability))).await?;
        }
        Ok(coordinator)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn assert_worker_capacity(&self) -> CoordinatorResult<()> {
        if self.pool.get_worker_count() >= self.max_workers {
            return Err(CoordinatorError::MaxWorkersExceeded(self.max_workers));
        }
        Ok(())
    }

    /// Registers metadata for an externally-owned worker; the coordinator
    /// does not spawn or supervise a process for it (spec §4.9/§9:
    /// "Registration writes only metadata into the orchestrator's worker
    /// index").
    pub fn register_worker(&self, metadata: AgentMetadata) -> CoordinatorResult<String> {
        self.assert_worker_capacity()?;
        Ok(self.pool.add_worker(metadata)?)
    }

    /// Unregisters a worker. Stops and drops the agent task first if this
    /// coordinator owns it (i.e. it was created via
    /// [`Self::create_custom_worker`] or the default pool).
    pub fn unregister_worker(&self, id: &str) -> CoordinatorResult<()> {
        if let Some(agent) = self.owned_agents.lock().expect("owned_agents lock poisoned").remove(id) {
            agent.stop();
        }
        Ok(self.pool.remove_worker(id)?)
    }

    /// Spawns an in-process [`WorkerAgent`] around `handler`, registers it
    /// in the pool under its reported capabilities, and starts its poll
    /// loop. The coordinator owns this agent's lifecycle.
    pub async fn create_custom_worker(&self, handler: SharedTaskHandler) -> CoordinatorResult<String> {
        self.assert_worker_capacity()?;
        let metadata = AgentMetadata::new(String::new(), AgentRole::Worker, handler.capabilities());
        let agent_id = self.pool.add_worker(metadata)?;

        let agent = Arc::new(WorkerAgent::new(agent_id.clone(), Arc::clone(&self.protocol), handler));
        agent.start().await?;
        self.owned_agents.lock().expect("owned_agents lock poisoned").insert(agent_id.clone(), agent);
        Ok(agent_id)
    }

    pub fn register_group(&self, group_id: &str, members: Vec<String>) {
        self.protocol.register_group(group_id, members);
    }

    pub async fn broadcast_to_group(&self, content: Json, group_id: &str) -> CoordinatorResult<()> {
        let message = Message::new(MessageType::Event, &self.id, String::new(), content);
        self.protocol.broadcast(message, group_id).await?;
        Ok(())
    }

    pub async fn get_monitoring_stats(&self, pending_tasks: u64) -> CoordinatorResult<MonitoringStats> {
        Ok(MonitoringStats {
            pool: self.pool.get_stats(pending_tasks),
            protocol: self.protocol.metrics(),
            ledger: self.ledger.stats().await?,
        })
    }

    /// Unhealthy if a required component is missing or reports its own
    /// failure; degraded if the pool has zero workers; healthy otherwise
    /// (spec §4.9).
    pub async fn health_check(&self) -> HealthReport {
        let mut components = vec![ComponentHealth::healthy("protocol")];

        components.push(match self.ledger.health().await {
            Ok(true) => ComponentHealth::healthy("ledger"),
            Ok(false) => ComponentHealth::unhealthy("ledger", "ledger reported itself unhealthy"),
            Err(err) => ComponentHealth::unhealthy("ledger", err.to_string()),
        });

        let worker_count = self.pool.get_worker_count();
        components.push(if worker_count == 0 {
            ComponentHealth::degraded("pool", "no workers registered")
        } else {
            ComponentHealth::healthy("pool")
        });

        components.push(ComponentHealth::healthy("orchestrator"));

        HealthReport::from_components(components)
    }

    /// Stops every coordinator-owned worker, the pool's heartbeat
    /// supervisor, and closes the ledger. Cancels any in-flight
    /// `execute_task` calls.
    pub async fn shutdown(&self) -> CoordinatorResult<()> {
        self.cancellation.cancel();
        for (_, agent) in self.owned_agents.lock().expect("owned_agents lock poisoned").drain() {
            agent.stop();
        }
        self.pool.stop();
        self.ledger.close().await?;
        Ok(())
    }

    /// Runs one request to completion under the tracing span spec §4.9
    /// names (`multiagent.task.<type>`, carried as a fixed span name with
    /// a `task_type` field since span names must be `'static` literals).
    #[instrument(
        name = "multiagent.task",
        skip(self, request),
        fields(task_id = tracing::field::Empty, name = %request.name, task_type = %request.task_type, priority = request.priority.as_i32())
    )]
    pub async fn execute_task(&self, request: ExecuteTaskRequest) -> CoordinatorResult<ExecutionResult> {
        let task_id = Uuid::now_v7();
        tracing::Span::current().record("task_id", tracing::field::display(task_id));

        let plan_request = PlanRequest {
            name: request.name,
            description: request.description,
            task_type: request.task_type,
            input: request.input,
        };
        Ok(self.orchestrator.execute_task(plan_request, self.cancellation.child_token()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskmesh_ledger::InMemoryLedger;
    use taskmesh_orchestrator::{ExecutionStatus, ScriptedReasoningService};
    use taskmesh_protocol::InMemoryProtocol;
    use taskmesh_shared::model::SecurityPolicy;

    async fn fresh_coordinator(max_workers: usize, scripted_responses: Vec<String>) -> Coordinator {
        let protocol: SharedProtocol = Arc::new(InMemoryProtocol::new(SecurityPolicy::default(), 64));
        let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new());
        let reasoning = Arc::new(ScriptedReasoningService::new(scripted_responses));
        Coordinator::initialize("coordinator-1", TaskMeshConfig::default(), protocol, ledger, reasoning, max_workers)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn initialize_registers_the_default_capability_set() {
        let coordinator = fresh_coordinator(32, vec![]).await;
        assert_eq!(coordinator.pool.get_worker_count(), DEFAULT_CAPABILITIES.len());
        for capability in DEFAULT_CAPABILITIES {
            assert_eq!(coordinator.pool.get_workers_by_capability(capability).len(), 1);
        }
    }

    #[tokio::test]
    async fn health_check_is_healthy_once_workers_are_registered() {
        let coordinator = fresh_coordinator(32, vec![]).await;
        let report = coordinator.health_check().await;
        assert_eq!(report.overall, crate::health::HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn health_check_is_degraded_with_no_workers() {
        let coordinator = fresh_coordinator(32, vec![]).await;
        for id in coordinator.pool.get_all_workers().into_iter().map(|w| w.metadata.agent_id) {
            coordinator.unregister_worker(&id).unwrap();
        }
        let report = coordinator.health_check().await;
        assert_eq!(report.overall, crate::health::HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn create_custom_worker_respects_max_workers() {
        let coordinator = fresh_coordinator(DEFAULT_CAPABILITIES.len(), vec![]).await;
        let err = coordinator.create_custom_worker(Arc::new(DefaultTaskHandler::new("extra"))).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::MaxWorkersExceeded(_)));
    }

    #[tokio::test]
    async fn execute_task_single_step_completes_via_default_worker() {
        let raw_plan = json!({
            "subtasks": [{"name": "Simple", "assigned_to": "code_generation", "dependencies": [], "priority": 5, "input": "x"}]
        })
        .to_string();
        let coordinator = fresh_coordinator(32, vec![raw_plan]).await;

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
    }
}
