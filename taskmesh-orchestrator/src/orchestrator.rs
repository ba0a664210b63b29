//! `Orchestrator` (spec C8 / §4.8): `received -> planning -> dispatching
//! <-> collecting -> (succeeded | failed | replanning -> dispatching)`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use taskmesh_ledger::Ledger;
use taskmesh_pool::{LoadBalancer, WorkerPool};
use taskmesh_protocol::SharedProtocol;
use taskmesh_shared::config::orchestrator::OrchestratorConfig;
use taskmesh_shared::model::{AgentStatus, Message, MessageType, ProgressUpdate, Task, TaskPriority, TaskStatus};

use crate::dag::Dag;
use crate::error::OrchestratorResult;
use crate::plan::{Plan, PlanRequest, SubtaskSpec};

pub type SharedLedger = Arc<dyn Ledger>;

/// Poll cadence for the dispatch/collect loop.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    /// Mapping from subtask name to its output (spec §4.8 Termination).
    pub outputs: HashMap<String, Json>,
    pub error: Option<String>,
}

struct DispatchRecord {
    task_type: String,
    worker_id: String,
    dispatched_at: Instant,
}

pub struct Orchestrator {
    id: String,
    ledger: SharedLedger,
    protocol: SharedProtocol,
    pool: Arc<WorkerPool>,
    balancer: Box<dyn LoadBalancer>,
    reasoning: Arc<dyn crate::reasoning::ReasoningService>,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").field("id", &self.id).finish()
    }
}

impl Orchestrator {
    pub fn new(
        id: impl Into<String>,
        ledger: SharedLedger,
        protocol: SharedProtocol,
        pool: Arc<WorkerPool>,
        balancer: Box<dyn LoadBalancer>,
        reasoning: Arc<dyn crate::reasoning::ReasoningService>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            id: id.into(),
            ledger,
            protocol,
            pool,
            balancer,
            reasoning,
            config,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn known_capabilities(&self) -> HashSet<String> {
        self.pool
            .get_all_workers()
            .into_iter()
            .flat_map(|w| w.metadata.capabilities.into_iter())
            .collect()
    }

    async fn plan(&self, request: &PlanRequest, replan_context: Option<&str>) -> Plan {
        let capabilities = self.known_capabilities();
        let worker_listing: Vec<String> = self
            .pool
            .get_all_workers()
            .into_iter()
            .map(|w| format!("{} ({:?})", w.metadata.agent_id, w.metadata.capabilities))
            .collect();

        let system_prompt = "You plan multi-agent task execution. Respond with strict JSON: \
            {\"subtasks\":[{\"name\":str,\"description\":str,\"assigned_to\":capability,\"dependencies\":[str],\"priority\":1-10,\"input\":any}]}";
        let mut user_prompt = format!(
            "Task: {} ({})\nDescription: {}\nKnown capabilities: {:?}\nRegistered workers: {:?}",
            request.name, request.task_type, request.description, capabilities, worker_listing
        );
        if let Some(ctx) = replan_context {
            user_prompt.push_str(&format!("\nReplanning after failure: {ctx}"));
        }

        let raw = self.reasoning.complete(system_prompt, &user_prompt).await.unwrap_or_default();
        crate::plan::parse_plan_response(&raw, &capabilities, request)
    }

    fn materialize(&self, plan: &Plan, skip_names: &HashSet<String>) -> (Vec<Task>, Dag) {
        let mut dag = Dag::new();
        let fresh: Vec<&SubtaskSpec> = plan.subtasks.iter().filter(|s| !skip_names.contains(&s.name)).collect();
        for spec in &fresh {
            dag.register(&spec.name, Uuid::now_v7());
        }

        let now = chrono::Utc::now();
        let tasks = fresh
            .iter()
            .map(|spec| Task {
                id: dag.id_of(&spec.name).expect("just registered"),
                name: spec.name.clone(),
                description: spec.description.clone(),
                task_type: spec.assigned_to.clone(),
                priority: TaskPriority::try_from_i32(spec.priority).unwrap_or_default(),
                assigned_to: None,
                created_by: self.id.clone(),
                dependencies: dag.resolve_dependencies(&spec.dependencies),
                input: spec.input.clone(),
                output: None,
                status: TaskStatus::Pending,
                error: None,
                metadata: Default::default(),
                created_at: now,
                updated_at: now,
                completed_at: None,
            })
            .collect();
        (tasks, dag)
    }

    /// Runs a request through Plan/Dispatch/Collect/Retry/Replan to
    /// completion, cancellation, or unrecoverable failure.
    ///
    /// The caller (the coordinator façade) is expected to wrap this call
    /// in the per-request tracing span; this method only logs within it.
    pub async fn execute_task(&self, request: PlanRequest, cancellation: CancellationToken) -> OrchestratorResult<ExecutionResult> {
        self.protocol.subscribe(&self.id, vec![MessageType::Result, MessageType::Error]).await?;

        let plan = self.plan(&request, None).await;
        let (mut tasks, _dag) = self.materialize(&plan, &HashSet::new());
        for task in &tasks {
            self.ledger.create_task(task.clone()).await?;
        }

        let mut completed: HashSet<Uuid> = HashSet::new();
        let mut outputs: HashMap<String, Json> = HashMap::new();
        let mut in_flight: HashMap<Uuid, DispatchRecord> = HashMap::new();
        let mut attempts: HashMap<Uuid, u32> = HashMap::new();
        let mut retry_after: HashMap<Uuid, Instant> = HashMap::new();
        let mut replanned = false;
        let mut fatal_error: Option<String> = None;

        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            if tasks.iter().all(|t| completed.contains(&t.id)) {
                break;
            }
            if let Some(err) = &fatal_error {
                warn!(error = %err, "orchestrator aborting request after unrecoverable failure");
                break;
            }

            tokio::select! {
                _ = cancellation.cancelled() => {
                    self.cancel_remaining(&tasks, &completed).await;
                    return Ok(ExecutionResult { status: ExecutionStatus::Cancelled, outputs, error: Some("request cancelled".to_string()) });
                }
                _ = ticker.tick() => {
                    self.expire_timeouts(
                        &mut in_flight,
                        &mut attempts,
                        &mut retry_after,
                        &mut tasks,
                        &completed,
                        &mut replanned,
                        &request,
                        &mut fatal_error,
                    ).await?;

                    let mut unavailable: HashSet<Uuid> = in_flight.keys().copied().collect();
                    let now = Instant::now();
                    unavailable.extend(retry_after.iter().filter(|(_, at)| **at > now).map(|(id, _)| *id));

                    let ready: Vec<Uuid> = Dag::ready_tasks(&tasks, &completed, &unavailable).into_iter().map(|t| t.id).collect();
                    let capacity = self.config.max_concurrent_tasks.saturating_sub(in_flight.len());
                    for id in ready.into_iter().take(capacity) {
                        let task = tasks.iter().find(|t| t.id == id).expect("id came from tasks").clone();
                        self.dispatch(&task, &mut in_flight).await?;
                    }

                    let messages = self.protocol.receive(&self.id).await?;
                    for message in messages {
                        self.handle_reply(
                            message,
                            &mut tasks,
                            &mut completed,
                            &mut outputs,
                            &mut in_flight,
                            &mut attempts,
                            &mut retry_after,
                            &mut replanned,
                            &request,
                            &mut fatal_error,
                        ).await?;
                    }

                    if in_flight.is_empty()
                        && retry_after.is_empty()
                        && tasks.iter().any(|t| !completed.contains(&t.id))
                        && Dag::ready_tasks(&tasks, &completed, &in_flight.keys().copied().collect()).is_empty()
                    {
                        fatal_error = Some("dispatch stalled: no ready subtasks and none in flight".to_string());
                    }
                }
            }
        }

        if let Some(error) = fatal_error {
            return Ok(ExecutionResult { status: ExecutionStatus::Failed, outputs, error: Some(error) });
        }
        info!(task_name = %request.name, "request completed");
        Ok(ExecutionResult { status: ExecutionStatus::Completed, outputs, error: None })
    }

    async fn dispatch(&self, task: &Task, in_flight: &mut HashMap<Uuid, DispatchRecord>) -> OrchestratorResult<()> {
        let candidates = self.pool.get_all_workers();
        let worker_id = match self.balancer.select_worker(&task.task_type, &candidates).await {
            Ok(id) => id,
            Err(_) => return Ok(()), // no eligible worker this tick; retried next tick
        };

        self.pool.update_worker_status(&worker_id, AgentStatus::Busy)?;

        let mut assigned = task.clone();
        assigned.assigned_to = Some(worker_id.clone());
        assigned.status = TaskStatus::Assigned;
        let assigned = self.ledger.update_task(assigned).await?;

        let mut message = Message::new(MessageType::Task, &self.id, &worker_id, serde_json::to_value(&assigned).unwrap_or(Json::Null));
        message.id = assigned.id.to_string();
        self.protocol.send(message).await?;

        in_flight.insert(
            assigned.id,
            DispatchRecord {
                task_type: assigned.task_type.clone(),
                worker_id,
                dispatched_at: Instant::now(),
            },
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn expire_timeouts(
        &self,
        in_flight: &mut HashMap<Uuid, DispatchRecord>,
        attempts: &mut HashMap<Uuid, u32>,
        retry_after: &mut HashMap<Uuid, Instant>,
        tasks: &mut Vec<Task>,
        completed: &HashSet<Uuid>,
        replanned: &mut bool,
        request: &PlanRequest,
        fatal_error: &mut Option<String>,
    ) -> OrchestratorResult<()> {
        let timed_out: Vec<Uuid> = in_flight
            .iter()
            .filter(|(_, record)| record.dispatched_at.elapsed() > self.config.task_timeout)
            .map(|(id, _)| *id)
            .collect();
        for id in timed_out {
            if let Some(record) = in_flight.remove(&id) {
                warn!(task_id = %id, worker_id = %record.worker_id, "task timed out");
                let _ = self.pool.update_worker_status(&record.worker_id, AgentStatus::Idle);
                self.record_failure_and_maybe_finalize(
                    id,
                    &record.worker_id,
                    "task timed out".to_string(),
                    attempts,
                    retry_after,
                    tasks,
                    completed,
                    replanned,
                    request,
                    fatal_error,
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Records a failed attempt and either schedules a backoff retry or,
    /// once `max_retries` is exhausted, fails the task for good (spec
    /// §4.8: "surface as failed if retries exhausted"). Shared by the
    /// worker-error and timeout paths so both count against the same
    /// retry budget.
    #[allow(clippy::too_many_arguments)]
    async fn record_failure_and_maybe_finalize(
        &self,
        task_id: Uuid,
        worker_id: &str,
        error_text: String,
        attempts: &mut HashMap<Uuid, u32>,
        retry_after: &mut HashMap<Uuid, Instant>,
        tasks: &mut Vec<Task>,
        completed: &HashSet<Uuid>,
        replanned: &mut bool,
        request: &PlanRequest,
        fatal_error: &mut Option<String>,
    ) -> OrchestratorResult<()> {
        self.ledger
            .record_progress(ProgressUpdate::new(task_id, worker_id, TaskStatus::Failed, error_text.clone()))
            .await?;

        let attempt = *attempts.entry(task_id).and_modify(|a| *a += 1).or_insert(1);
        if attempt <= self.config.max_retries {
            let backoff = self.config.retry_delay * 2u32.pow(attempt.min(16));
            retry_after.insert(task_id, Instant::now() + backoff);
            return Ok(());
        }

        self.ledger.fail_task(task_id, error_text.clone()).await?;
        if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
            task.status = TaskStatus::Failed;
            task.error = Some(error_text.clone());
        }
        if self.config.enable_replanning && !*replanned {
            *replanned = true;
            self.replan(request, &error_text, tasks, completed).await?;
        } else {
            *fatal_error = Some(error_text);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_reply(
        &self,
        message: Message,
        tasks: &mut Vec<Task>,
        completed: &mut HashSet<Uuid>,
        outputs: &mut HashMap<String, Json>,
        in_flight: &mut HashMap<Uuid, DispatchRecord>,
        attempts: &mut HashMap<Uuid, u32>,
        retry_after: &mut HashMap<Uuid, Instant>,
        replanned: &mut bool,
        request: &PlanRequest,
        fatal_error: &mut Option<String>,
    ) -> OrchestratorResult<()> {
        let Some(reply_to) = message.in_reply_to.as_deref().and_then(|s| Uuid::parse_str(s).ok()) else {
            return Ok(());
        };
        let Some(record) = in_flight.remove(&reply_to) else {
            return Ok(());
        };
        let duration = record.dispatched_at.elapsed();

        match message.message_type {
            MessageType::Result => {
                self.ledger.complete_task(reply_to, message.content.clone()).await?;
                let _ = self.pool.update_worker_status(&record.worker_id, AgentStatus::Idle);
                self.balancer.record_result(&record.worker_id, &record.task_type, duration, None).await;
                if let Some(task) = tasks.iter_mut().find(|t| t.id == reply_to) {
                    task.status = TaskStatus::Completed;
                    task.output = Some(message.content.clone());
                    outputs.insert(task.name.clone(), message.content);
                }
                completed.insert(reply_to);
            }
            MessageType::Error => {
                let error_text = message.content.get("error").and_then(|v| v.as_str()).unwrap_or("worker handler error").to_string();
                let _ = self.pool.update_worker_status(&record.worker_id, AgentStatus::Idle);
                self.balancer.record_result(&record.worker_id, &record.task_type, duration, Some(&error_text)).await;
                self.record_failure_and_maybe_finalize(
                    reply_to,
                    &record.worker_id,
                    error_text,
                    attempts,
                    retry_after,
                    tasks,
                    completed,
                    replanned,
                    request,
                    fatal_error,
                )
                .await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn replan(&self, request: &PlanRequest, failure_context: &str, tasks: &mut Vec<Task>, completed: &HashSet<Uuid>) -> OrchestratorResult<()> {
        let completed_names: HashSet<String> = tasks.iter().filter(|t| completed.contains(&t.id)).map(|t| t.name.clone()).collect();
        let new_plan = self.plan(request, Some(failure_context)).await;
        let (new_tasks, _dag) = self.materialize(&new_plan, &completed_names);
        for task in &new_tasks {
            self.ledger.create_task(task.clone()).await?;
        }
        tasks.retain(|t| completed.contains(&t.id));
        tasks.extend(new_tasks);
        info!(task_name = %request.name, "replanned after exhausted retries");
        Ok(())
    }

    async fn cancel_remaining(&self, tasks: &[Task], completed: &HashSet<Uuid>) {
        for task in tasks.iter().filter(|t| !completed.contains(&t.id)) {
            let mut cancelled = task.clone();
            cancelled.status = TaskStatus::Cancelled;
            cancelled.completed_at = Some(chrono::Utc::now());
            let _ = self.ledger.update_task(cancelled).await;
        }
    }
}
