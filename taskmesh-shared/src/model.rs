//! Core data model shared by every taskmesh component.
//!
//! These types cross process boundaries (wire-encoded by the protocol
//! backends, persisted by the ledger) so every type here is
//! `Serialize`/`Deserialize` and carries no backend-specific state.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

/// Opaque key-value bag attached to messages, tasks, and agents.
///
/// Modeled as a JSON object rather than `HashMap<String, String>` because
/// callers (planners, worker handlers) need to round-trip structured
/// values, not just strings.
pub type Metadata = HashMap<String, Json>;

/// Message envelope type, per the wire protocol in spec §3/§6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Request,
    Response,
    Event,
    Task,
    Query,
    Inform,
    Delegate,
    Result,
    Error,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Event => "event",
            Self::Task => "task",
            Self::Query => "query",
            Self::Inform => "inform",
            Self::Delegate => "delegate",
            Self::Result => "result",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// A message exchanged between agents over a [`Protocol`](../taskmesh_protocol) backend.
///
/// `id` is assigned by the sender if empty at construction time and must be
/// set before the message leaves the process (spec §3 invariant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub from: String,
    /// Empty string means broadcast to `metadata["group_id"]` recipients.
    pub to: String,
    pub in_reply_to: Option<String>,
    pub content: Json,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Construct a message, auto-assigning `id` via UUIDv7 if absent.
    pub fn new(message_type: MessageType, from: impl Into<String>, to: impl Into<String>, content: Json) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            message_type,
            from: from.into(),
            to: to.into(),
            in_reply_to: None,
            content,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    /// Build a reply correlated to `self` via `in_reply_to`.
    pub fn reply(&self, message_type: MessageType, from: impl Into<String>, content: Json) -> Self {
        let mut msg = Self::new(message_type, from, self.from.clone(), content);
        msg.in_reply_to = Some(self.id.clone());
        msg
    }

    pub fn is_broadcast(&self) -> bool {
        self.to.is_empty()
    }
}

/// Role an agent plays in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Orchestrator,
    Worker,
    Specialist,
    Monitor,
}

/// Lifecycle status of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
    Waiting,
    Failed,
    Offline,
}

/// Registration record for an agent participating in the mesh.
///
/// Shared read-only once registered; only the owning worker/pool mutates
/// `status` (spec §3 ownership rule).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub agent_id: String,
    pub role: AgentRole,
    pub capabilities: HashSet<String>,
    pub group_id: Option<String>,
    pub priority: i32,
    pub status: AgentStatus,
    #[serde(default)]
    pub custom_data: Metadata,
}

impl AgentMetadata {
    pub fn new(agent_id: impl Into<String>, role: AgentRole, capabilities: impl IntoIterator<Item = String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            role,
            capabilities: capabilities.into_iter().collect(),
            group_id: None,
            priority: 0,
            status: AgentStatus::Idle,
            custom_data: Metadata::new(),
        }
    }

    /// `task_type` is satisfied if the exact capability is present or the
    /// agent advertises the `"general"` wildcard capability (spec §4.6).
    pub fn can_handle(&self, task_type: &str) -> bool {
        self.capabilities.contains(task_type) || self.capabilities.contains("general")
    }
}

/// Task priority, with the fixed integer mapping from spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl TaskPriority {
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Low => 1,
            Self::Normal => 5,
            Self::High => 8,
            Self::Critical => 10,
        }
    }

    /// Parse the nearest defined priority band, or `None` outside [1, 10].
    pub fn try_from_i32(value: i32) -> Option<Self> {
        match value {
            1..=4 => Some(Self::Low),
            5..=7 => Some(Self::Normal),
            8..=9 => Some(Self::High),
            10 => Some(Self::Critical),
            _ => None,
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Task lifecycle status (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal monotonic transition.
    ///
    /// The only forbidden backward edge named in spec §3 is
    /// `assigned -> pending`; terminal states never transition further.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        !(self == TaskStatus::Assigned && next == TaskStatus::Pending)
    }
}

/// A unit of work, created by the orchestrator and mutated only by the
/// orchestrator and its assigned worker (via result messages applied by
/// the orchestrator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Doubles as the capability required of the assigned worker.
    #[serde(rename = "type")]
    pub task_type: String,
    pub priority: TaskPriority,
    pub assigned_to: Option<String>,
    pub created_by: String,
    pub dependencies: Vec<Uuid>,
    pub input: Json,
    pub output: Option<Json>,
    pub status: TaskStatus,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(name: impl Into<String>, task_type: impl Into<String>, created_by: impl Into<String>, input: Json) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: String::new(),
            task_type: task_type.into(),
            priority: TaskPriority::Normal,
            assigned_to: None,
            created_by: created_by.into(),
            dependencies: Vec::new(),
            input,
            output: None,
            status: TaskStatus::Pending,
            error: None,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// True once every dependency id is present in `completed`.
    pub fn is_ready(&self, completed: &HashSet<Uuid>) -> bool {
        self.dependencies.iter().all(|dep| completed.contains(dep))
    }
}

/// Append-only progress entry recorded against a task (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub task_id: Uuid,
    pub agent_id: String,
    pub status: TaskStatus,
    pub message: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub recorded_at: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn new(task_id: Uuid, agent_id: impl Into<String>, status: TaskStatus, message: impl Into<String>) -> Self {
        Self {
            task_id,
            agent_id: agent_id.into(),
            status,
            message: message.into(),
            metadata: Metadata::new(),
            recorded_at: Utc::now(),
        }
    }
}

/// Access-control and rate-limit policy enforced uniformly by every
/// protocol backend (spec §4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    pub require_authentication: bool,
    pub require_encryption: bool,
    pub allowed_agents: HashSet<String>,
    pub denied_agents: HashSet<String>,
    pub max_message_size: usize,
    pub rate_limit_per_second: u32,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            require_authentication: false,
            require_encryption: false,
            allowed_agents: HashSet::new(),
            denied_agents: HashSet::new(),
            max_message_size: 1024 * 1024,
            rate_limit_per_second: 0,
        }
    }
}

impl SecurityPolicy {
    /// `Ok(())` if `agent_id` may send/receive under this policy.
    pub fn check_agent(&self, agent_id: &str) -> Result<(), String> {
        if self.denied_agents.contains(agent_id) {
            return Err(format!("agent '{agent_id}' is denied by security policy"));
        }
        if !self.allowed_agents.is_empty() && !self.allowed_agents.contains(agent_id) {
            return Err(format!("agent '{agent_id}' is not in the allow-list"));
        }
        Ok(())
    }

    pub fn check_size(&self, size: usize) -> Result<(), String> {
        if size > self.max_message_size {
            return Err(format!(
                "message size {size} exceeds max_message_size {}",
                self.max_message_size
            ));
        }
        Ok(())
    }
}

/// Rolling counters + EMA latency for a protocol backend instance (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolMetrics {
    pub sent: u64,
    pub received: u64,
    pub failed: u64,
    /// Exponential moving average latency, alpha = 0.2 (spec §3).
    pub avg_latency_ms: f64,
    pub last_updated: DateTime<Utc>,
}

impl ProtocolMetrics {
    const ALPHA: f64 = 0.2;

    pub fn record_sent(&mut self, latency_ms: f64) {
        self.sent += 1;
        self.observe_latency(latency_ms);
    }

    pub fn record_received(&mut self) {
        self.received += 1;
        self.last_updated = Utc::now();
    }

    pub fn record_failed(&mut self) {
        self.failed += 1;
        self.last_updated = Utc::now();
    }

    fn observe_latency(&mut self, latency_ms: f64) {
        self.avg_latency_ms = if self.sent <= 1 {
            latency_ms
        } else {
            Self::ALPHA * latency_ms + (1.0 - Self::ALPHA) * self.avg_latency_ms
        };
        self.last_updated = Utc::now();
    }
}

impl Default for ProtocolMetrics {
    fn default() -> Self {
        Self {
            sent: 0,
            received: 0,
            failed: 0,
            avg_latency_ms: 0.0,
            last_updated: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_reply_correlates_via_in_reply_to() {
        let task_msg = Message::new(MessageType::Task, "orchestrator", "worker-1", Json::Null);
        let result = task_msg.reply(MessageType::Result, "worker-1", Json::Null);
        assert_eq!(result.in_reply_to, Some(task_msg.id));
        assert_eq!(result.to, "orchestrator");
    }

    #[test]
    fn task_status_forbids_assigned_to_pending() {
        assert!(!TaskStatus::Assigned.can_transition_to(TaskStatus::Pending));
        assert!(TaskStatus::Assigned.can_transition_to(TaskStatus::InProgress));
    }

    #[test]
    fn task_status_terminal_states_are_final() {
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn priority_round_trips_canonical_values() {
        assert_eq!(TaskPriority::Low.as_i32(), 1);
        assert_eq!(TaskPriority::Normal.as_i32(), 5);
        assert_eq!(TaskPriority::High.as_i32(), 8);
        assert_eq!(TaskPriority::Critical.as_i32(), 10);
        assert_eq!(TaskPriority::try_from_i32(10), Some(TaskPriority::Critical));
        assert_eq!(TaskPriority::try_from_i32(0), None);
    }

    #[test]
    fn agent_can_handle_via_general_capability() {
        let agent = AgentMetadata::new("a1", AgentRole::Worker, ["general".to_string()]);
        assert!(agent.can_handle("anything"));
    }

    #[test]
    fn security_policy_rejects_denied_agent() {
        let mut policy = SecurityPolicy::default();
        policy.denied_agents.insert("bad-actor".into());
        assert!(policy.check_agent("bad-actor").is_err());
        assert!(policy.check_agent("good-actor").is_ok());
    }

    #[test]
    fn protocol_metrics_ema_latency() {
        let mut metrics = ProtocolMetrics::default();
        metrics.record_sent(100.0);
        assert_eq!(metrics.avg_latency_ms, 100.0);
        metrics.record_sent(200.0);
        // 0.2*200 + 0.8*100 = 120
        assert!((metrics.avg_latency_ms - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn task_is_ready_checks_all_dependencies() {
        let mut task = Task::new("t", "type", "creator", Json::Null);
        let dep = Uuid::now_v7();
        task.dependencies.push(dep);
        let mut completed = HashSet::new();
        assert!(!task.is_ready(&completed));
        completed.insert(dep);
        assert!(task.is_ready(&completed));
    }
}
