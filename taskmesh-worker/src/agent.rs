//! `WorkerAgent` (spec C4 / §4.4): the `created -> started -> (idle <->
//! busy) -> stopped` state machine that polls its [`Protocol`] queue and
//! dispatches `task`/`delegate` messages to a [`TaskHandler`].

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use taskmesh_protocol::SharedProtocol;
use taskmesh_shared::model::{Message, MessageType};

use crate::content::normalize_task_content;
use crate::error::WorkerError;
use crate::handler::{SharedTaskHandler, TaskContext};

/// Default poll cadence for non-streaming backends (spec §4.4: "ticks every second").
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Started,
    Idle,
    Busy,
    Stopped,
}

impl WorkerState {
    fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Stopped => "stopped",
        }
    }
}

pub struct WorkerAgent {
    agent_id: String,
    protocol: SharedProtocol,
    handler: SharedTaskHandler,
    state: Mutex<WorkerState>,
    cancellation: CancellationToken,
    poll_interval: Duration,
}

impl fmt::Debug for WorkerAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerAgent")
            .field("agent_id", &self.agent_id)
            .field("state", &self.state())
            .finish()
    }
}

impl WorkerAgent {
    pub fn new(agent_id: impl Into<String>, protocol: SharedProtocol, handler: SharedTaskHandler) -> Self {
        Self {
            agent_id: agent_id.into(),
            protocol,
            handler,
            state: Mutex::new(WorkerState::Created),
            cancellation: CancellationToken::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().expect("worker state lock poisoned")
    }

    fn set_state(&self, next: WorkerState) {
        *self.state.lock().expect("worker state lock poisoned") = next;
    }

    /// Subscribes to `{task, delegate}` and spawns the poll loop. Returns
    /// the loop's join handle; the loop runs until `stop()` is called or
    /// the handle is dropped and the cancellation token fires.
    pub async fn start(self: &Arc<Self>) -> Result<JoinHandle<()>, WorkerError> {
        {
            let mut state = self.state.lock().expect("worker state lock poisoned");
            if *state != WorkerState::Created {
                return Err(WorkerError::InvalidState {
                    operation: "start",
                    state: state.label(),
                });
            }
            *state = WorkerState::Started;
        }

        self.protocol
            .subscribe(&self.agent_id, vec![MessageType::Task, MessageType::Delegate])
            .await?;
        self.set_state(WorkerState::Idle);

        let agent = Arc::clone(self);
        let handle = tokio::spawn(async move { agent.poll_loop().await });
        Ok(handle)
    }

    /// Signals the poll loop to exit and marks the agent stopped. Idempotent.
    pub fn stop(&self) {
        self.cancellation.cancel();
        self.set_state(WorkerState::Stopped);
    }

    async fn poll_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = self.cancellation.cancelled() => {
                    info!(agent_id = %self.agent_id, "worker poll loop cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.drain_once().await {
                        warn!(agent_id = %self.agent_id, error = %err, "poll cycle failed");
                    }
                }
            }
        }
        self.set_state(WorkerState::Stopped);
    }

    async fn drain_once(&self) -> Result<(), WorkerError> {
        let messages = self.protocol.receive(&self.agent_id).await?;
        for message in messages {
            match message.message_type {
                MessageType::Task | MessageType::Delegate => self.handle_task_message(message).await?,
                _ => {}
            }
        }
        Ok(())
    }

    #[instrument(skip(self, message), fields(agent_id = %self.agent_id, capability = ?self.handler.capabilities()))]
    async fn handle_task_message(&self, message: Message) -> Result<(), WorkerError> {
        let task = match normalize_task_content(&message.content) {
            Ok(task) => task,
            Err(reason) => {
                let reply = message.reply(MessageType::Error, &self.agent_id, json!({ "error": reason }));
                self.protocol.send(reply).await?;
                return Ok(());
            }
        };

        self.set_state(WorkerState::Busy);
        let ctx = TaskContext::new(self.cancellation.child_token());
        let outcome = self.handler.handle_task(&ctx, &task).await;
        self.set_state(WorkerState::Idle);

        let reply = match outcome {
            Ok(output) => {
                let mut reply = Message::new(MessageType::Result, &self.agent_id, &message.from, output);
                reply.in_reply_to = Some(task.id.to_string());
                reply
            }
            Err(err) => {
                let mut reply = Message::new(
                    MessageType::Error,
                    &self.agent_id,
                    &message.from,
                    json!({ "error": err }),
                );
                reply.in_reply_to = Some(task.id.to_string());
                reply
            }
        };
        self.protocol.send(reply).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value as Json;
    use std::time::Duration as StdDuration;
    use taskmesh_protocol::InMemoryProtocol;
    use taskmesh_shared::model::{MessageType, SecurityPolicy, Task};

    #[derive(Debug)]
    struct SucceedingHandler;

    #[async_trait]
    impl crate::handler::TaskHandler for SucceedingHandler {
        async fn handle_task(&self, _ctx: &TaskContext, task: &Task) -> Result<Json, String> {
            Ok(json!({ "status": "completed", "result": format!("Mock result for {}", task.name) }))
        }

        fn capabilities(&self) -> Vec<String> {
            vec!["code_generation".to_string()]
        }

        fn name(&self) -> String {
            "succeeding".to_string()
        }
    }

    #[tokio::test]
    async fn worker_processes_task_and_replies_with_result() {
        let protocol: SharedProtocol = Arc::new(InMemoryProtocol::new(SecurityPolicy::default(), 16));
        let agent = Arc::new(WorkerAgent::new("worker-1", Arc::clone(&protocol), Arc::new(SucceedingHandler)));
        let handle = agent.start().await.unwrap();

        let task = Task::new("Simple", "code_generation", "orchestrator", json!("x"));
        let content = serde_json::to_value(&task).unwrap();
        let msg = Message::new(MessageType::Task, "orchestrator", "worker-1", content);
        protocol
            .subscribe("orchestrator", vec![MessageType::Result, MessageType::Error])
            .await
            .unwrap();
        protocol.send(msg).await.unwrap();

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        let replies = protocol.receive("orchestrator").await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].message_type, MessageType::Result);
        assert_eq!(replies[0].in_reply_to, Some(task.id.to_string()));

        agent.stop();
        handle.await.unwrap();
        assert_eq!(agent.state(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn malformed_content_produces_error_reply_without_invoking_handler() {
        let protocol: SharedProtocol = Arc::new(InMemoryProtocol::new(SecurityPolicy::default(), 16));
        let agent = Arc::new(WorkerAgent::new("worker-1", Arc::clone(&protocol), Arc::new(SucceedingHandler)));
        let handle = agent.start().await.unwrap();

        protocol
            .subscribe("orchestrator", vec![MessageType::Result, MessageType::Error])
            .await
            .unwrap();
        let msg = Message::new(MessageType::Task, "orchestrator", "worker-1", json!({ "nonsense": true }));
        protocol.send(msg).await.unwrap();

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        let replies = protocol.receive("orchestrator").await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].message_type, MessageType::Error);

        agent.stop();
        handle.await.unwrap();
    }
}
