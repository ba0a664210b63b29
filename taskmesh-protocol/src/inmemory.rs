//! In-process protocol backend: a bounded per-agent queue guarded by a
//! single mutex per queue (spec §4.1, §5: "per-struct mutexes guard
//! every map/counter mutated by more than one thread").

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;

use taskmesh_shared::model::{Message, MessageType, ProtocolMetrics, SecurityPolicy};

use crate::error::{ProtocolError, ProtocolResult};
use crate::traits::{Protocol, RECEIVE_BATCH_SIZE};

struct Subscription {
    types: HashSet<MessageType>,
}

impl Subscription {
    fn matches(&self, message_type: MessageType) -> bool {
        self.types.is_empty() || self.types.contains(&message_type)
    }
}

/// In-memory `Protocol` backend. Suitable for single-process deployments
/// and as the default in tests (no external service required).
#[derive(Debug)]
pub struct InMemoryProtocol {
    queues: DashMap<String, Mutex<VecDeque<Message>>>,
    subscriptions: DashMap<String, Subscription>,
    groups: DashMap<String, Vec<String>>,
    security: SecurityPolicy,
    max_queue_size: usize,
    metrics: Mutex<ProtocolMetrics>,
}

impl InMemoryProtocol {
    pub fn new(security: SecurityPolicy, max_queue_size: usize) -> Self {
        Self {
            queues: DashMap::new(),
            subscriptions: DashMap::new(),
            groups: DashMap::new(),
            security,
            max_queue_size,
            metrics: Mutex::new(ProtocolMetrics::default()),
        }
    }

    fn enqueue(&self, recipient: &str, msg: Message) -> ProtocolResult<()> {
        let entry = self.queues.entry(recipient.to_string()).or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut queue = entry.lock().expect("in-memory protocol queue lock poisoned");
        if queue.len() >= self.max_queue_size {
            return Err(ProtocolError::QueueFull {
                agent_id: recipient.to_string(),
                capacity: self.max_queue_size,
            });
        }
        queue.push_back(msg);
        Ok(())
    }

    fn validate(&self, msg: &Message) -> ProtocolResult<()> {
        self.security
            .check_agent(&msg.to)
            .map_err(ProtocolError::SecurityRejected)?;
        let size = serde_json::to_vec(&msg.content).map(|v| v.len()).unwrap_or(0);
        self.security
            .check_size(size)
            .map_err(|_| ProtocolError::MessageTooLarge {
                size,
                max: self.security.max_message_size,
            })?;
        Ok(())
    }
}

#[async_trait]
impl Protocol for InMemoryProtocol {
    async fn send(&self, mut msg: Message) -> ProtocolResult<String> {
        if msg.to.is_empty() {
            return Err(ProtocolError::EmptyRecipient);
        }
        if msg.id.is_empty() {
            msg.id = uuid::Uuid::now_v7().to_string();
        }
        self.validate(&msg)?;

        let start = Instant::now();
        let recipient = msg.to.clone();
        let id = msg.id.clone();
        let result = self.enqueue(&recipient, msg);

        let mut metrics = self.metrics.lock().expect("metrics lock poisoned");
        match &result {
            Ok(()) => metrics.record_sent(start.elapsed().as_secs_f64() * 1000.0),
            Err(_) => metrics.record_failed(),
        }
        drop(metrics);
        result.map(|()| id)
    }

    async fn receive(&self, agent_id: &str) -> ProtocolResult<Vec<Message>> {
        let Some(entry) = self.queues.get(agent_id) else {
            return Ok(Vec::new());
        };
        let subscription = self.subscriptions.get(agent_id);
        let mut queue = entry.lock().expect("in-memory protocol queue lock poisoned");

        let mut matched = Vec::new();
        let mut remaining = VecDeque::with_capacity(queue.len());
        for msg in queue.drain(..) {
            let keep_scanning = matched.len() < RECEIVE_BATCH_SIZE;
            let accepted = keep_scanning
                && subscription
                    .as_ref()
                    .map(|s| s.matches(msg.message_type))
                    .unwrap_or(true);
            if accepted {
                matched.push(msg);
            } else {
                remaining.push_back(msg);
            }
        }
        *queue = remaining;
        drop(queue);

        if !matched.is_empty() {
            let mut metrics = self.metrics.lock().expect("metrics lock poisoned");
            for _ in &matched {
                metrics.record_received();
            }
        }
        Ok(matched)
    }

    async fn broadcast(&self, msg: Message, group_id: &str) -> ProtocolResult<()> {
        let members = self
            .groups
            .get(group_id)
            .map(|m| m.clone())
            .ok_or_else(|| ProtocolError::UnknownGroup(group_id.to_string()))?;

        for member in members {
            let mut copy = msg.clone();
            copy.to = member.clone();
            if copy.id.is_empty() {
                copy.id = uuid::Uuid::now_v7().to_string();
            }
            self.enqueue(&member, copy)?;
        }

        let mut metrics = self.metrics.lock().expect("metrics lock poisoned");
        metrics.record_sent(0.0);
        Ok(())
    }

    async fn subscribe(&self, agent_id: &str, types: Vec<MessageType>) -> ProtocolResult<()> {
        self.subscriptions.insert(
            agent_id.to_string(),
            Subscription {
                types: types.into_iter().collect(),
            },
        );
        Ok(())
    }

    async fn unsubscribe(&self, agent_id: &str) -> ProtocolResult<()> {
        self.subscriptions.remove(agent_id);
        self.queues.remove(agent_id);
        Ok(())
    }

    fn register_group(&self, group_id: &str, members: Vec<String>) {
        self.groups.insert(group_id.to_string(), members);
    }

    fn metrics(&self) -> ProtocolMetrics {
        self.metrics.lock().expect("metrics lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(to: &str) -> Message {
        Message::new(MessageType::Task, "orchestrator", to, json!({"hello": "world"}))
    }

    #[tokio::test]
    async fn send_then_receive_round_trips() {
        let protocol = InMemoryProtocol::new(SecurityPolicy::default(), 100);
        let id = protocol.send(msg("worker-1")).await.unwrap();
        let received = protocol.receive("worker-1").await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].id, id);
        // Receive again drains an empty queue.
        assert!(protocol.receive("worker-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_rejects_empty_recipient() {
        let protocol = InMemoryProtocol::new(SecurityPolicy::default(), 100);
        let err = protocol.send(msg("")).await.unwrap_err();
        assert!(matches!(err, ProtocolError::EmptyRecipient));
    }

    #[tokio::test]
    async fn queue_at_capacity_rejects_without_silent_drop() {
        let protocol = InMemoryProtocol::new(SecurityPolicy::default(), 2);
        protocol.send(msg("worker-1")).await.unwrap();
        protocol.send(msg("worker-1")).await.unwrap();
        let err = protocol.send(msg("worker-1")).await.unwrap_err();
        assert!(matches!(err, ProtocolError::QueueFull { .. }));
        // Original two messages are intact, not silently dropped.
        assert_eq!(protocol.receive("worker-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn subscription_filters_by_message_type() {
        let protocol = InMemoryProtocol::new(SecurityPolicy::default(), 100);
        protocol.subscribe("worker-1", vec![MessageType::Result]).await.unwrap();
        protocol.send(msg("worker-1")).await.unwrap(); // type = Task, filtered out
        let mut result_msg = msg("worker-1");
        result_msg.message_type = MessageType::Result;
        protocol.send(result_msg).await.unwrap();

        let received = protocol.receive("worker-1").await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].message_type, MessageType::Result);
    }

    #[tokio::test]
    async fn broadcast_delivers_to_every_group_member() {
        let protocol = InMemoryProtocol::new(SecurityPolicy::default(), 100);
        protocol.register_group("team-a", vec!["w1".into(), "w2".into()]);
        protocol.broadcast(msg(""), "team-a").await.unwrap();
        assert_eq!(protocol.receive("w1").await.unwrap().len(), 1);
        assert_eq!(protocol.receive("w2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn broadcast_to_unknown_group_fails() {
        let protocol = InMemoryProtocol::new(SecurityPolicy::default(), 100);
        let err = protocol.broadcast(msg(""), "ghost").await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownGroup(_)));
    }
}
