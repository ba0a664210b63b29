//! Enum dispatch over the three [`Protocol`] backends.
//!
//! Follows the same `MessageRouterKind`-style shape used elsewhere for
//! multi-backend messaging: a plain enum match instead of `Arc<dyn
//! Protocol>`, avoiding vtable overhead on the hot send/receive path while
//! still letting every caller hold one concrete, cloneable handle type.

use async_trait::async_trait;

use taskmesh_shared::config::protocol::{ProtocolConfig, ProtocolKind};

use crate::error::ProtocolResult;
use crate::inmemory::InMemoryProtocol;
use crate::kafka_log::KafkaLogProtocol;
use crate::redis_streams::RedisStreamProtocol;
use crate::traits::Protocol;
use taskmesh_shared::model::{Message, MessageType, ProtocolMetrics};

/// Concrete handle to whichever backend was selected at construction time.
#[derive(Debug)]
pub enum ProtocolHandle {
    InMemory(InMemoryProtocol),
    Redis(RedisStreamProtocol),
    Kafka(KafkaLogProtocol),
}

impl ProtocolHandle {
    pub fn from_config(config: &ProtocolConfig) -> ProtocolResult<Self> {
        match config.kind {
            ProtocolKind::Inmemory => Ok(Self::InMemory(InMemoryProtocol::new(
                config.security.clone(),
                config.queue_size,
            ))),
            ProtocolKind::Redis => Ok(Self::Redis(RedisStreamProtocol::with_write_timeout(
                &config.redis,
                config.security.clone(),
                config.write_timeout,
            )?)),
            ProtocolKind::Kafka => Ok(Self::Kafka(KafkaLogProtocol::with_write_timeout(
                &config.kafka,
                config.security.clone(),
                config.write_timeout,
            )?)),
        }
    }

    pub fn from_env() -> ProtocolResult<Self> {
        Self::from_config(&ProtocolConfig::from_env())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InMemory(_) => "inmemory",
            Self::Redis(_) => "redis",
            Self::Kafka(_) => "kafka",
        }
    }
}

#[async_trait]
impl Protocol for ProtocolHandle {
    async fn send(&self, msg: Message) -> ProtocolResult<String> {
        match self {
            Self::InMemory(p) => p.send(msg).await,
            Self::Redis(p) => p.send(msg).await,
            Self::Kafka(p) => p.send(msg).await,
        }
    }

    async fn receive(&self, agent_id: &str) -> ProtocolResult<Vec<Message>> {
        match self {
            Self::InMemory(p) => p.receive(agent_id).await,
            Self::Redis(p) => p.receive(agent_id).await,
            Self::Kafka(p) => p.receive(agent_id).await,
        }
    }

    async fn broadcast(&self, msg: Message, group_id: &str) -> ProtocolResult<()> {
        match self {
            Self::InMemory(p) => p.broadcast(msg, group_id).await,
            Self::Redis(p) => p.broadcast(msg, group_id).await,
            Self::Kafka(p) => p.broadcast(msg, group_id).await,
        }
    }

    async fn subscribe(&self, agent_id: &str, types: Vec<MessageType>) -> ProtocolResult<()> {
        match self {
            Self::InMemory(p) => p.subscribe(agent_id, types).await,
            Self::Redis(p) => p.subscribe(agent_id, types).await,
            Self::Kafka(p) => p.subscribe(agent_id, types).await,
        }
    }

    async fn unsubscribe(&self, agent_id: &str) -> ProtocolResult<()> {
        match self {
            Self::InMemory(p) => p.unsubscribe(agent_id).await,
            Self::Redis(p) => p.unsubscribe(agent_id).await,
            Self::Kafka(p) => p.unsubscribe(agent_id).await,
        }
    }

    fn register_group(&self, group_id: &str, members: Vec<String>) {
        match self {
            Self::InMemory(p) => p.register_group(group_id, members),
            Self::Redis(p) => p.register_group(group_id, members),
            Self::Kafka(p) => p.register_group(group_id, members),
        }
    }

    fn metrics(&self) -> ProtocolMetrics {
        match self {
            Self::InMemory(p) => p.metrics(),
            Self::Redis(p) => p.metrics(),
            Self::Kafka(p) => p.metrics(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_selects_inmemory() {
        let handle = ProtocolHandle::from_config(&ProtocolConfig::default()).unwrap();
        assert_eq!(handle.kind(), "inmemory");
    }
}
