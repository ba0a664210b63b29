//! Protocol backend configuration (spec §6).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::SecurityPolicy;

/// Selects which [`Protocol`](../../taskmesh_protocol) backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    #[default]
    Inmemory,
    Redis,
    Kafka,
}

impl ProtocolKind {
    fn from_env_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Self::Redis,
            "kafka" => Self::Kafka,
            _ => Self::Inmemory,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisProtocolConfig {
    pub addr: String,
    pub password: Option<String>,
    pub db: i64,
    pub pool_size: u32,
    pub message_ttl: Duration,
    pub consumer_group: String,
    pub stream_max_len: u64,
}

impl Default for RedisProtocolConfig {
    fn default() -> Self {
        Self {
            addr: "redis://127.0.0.1:6379".to_string(),
            password: None,
            db: 0,
            pool_size: 10,
            message_ttl: Duration::from_secs(24 * 3600),
            consumer_group: "taskmesh".to_string(),
            stream_max_len: 10_000,
        }
    }
}

impl RedisProtocolConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            addr: std::env::var("REDIS_ADDR").unwrap_or(defaults.addr),
            password: std::env::var("REDIS_PASSWORD").ok(),
            db: std::env::var("REDIS_DB")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.db),
            pool_size: std::env::var("REDIS_POOL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.pool_size),
            message_ttl: std::env::var("REDIS_MESSAGE_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.message_ttl),
            consumer_group: std::env::var("REDIS_CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            stream_max_len: defaults.stream_max_len,
        }
    }
}

/// Wire compression for the log-based (Kafka-style) backend (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    #[default]
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

/// Required-acks setting for the log-based backend (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckMode {
    None,
    Leader,
    All,
}

impl Default for AckMode {
    fn default() -> Self {
        Self::Leader
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaProtocolConfig {
    pub brokers: Vec<String>,
    pub group_id: String,
    pub client_id: String,
    pub topic_prefix: String,
    pub num_partitions: u32,
    pub replication_factor: u32,
    pub message_ttl: Duration,
    pub compression: CompressionKind,
    pub required_acks: AckMode,
}

impl Default for KafkaProtocolConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            group_id: "taskmesh".to_string(),
            client_id: "taskmesh-protocol".to_string(),
            topic_prefix: "taskmesh".to_string(),
            num_partitions: 3,
            replication_factor: 1,
            message_ttl: Duration::from_secs(7 * 24 * 3600),
            compression: CompressionKind::None,
            required_acks: AckMode::Leader,
        }
    }
}

impl KafkaProtocolConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            brokers: std::env::var("KAFKA_BROKERS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.brokers),
            group_id: std::env::var("KAFKA_GROUP_ID").unwrap_or(defaults.group_id),
            client_id: std::env::var("KAFKA_CLIENT_ID").unwrap_or(defaults.client_id),
            topic_prefix: std::env::var("KAFKA_TOPIC_PREFIX").unwrap_or(defaults.topic_prefix),
            num_partitions: std::env::var("KAFKA_NUM_PARTITIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.num_partitions),
            replication_factor: std::env::var("KAFKA_REPLICATION_FACTOR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.replication_factor),
            message_ttl: std::env::var("KAFKA_MESSAGE_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.message_ttl),
            compression: defaults.compression,
            required_acks: defaults.required_acks,
        }
    }
}

/// Top-level protocol configuration (spec §6 defaults: queue size 1000,
/// max message 1 MB, block timeout 5s).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub kind: ProtocolKind,
    pub queue_size: usize,
    pub max_message_size: usize,
    pub write_timeout: Duration,
    pub block_timeout: Duration,
    pub security: SecurityPolicy,
    pub redis: RedisProtocolConfig,
    pub kafka: KafkaProtocolConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            kind: ProtocolKind::default(),
            queue_size: 1000,
            max_message_size: 1024 * 1024,
            write_timeout: Duration::from_secs(5),
            block_timeout: Duration::from_secs(5),
            security: SecurityPolicy::default(),
            redis: RedisProtocolConfig::default(),
            kafka: KafkaProtocolConfig::default(),
        }
    }
}

impl ProtocolConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            kind: std::env::var("PROTOCOL_TYPE")
                .map(|v| ProtocolKind::from_env_str(&v))
                .unwrap_or(defaults.kind),
            redis: RedisProtocolConfig::from_env(),
            kafka: KafkaProtocolConfig::from_env(),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_section_6() {
        let config = ProtocolConfig::default();
        assert_eq!(config.queue_size, 1000);
        assert_eq!(config.max_message_size, 1024 * 1024);
        assert_eq!(config.block_timeout, Duration::from_secs(5));
        assert_eq!(config.redis.pool_size, 10);
        assert_eq!(config.redis.message_ttl, Duration::from_secs(24 * 3600));
        assert_eq!(config.kafka.num_partitions, 3);
        assert_eq!(config.kafka.replication_factor, 1);
    }
}
