//! Pluggable agent-to-agent messaging (spec C1) and deduplication (spec C2).
//!
//! Three backends implement the same [`Protocol`] contract — in-process,
//! Redis Streams, and a Kafka-style append log — so swapping one for
//! another never changes observable semantics (spec §4.1 invariant).

pub mod dedup;
pub mod error;
mod factory;
mod inmemory;
mod kafka_log;
mod redis_streams;
mod traits;

pub use error::{ProtocolError, ProtocolResult};
pub use factory::ProtocolHandle;
pub use inmemory::InMemoryProtocol;
pub use kafka_log::KafkaLogProtocol;
pub use redis_streams::RedisStreamProtocol;
pub use traits::{Protocol, SharedProtocol, RECEIVE_BATCH_SIZE};
