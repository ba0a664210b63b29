//! The `Protocol` contract (spec §4.1), implemented identically by all
//! three backends so swapping one for another never changes observable
//! semantics (spec §4.1 invariant).

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use taskmesh_shared::model::{Message, MessageType, ProtocolMetrics};

use crate::error::ProtocolResult;

/// Maximum batch size returned by a single `receive` call (spec §4.1).
pub const RECEIVE_BATCH_SIZE: usize = 10;

#[async_trait]
pub trait Protocol: Send + Sync + Debug {
    /// Deliver `msg` to its recipient's queue at-least-once. Assigns an
    /// id if `msg.id` is empty and returns the id used. Fails on empty
    /// recipient, oversize payload, or security-policy rejection.
    async fn send(&self, msg: Message) -> ProtocolResult<String>;

    /// Drain up to [`RECEIVE_BATCH_SIZE`] pending messages for `agent_id`
    /// that match its active subscription. Messages are acknowledged
    /// before the call returns (spec §4.1: "acknowledged before return").
    async fn receive(&self, agent_id: &str) -> ProtocolResult<Vec<Message>>;

    /// Deliver `msg` at-least-once to every member of `group_id`.
    async fn broadcast(&self, msg: Message, group_id: &str) -> ProtocolResult<()>;

    /// Restrict subsequent `receive` calls for `agent_id` to the given
    /// message types. An empty list means "all types".
    async fn subscribe(&self, agent_id: &str, types: Vec<MessageType>) -> ProtocolResult<()>;

    /// Remove `agent_id`'s subscription and any held queue state.
    async fn unsubscribe(&self, agent_id: &str) -> ProtocolResult<()>;

    /// Register (or replace) the membership list for a broadcast group.
    fn register_group(&self, group_id: &str, members: Vec<String>);

    /// Current rolling metrics for this backend instance.
    fn metrics(&self) -> ProtocolMetrics;
}

/// Shared handle type every consumer of the protocol layer holds.
pub type SharedProtocol = Arc<dyn Protocol>;
