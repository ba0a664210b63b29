//! S6: the same message id sent twice within the dedup window reaches
//! the queue both times (no silent drop at the transport layer), but a
//! consumer gating work on the dedup layer only invokes its handler once.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use taskmesh_protocol::dedup::{Deduplicator, InMemoryDedupBackend};
use taskmesh_protocol::{InMemoryProtocol, Protocol};
use taskmesh_shared::model::{Message, MessageType, SecurityPolicy};

#[tokio::test]
async fn second_send_is_queued_but_flagged_duplicate() {
    let protocol = InMemoryProtocol::new(SecurityPolicy::default(), 16);
    let dedup = Deduplicator::new(1000, 0.01, Duration::from_secs(60), Arc::new(InMemoryDedupBackend::new()));

    protocol.subscribe("worker-1", vec![MessageType::Task]).await.unwrap();

    let mut first = Message::new(MessageType::Task, "orchestrator", "worker-1", json!("x"));
    first.id = "task-dup-1".to_string();
    let mut second = first.clone();
    second.content = json!("x-retransmit");

    protocol.send(first).await.unwrap();
    protocol.send(second).await.unwrap();

    let invocations = AtomicU32::new(0);
    let received = protocol.receive("worker-1").await.unwrap();
    assert_eq!(received.len(), 2, "transport layer queues both sends without a silent drop");

    for message in &received {
        if !dedup.check_and_mark(&message.id).await.unwrap() {
            invocations.fetch_add(1, Ordering::SeqCst);
        }
    }

    assert_eq!(invocations.load(Ordering::SeqCst), 1, "dedup layer allows only the first occurrence through to the worker");
    assert!(dedup.check_and_mark("task-dup-1").await.unwrap(), "id stays flagged duplicate for the rest of the window");
}
