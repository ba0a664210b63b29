use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

use crate::error::ProtocolResult;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DedupStats {
    pub tracked: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Backend confirming or recording processed message ids behind the
/// bloom filter's fast pre-check (spec §4.2).
#[async_trait]
pub trait DedupBackend: Send + Sync + Debug {
    async fn is_duplicate(&self, id: &str) -> ProtocolResult<bool>;
    async fn mark_processed(&self, id: &str, ttl: Duration) -> ProtocolResult<()>;
    async fn cleanup(&self) -> ProtocolResult<u64>;
    fn stats(&self) -> DedupStats;
    async fn close(&self) -> ProtocolResult<()>;
}
