use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::dedup::backend::{DedupBackend, DedupStats};
use crate::error::{ProtocolError, ProtocolResult};

/// TTL-keyed Redis dedup backend: a plain `SET key EX ttl` per id, `EXISTS`
/// to check (spec §4.2: "TTL-keyed store, e.g. Redis SET with EX").
#[derive(Debug)]
pub struct RedisDedupBackend {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    key_prefix: String,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RedisDedupBackend {
    pub fn new(addr: &str, key_prefix: impl Into<String>) -> ProtocolResult<Self> {
        let client = redis::Client::open(addr).map_err(|e| ProtocolError::Transport(format!("redis client open failed: {e}")))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            key_prefix: key_prefix.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    fn key(&self, id: &str) -> String {
        format!("{}:dedup:{}", self.key_prefix, id)
    }

    async fn connection(&self) -> ProtocolResult<MultiplexedConnection> {
        let existing = self.connection.lock().expect("redis connection lock poisoned").clone();
        if let Some(conn) = existing {
            return Ok(conn);
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ProtocolError::Transport(format!("redis connect failed: {e}")))?;
        *self.connection.lock().expect("redis connection lock poisoned") = Some(conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl DedupBackend for RedisDedupBackend {
    async fn is_duplicate(&self, id: &str) -> ProtocolResult<bool> {
        let mut conn = self.connection().await?;
        let exists: bool = conn
            .exists(self.key(id))
            .await
            .map_err(|e| ProtocolError::Transport(format!("EXISTS failed: {e}")))?;
        if exists {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(exists)
    }

    async fn mark_processed(&self, id: &str, ttl: Duration) -> ProtocolResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .set_ex(self.key(id), 1u8, ttl.as_secs().max(1))
            .await
            .map_err(|e| ProtocolError::Transport(format!("SET EX failed: {e}")))?;
        Ok(())
    }

    async fn cleanup(&self) -> ProtocolResult<u64> {
        // Redis EXPIRE handles eviction natively; nothing to sweep.
        Ok(0)
    }

    fn stats(&self) -> DedupStats {
        DedupStats {
            tracked: 0,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    async fn close(&self) -> ProtocolResult<()> {
        Ok(())
    }
}
