use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::dedup::backend::{DedupBackend, DedupStats};
use crate::error::ProtocolResult;

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Instant>,
    hits: u64,
    misses: u64,
}

/// In-memory dedup backend: a map of id to expiry instant.
#[derive(Debug, Default)]
pub struct InMemoryDedupBackend {
    inner: Mutex<Inner>,
}

impl InMemoryDedupBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupBackend for InMemoryDedupBackend {
    async fn is_duplicate(&self, id: &str) -> ProtocolResult<bool> {
        let mut inner = self.inner.lock().expect("dedup backend lock poisoned");
        let now = Instant::now();
        let found = match inner.entries.get(id) {
            Some(expires_at) if *expires_at > now => true,
            Some(_) => {
                inner.entries.remove(id);
                false
            }
            None => false,
        };
        if found {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        Ok(found)
    }

    async fn mark_processed(&self, id: &str, ttl: Duration) -> ProtocolResult<()> {
        let mut inner = self.inner.lock().expect("dedup backend lock poisoned");
        inner.entries.insert(id.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn cleanup(&self) -> ProtocolResult<u64> {
        let mut inner = self.inner.lock().expect("dedup backend lock poisoned");
        let now = Instant::now();
        let before = inner.entries.len();
        inner.entries.retain(|_, expires_at| *expires_at > now);
        Ok((before - inner.entries.len()) as u64)
    }

    fn stats(&self) -> DedupStats {
        let inner = self.inner.lock().expect("dedup backend lock poisoned");
        DedupStats {
            tracked: inner.entries.len() as u64,
            hits: inner.hits,
            misses: inner.misses,
        }
    }

    async fn close(&self) -> ProtocolResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn marked_id_is_duplicate_until_expiry() {
        let backend = InMemoryDedupBackend::new();
        assert!(!backend.is_duplicate("m1").await.unwrap());
        backend.mark_processed("m1", Duration::from_secs(60)).await.unwrap();
        assert!(backend.is_duplicate("m1").await.unwrap());
    }

    #[tokio::test]
    async fn expired_entry_is_no_longer_duplicate() {
        let backend = InMemoryDedupBackend::new();
        backend.mark_processed("m1", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!backend.is_duplicate("m1").await.unwrap());
    }

    #[tokio::test]
    async fn cleanup_removes_expired_entries() {
        let backend = InMemoryDedupBackend::new();
        backend.mark_processed("m1", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let removed = backend.cleanup().await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(backend.stats().tracked, 0);
    }
}
