use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use crate::dedup::backend::DedupBackend;
use crate::dedup::bloom::BloomFilter;
use crate::error::ProtocolResult;

/// At-most-once gate combining a bloom filter pre-check with a backend
/// confirmation (spec §4.2). The bloom filter never produces a false
/// negative, so a negative result is conclusive; a positive result must
/// be confirmed against the backend since the filter can false-positive.
#[derive(Debug)]
pub struct Deduplicator {
    filter: Mutex<BloomFilter>,
    backend: Arc<dyn DedupBackend>,
    window: Duration,
}

impl Deduplicator {
    pub fn new(expected_items: usize, false_positive_rate: f64, window: Duration, backend: Arc<dyn DedupBackend>) -> Self {
        Self {
            filter: Mutex::new(BloomFilter::new(expected_items, false_positive_rate)),
            backend,
            window,
        }
    }

    /// Returns `true` if `id` has already been processed within the window.
    pub async fn check_and_mark(&self, id: &str) -> ProtocolResult<bool> {
        let maybe_seen = self.filter.lock().expect("bloom filter lock poisoned").might_contain(id);

        if !maybe_seen {
            self.backend.mark_processed(id, self.window).await?;
            self.filter.lock().expect("bloom filter lock poisoned").insert(id);
            return Ok(false);
        }

        if self.backend.is_duplicate(id).await? {
            return Ok(true);
        }

        // Bloom filter false positive: genuinely new, so mark it now.
        self.backend.mark_processed(id, self.window).await?;
        Ok(false)
    }

    pub async fn cleanup(&self) -> ProtocolResult<u64> {
        self.backend.cleanup().await
    }

    pub async fn close(&self) -> ProtocolResult<()> {
        self.backend.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::inmemory_backend::InMemoryDedupBackend;

    #[tokio::test]
    async fn first_occurrence_is_never_a_duplicate() {
        let dedup = Deduplicator::new(1000, 0.01, Duration::from_secs(60), Arc::new(InMemoryDedupBackend::new()));
        assert!(!dedup.check_and_mark("msg-1").await.unwrap());
    }

    #[tokio::test]
    async fn repeated_id_is_flagged_duplicate() {
        let dedup = Deduplicator::new(1000, 0.01, Duration::from_secs(60), Arc::new(InMemoryDedupBackend::new()));
        assert!(!dedup.check_and_mark("msg-1").await.unwrap());
        assert!(dedup.check_and_mark("msg-1").await.unwrap());
    }

    #[tokio::test]
    async fn distinct_ids_are_independent() {
        let dedup = Deduplicator::new(1000, 0.01, Duration::from_secs(60), Arc::new(InMemoryDedupBackend::new()));
        assert!(!dedup.check_and_mark("msg-1").await.unwrap());
        assert!(!dedup.check_and_mark("msg-2").await.unwrap());
    }
}
