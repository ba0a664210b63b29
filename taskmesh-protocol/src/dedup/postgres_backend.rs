use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use crate::dedup::backend::{DedupBackend, DedupStats};
use crate::error::{ProtocolError, ProtocolResult};

/// Relational dedup backend: table `(message_id PK, expires_at)` with
/// periodic `DELETE WHERE expires_at < now` (spec §4.2).
#[derive(Debug)]
pub struct PostgresDedupBackend {
    pool: PgPool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PostgresDedupBackend {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn ensure_schema(&self) -> ProtocolResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS taskmesh_dedup (
                message_id TEXT PRIMARY KEY,
                expires_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ProtocolError::Transport(format!("dedup schema creation failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl DedupBackend for PostgresDedupBackend {
    async fn is_duplicate(&self, id: &str) -> ProtocolResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM taskmesh_dedup WHERE message_id = $1 AND expires_at > now()",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ProtocolError::Transport(format!("dedup lookup failed: {e}")))?;

        let found = row.is_some();
        if found {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    async fn mark_processed(&self, id: &str, ttl: Duration) -> ProtocolResult<()> {
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        sqlx::query(
            "INSERT INTO taskmesh_dedup (message_id, expires_at) VALUES ($1, $2)
             ON CONFLICT (message_id) DO UPDATE SET expires_at = EXCLUDED.expires_at",
        )
        .bind(id)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| ProtocolError::Transport(format!("dedup upsert failed: {e}")))?;
        Ok(())
    }

    async fn cleanup(&self) -> ProtocolResult<u64> {
        let result = sqlx::query("DELETE FROM taskmesh_dedup WHERE expires_at < now()")
            .execute(&self.pool)
            .await
            .map_err(|e| ProtocolError::Transport(format!("dedup cleanup failed: {e}")))?;
        Ok(result.rows_affected())
    }

    fn stats(&self) -> DedupStats {
        DedupStats {
            tracked: 0,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    async fn close(&self) -> ProtocolResult<()> {
        self.pool.close().await;
        Ok(())
    }
}
