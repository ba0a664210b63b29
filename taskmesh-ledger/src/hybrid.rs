//! Hybrid ledger: a write-through `moka` cache of recently accessed tasks
//! in front of [`RelationalLedger`] (spec §4.3). List is always a
//! pass-through — caching list results would make pagination/sort stale
//! the moment any task changes — and purge clears the whole cache.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use uuid::Uuid;

use taskmesh_shared::model::{ProgressUpdate, Task};

use crate::error::LedgerResult;
use crate::filter::TaskFilter;
use crate::relational::RelationalLedger;
use crate::traits::{Ledger, LedgerStats};

#[derive(Debug)]
pub struct HybridLedger {
    inner: RelationalLedger,
    cache: Cache<Uuid, Task>,
}

impl HybridLedger {
    pub fn new(inner: RelationalLedger, max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(max_capacity).time_to_live(ttl).build();
        Self { inner, cache }
    }

    pub async fn ensure_schema(&self) -> LedgerResult<()> {
        self.inner.ensure_schema().await
    }
}

#[async_trait]
impl Ledger for HybridLedger {
    async fn create_task(&self, task: Task) -> LedgerResult<Task> {
        let created = self.inner.create_task(task).await?;
        self.cache.insert(created.id, created.clone()).await;
        Ok(created)
    }

    async fn get_task(&self, id: Uuid) -> LedgerResult<Option<Task>> {
        if let Some(cached) = self.cache.get(&id).await {
            return Ok(Some(cached));
        }
        let task = self.inner.get_task(id).await?;
        if let Some(task) = &task {
            self.cache.insert(id, task.clone()).await;
        }
        Ok(task)
    }

    async fn update_task(&self, task: Task) -> LedgerResult<Task> {
        let updated = self.inner.update_task(task).await?;
        self.cache.insert(updated.id, updated.clone()).await;
        Ok(updated)
    }

    async fn complete_task(&self, id: Uuid, output: serde_json::Value) -> LedgerResult<Task> {
        let updated = self.inner.complete_task(id, output).await?;
        self.cache.insert(id, updated.clone()).await;
        Ok(updated)
    }

    async fn fail_task(&self, id: Uuid, error: String) -> LedgerResult<Task> {
        let updated = self.inner.fail_task(id, error).await?;
        self.cache.insert(id, updated.clone()).await;
        Ok(updated)
    }

    async fn delete_task(&self, id: Uuid) -> LedgerResult<()> {
        self.inner.delete_task(id).await?;
        self.cache.invalidate(&id).await;
        Ok(())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> LedgerResult<Vec<Task>> {
        self.inner.list_tasks(filter).await
    }

    async fn record_progress(&self, update: ProgressUpdate) -> LedgerResult<()> {
        self.inner.record_progress(update).await
    }

    async fn get_progress(&self, task_id: Uuid) -> LedgerResult<Vec<ProgressUpdate>> {
        self.inner.get_progress(task_id).await
    }

    async fn get_latest_progress(&self, task_id: Uuid) -> LedgerResult<Option<ProgressUpdate>> {
        self.inner.get_latest_progress(task_id).await
    }

    async fn purge_completed_tasks(&self, older_than: DateTime<Utc>) -> LedgerResult<u64> {
        let purged = self.inner.purge_completed_tasks(older_than).await?;
        self.cache.invalidate_all();
        Ok(purged)
    }

    async fn purge_progress(&self, older_than: DateTime<Utc>) -> LedgerResult<u64> {
        self.inner.purge_progress(older_than).await
    }

    async fn health(&self) -> LedgerResult<bool> {
        self.inner.health().await
    }

    async fn stats(&self) -> LedgerResult<LedgerStats> {
        self.inner.stats().await
    }

    async fn close(&self) -> LedgerResult<()> {
        self.cache.invalidate_all();
        self.inner.close().await
    }
}
