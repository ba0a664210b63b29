use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use taskmesh_shared::model::{ProgressUpdate, Task};

use crate::error::LedgerResult;
use crate::filter::TaskFilter;
use crate::hybrid::HybridLedger;
use crate::inmemory::InMemoryLedger;
use crate::relational::RelationalLedger;
use crate::traits::{Ledger, LedgerStats};

/// Enum dispatch over the three ledger backends, mirroring the protocol
/// crate's `ProtocolHandle` pattern.
#[derive(Debug)]
pub enum LedgerHandle {
    InMemory(InMemoryLedger),
    Relational(RelationalLedger),
    Hybrid(HybridLedger),
}

impl LedgerHandle {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InMemory(_) => "inmemory",
            Self::Relational(_) => "relational",
            Self::Hybrid(_) => "hybrid",
        }
    }
}

#[async_trait]
impl Ledger for LedgerHandle {
    async fn create_task(&self, task: Task) -> LedgerResult<Task> {
        match self {
            Self::InMemory(l) => l.create_task(task).await,
            Self::Relational(l) => l.create_task(task).await,
            Self::Hybrid(l) => l.create_task(task).await,
        }
    }

    async fn get_task(&self, id: Uuid) -> LedgerResult<Option<Task>> {
        match self {
            Self::InMemory(l) => l.get_task(id).await,
            Self::Relational(l) => l.get_task(id).await,
            Self::Hybrid(l) => l.get_task(id).await,
        }
    }

    async fn update_task(&self, task: Task) -> LedgerResult<Task> {
        match self {
            Self::InMemory(l) => l.update_task(task).await,
            Self::Relational(l) => l.update_task(task).await,
            Self::Hybrid(l) => l.update_task(task).await,
        }
    }

    async fn complete_task(&self, id: Uuid, output: serde_json::Value) -> LedgerResult<Task> {
        match self {
            Self::InMemory(l) => l.complete_task(id, output).await,
            Self::Relational(l) => l.complete_task(id, output).await,
            Self::Hybrid(l) => l.complete_task(id, output).await,
        }
    }

    async fn fail_task(&self, id: Uuid, error: String) -> LedgerResult<Task> {
        match self {
            Self::InMemory(l) => l.fail_task(id, error).await,
            Self::Relational(l) => l.fail_task(id, error).await,
            Self::Hybrid(l) => l.fail_task(id, error).await,
        }
    }

    async fn delete_task(&self, id: Uuid) -> LedgerResult<()> {
        match self {
            Self::InMemory(l) => l.delete_task(id).await,
            Self::Relational(l) => l.delete_task(id).await,
            Self::Hybrid(l) => l.delete_task(id).await,
        }
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> LedgerResult<Vec<Task>> {
        match self {
            Self::InMemory(l) => l.list_tasks(filter).await,
            Self::Relational(l) => l.list_tasks(filter).await,
            Self::Hybrid(l) => l.list_tasks(filter).await,
        }
    }

    async fn record_progress(&self, update: ProgressUpdate) -> LedgerResult<()> {
        match self {
            Self::InMemory(l) => l.record_progress(update).await,
            Self::Relational(l) => l.record_progress(update).await,
            Self::Hybrid(l) => l.record_progress(update).await,
        }
    }

    async fn get_progress(&self, task_id: Uuid) -> LedgerResult<Vec<ProgressUpdate>> {
        match self {
            Self::InMemory(l) => l.get_progress(task_id).await,
            Self::Relational(l) => l.get_progress(task_id).await,
            Self::Hybrid(l) => l.get_progress(task_id).await,
        }
    }

    async fn get_latest_progress(&self, task_id: Uuid) -> LedgerResult<Option<ProgressUpdate>> {
        match self {
            Self::InMemory(l) => l.get_latest_progress(task_id).await,
            Self::Relational(l) => l.get_latest_progress(task_id).await,
            Self::Hybrid(l) => l.get_latest_progress(task_id).await,
        }
    }

    async fn purge_completed_tasks(&self, older_than: DateTime<Utc>) -> LedgerResult<u64> {
        match self {
            Self::InMemory(l) => l.purge_completed_tasks(older_than).await,
            Self::Relational(l) => l.purge_completed_tasks(older_than).await,
            Self::Hybrid(l) => l.purge_completed_tasks(older_than).await,
        }
    }

    async fn purge_progress(&self, older_than: DateTime<Utc>) -> LedgerResult<u64> {
        match self {
            Self::InMemory(l) => l.purge_progress(older_than).await,
            Self::Relational(l) => l.purge_progress(older_than).await,
            Self::Hybrid(l) => l.purge_progress(older_than).await,
        }
    }

    async fn health(&self) -> LedgerResult<bool> {
        match self {
            Self::InMemory(l) => l.health().await,
            Self::Relational(l) => l.health().await,
            Self::Hybrid(l) => l.health().await,
        }
    }

    async fn stats(&self) -> LedgerResult<LedgerStats> {
        match self {
            Self::InMemory(l) => l.stats().await,
            Self::Relational(l) => l.stats().await,
            Self::Hybrid(l) => l.stats().await,
        }
    }

    async fn close(&self) -> LedgerResult<()> {
        match self {
            Self::InMemory(l) => l.close().await,
            Self::Relational(l) => l.close().await,
            Self::Hybrid(l) => l.close().await,
        }
    }
}
