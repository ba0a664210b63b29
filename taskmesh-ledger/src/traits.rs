use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use uuid::Uuid;

use taskmesh_shared::model::{ProgressUpdate, Task};

use crate::error::LedgerResult;
use crate::filter::TaskFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_tasks: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Persistence contract for tasks and progress (spec C3 / §4.3).
#[async_trait]
pub trait Ledger: Send + Sync + Debug {
    async fn create_task(&self, task: Task) -> LedgerResult<Task>;
    async fn get_task(&self, id: Uuid) -> LedgerResult<Option<Task>>;
    async fn update_task(&self, task: Task) -> LedgerResult<Task>;
    async fn complete_task(&self, id: Uuid, output: serde_json::Value) -> LedgerResult<Task>;
    async fn fail_task(&self, id: Uuid, error: String) -> LedgerResult<Task>;
    async fn delete_task(&self, id: Uuid) -> LedgerResult<()>;
    async fn list_tasks(&self, filter: &TaskFilter) -> LedgerResult<Vec<Task>>;

    async fn record_progress(&self, update: ProgressUpdate) -> LedgerResult<()>;
    async fn get_progress(&self, task_id: Uuid) -> LedgerResult<Vec<ProgressUpdate>>;
    async fn get_latest_progress(&self, task_id: Uuid) -> LedgerResult<Option<ProgressUpdate>>;

    async fn purge_completed_tasks(&self, older_than: chrono::DateTime<chrono::Utc>) -> LedgerResult<u64>;
    async fn purge_progress(&self, older_than: chrono::DateTime<chrono::Utc>) -> LedgerResult<u64>;

    async fn health(&self) -> LedgerResult<bool>;
    async fn stats(&self) -> LedgerResult<LedgerStats>;
    async fn close(&self) -> LedgerResult<()>;
}
