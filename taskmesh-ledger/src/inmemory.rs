//! In-memory ledger: two maps behind a single reader-writer lock, as
//! spec §4.3 prescribes ("single reader-writer lock per ledger; iteration
//! copies snapshot").

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use taskmesh_shared::model::{ProgressUpdate, Task, TaskStatus};

use crate::error::{LedgerError, LedgerResult};
use crate::filter::{apply_sort_and_page, TaskFilter};
use crate::traits::{Ledger, LedgerStats};

#[derive(Debug, Default)]
struct State {
    tasks: HashMap<Uuid, Task>,
    progress: HashMap<Uuid, Vec<ProgressUpdate>>,
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<State>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn create_task(&self, task: Task) -> LedgerResult<Task> {
        let mut state = self.state.write().expect("ledger lock poisoned");
        if state.tasks.contains_key(&task.id) {
            return Err(LedgerError::AlreadyExists(task.id));
        }
        state.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: Uuid) -> LedgerResult<Option<Task>> {
        Ok(self.state.read().expect("ledger lock poisoned").tasks.get(&id).cloned())
    }

    async fn update_task(&self, mut task: Task) -> LedgerResult<Task> {
        let mut state = self.state.write().expect("ledger lock poisoned");
        let existing = state.tasks.get(&task.id).ok_or(LedgerError::NotFound(task.id))?;
        if !existing.status.can_transition_to(task.status) {
            return Err(LedgerError::InvalidTransition {
                from: existing.status,
                to: task.status,
            });
        }
        task.updated_at = Utc::now();
        state.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn complete_task(&self, id: Uuid, output: serde_json::Value) -> LedgerResult<Task> {
        let mut state = self.state.write().expect("ledger lock poisoned");
        let task = state.tasks.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        if !task.status.can_transition_to(TaskStatus::Completed) {
            return Err(LedgerError::InvalidTransition {
                from: task.status,
                to: TaskStatus::Completed,
            });
        }
        task.status = TaskStatus::Completed;
        task.output = Some(output);
        task.updated_at = Utc::now();
        task.completed_at = Some(task.updated_at);
        Ok(task.clone())
    }

    async fn fail_task(&self, id: Uuid, error: String) -> LedgerResult<Task> {
        let mut state = self.state.write().expect("ledger lock poisoned");
        let task = state.tasks.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        if !task.status.can_transition_to(TaskStatus::Failed) {
            return Err(LedgerError::InvalidTransition {
                from: task.status,
                to: TaskStatus::Failed,
            });
        }
        task.status = TaskStatus::Failed;
        task.error = Some(error);
        task.updated_at = Utc::now();
        task.completed_at = Some(task.updated_at);
        Ok(task.clone())
    }

    async fn delete_task(&self, id: Uuid) -> LedgerResult<()> {
        let mut state = self.state.write().expect("ledger lock poisoned");
        state.tasks.remove(&id).ok_or(LedgerError::NotFound(id))?;
        state.progress.remove(&id);
        Ok(())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> LedgerResult<Vec<Task>> {
        let snapshot: Vec<Task> = self
            .state
            .read()
            .expect("ledger lock poisoned")
            .tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        Ok(apply_sort_and_page(snapshot, filter))
    }

    async fn record_progress(&self, update: ProgressUpdate) -> LedgerResult<()> {
        let mut state = self.state.write().expect("ledger lock poisoned");
        state.progress.entry(update.task_id).or_default().push(update);
        Ok(())
    }

    async fn get_progress(&self, task_id: Uuid) -> LedgerResult<Vec<ProgressUpdate>> {
        Ok(self
            .state
            .read()
            .expect("ledger lock poisoned")
            .progress
            .get(&task_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_latest_progress(&self, task_id: Uuid) -> LedgerResult<Option<ProgressUpdate>> {
        Ok(self
            .state
            .read()
            .expect("ledger lock poisoned")
            .progress
            .get(&task_id)
            .and_then(|entries| entries.last().cloned()))
    }

    async fn purge_completed_tasks(&self, older_than: DateTime<Utc>) -> LedgerResult<u64> {
        let mut state = self.state.write().expect("ledger lock poisoned");
        let to_remove: Vec<Uuid> = state
            .tasks
            .values()
            .filter(|t| t.status.is_terminal() && t.completed_at.map(|c| c < older_than).unwrap_or(false))
            .map(|t| t.id)
            .collect();
        for id in &to_remove {
            state.tasks.remove(id);
        }
        Ok(to_remove.len() as u64)
    }

    async fn purge_progress(&self, older_than: DateTime<Utc>) -> LedgerResult<u64> {
        let mut state = self.state.write().expect("ledger lock poisoned");
        let mut removed = 0u64;
        for entries in state.progress.values_mut() {
            let before = entries.len();
            entries.retain(|p| p.recorded_at >= older_than);
            removed += (before - entries.len()) as u64;
        }
        Ok(removed)
    }

    async fn health(&self) -> LedgerResult<bool> {
        Ok(true)
    }

    async fn stats(&self) -> LedgerResult<LedgerStats> {
        let state = self.state.read().expect("ledger lock poisoned");
        let mut stats = LedgerStats {
            total_tasks: state.tasks.len() as u64,
            ..Default::default()
        };
        for task in state.tasks.values() {
            match task.status {
                TaskStatus::Pending | TaskStatus::Assigned => stats.pending += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed | TaskStatus::Cancelled => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn close(&self) -> LedgerResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task() -> Task {
        Task::new("t", "type", "creator", json!({}))
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let ledger = InMemoryLedger::new();
        let task = ledger.create_task(task()).await.unwrap();
        let fetched = ledger.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, task.id);
    }

    #[tokio::test]
    async fn duplicate_create_fails() {
        let ledger = InMemoryLedger::new();
        let task = task();
        ledger.create_task(task.clone()).await.unwrap();
        assert!(matches!(ledger.create_task(task).await, Err(LedgerError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn complete_task_is_terminal() {
        let ledger = InMemoryLedger::new();
        let task = ledger.create_task(task()).await.unwrap();
        let completed = ledger.complete_task(task.id, json!({"ok": true})).await.unwrap();
        assert_eq!(completed.status, TaskStatus::Completed);
        assert!(ledger.fail_task(task.id, "too late".into()).await.is_err());
    }

    #[tokio::test]
    async fn list_tasks_filters_by_status() {
        let ledger = InMemoryLedger::new();
        let t1 = ledger.create_task(task()).await.unwrap();
        ledger.create_task(task()).await.unwrap();
        ledger.complete_task(t1.id, json!({})).await.unwrap();

        let mut filter = TaskFilter::new();
        filter.status_in = Some([TaskStatus::Completed].into_iter().collect());
        let results = ledger.list_tasks(&filter).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, t1.id);
    }

    #[tokio::test]
    async fn progress_updates_accumulate_in_order() {
        let ledger = InMemoryLedger::new();
        let task = ledger.create_task(task()).await.unwrap();
        ledger
            .record_progress(ProgressUpdate::new(task.id, "worker-1", TaskStatus::InProgress, "starting"))
            .await
            .unwrap();
        ledger
            .record_progress(ProgressUpdate::new(task.id, "worker-1", TaskStatus::InProgress, "halfway"))
            .await
            .unwrap();
        let latest = ledger.get_latest_progress(task.id).await.unwrap().unwrap();
        assert_eq!(latest.message, "halfway");
        assert_eq!(ledger.get_progress(task.id).await.unwrap().len(), 2);
    }
}
