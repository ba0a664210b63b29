//! Relational ledger over PostgreSQL: two tables (tasks, task_progress)
//! with prepared statements and JSON-encoded columns for
//! dependencies/input/output/metadata (spec §4.3).

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use taskmesh_shared::model::{ProgressUpdate, Task, TaskPriority, TaskStatus};

use crate::error::{LedgerError, LedgerResult};
use crate::filter::{apply_sort_and_page, TaskFilter};
use crate::traits::{Ledger, LedgerStats};

fn status_to_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Assigned => "assigned",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(s: &str) -> LedgerResult<TaskStatus> {
    Ok(match s {
        "pending" => TaskStatus::Pending,
        "assigned" => TaskStatus::Assigned,
        "in_progress" => TaskStatus::InProgress,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        "cancelled" => TaskStatus::Cancelled,
        other => return Err(LedgerError::Storage(format!("unknown task status '{other}'"))),
    })
}

fn row_to_task(row: &PgRow) -> LedgerResult<Task> {
    let status_str: String = row.try_get("status").map_err(|e| LedgerError::Storage(e.to_string()))?;
    let priority_i32: i32 = row.try_get("priority").map_err(|e| LedgerError::Storage(e.to_string()))?;
    let dependencies_json: serde_json::Value = row.try_get("dependencies").map_err(|e| LedgerError::Storage(e.to_string()))?;
    let metadata_json: serde_json::Value = row.try_get("metadata").map_err(|e| LedgerError::Storage(e.to_string()))?;

    Ok(Task {
        id: row.try_get("id").map_err(|e| LedgerError::Storage(e.to_string()))?,
        name: row.try_get("name").map_err(|e| LedgerError::Storage(e.to_string()))?,
        description: row.try_get("description").map_err(|e| LedgerError::Storage(e.to_string()))?,
        task_type: row.try_get("task_type").map_err(|e| LedgerError::Storage(e.to_string()))?,
        priority: TaskPriority::try_from_i32(priority_i32).unwrap_or_default(),
        assigned_to: row.try_get("assigned_to").map_err(|e| LedgerError::Storage(e.to_string()))?,
        created_by: row.try_get("created_by").map_err(|e| LedgerError::Storage(e.to_string()))?,
        dependencies: serde_json::from_value(dependencies_json).map_err(|e| LedgerError::Serialization(e.to_string()))?,
        input: row.try_get("input").map_err(|e| LedgerError::Storage(e.to_string()))?,
        output: row.try_get("output").map_err(|e| LedgerError::Storage(e.to_string()))?,
        status: status_from_str(&status_str)?,
        error: row.try_get("error").map_err(|e| LedgerError::Storage(e.to_string()))?,
        metadata: serde_json::from_value(metadata_json).map_err(|e| LedgerError::Serialization(e.to_string()))?,
        created_at: row.try_get("created_at").map_err(|e| LedgerError::Storage(e.to_string()))?,
        updated_at: row.try_get("updated_at").map_err(|e| LedgerError::Storage(e.to_string()))?,
        completed_at: row.try_get("completed_at").map_err(|e| LedgerError::Storage(e.to_string()))?,
    })
}

#[derive(Debug)]
pub struct RelationalLedger {
    pool: PgPool,
}

impl RelationalLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> LedgerResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS taskmesh_tasks (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                task_type TEXT NOT NULL,
                priority INTEGER NOT NULL,
                assigned_to TEXT,
                created_by TEXT NOT NULL,
                dependencies JSONB NOT NULL,
                input JSONB NOT NULL,
                output JSONB,
                status TEXT NOT NULL,
                error TEXT,
                metadata JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS taskmesh_task_progress (
                id BIGSERIAL PRIMARY KEY,
                task_id UUID NOT NULL REFERENCES taskmesh_tasks(id) ON DELETE CASCADE,
                agent_id TEXT NOT NULL,
                status TEXT NOT NULL,
                message TEXT NOT NULL,
                metadata JSONB NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn fetch_task(&self, id: Uuid) -> LedgerResult<Option<Task>> {
        let row = sqlx::query("SELECT * FROM taskmesh_tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        row.as_ref().map(row_to_task).transpose()
    }
}

#[async_trait::async_trait]
impl Ledger for RelationalLedger {
    async fn create_task(&self, task: Task) -> LedgerResult<Task> {
        let dependencies = serde_json::to_value(&task.dependencies).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let metadata = serde_json::to_value(&task.metadata).map_err(|e| LedgerError::Serialization(e.to_string()))?;

        sqlx::query(
            "INSERT INTO taskmesh_tasks
                (id, name, description, task_type, priority, assigned_to, created_by,
                 dependencies, input, output, status, error, metadata, created_at, updated_at, completed_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)",
        )
        .bind(task.id)
        .bind(&task.name)
        .bind(&task.description)
        .bind(&task.task_type)
        .bind(task.priority.as_i32())
        .bind(&task.assigned_to)
        .bind(&task.created_by)
        .bind(dependencies)
        .bind(&task.input)
        .bind(&task.output)
        .bind(status_to_str(task.status))
        .bind(&task.error)
        .bind(metadata)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        Ok(task)
    }

    async fn get_task(&self, id: Uuid) -> LedgerResult<Option<Task>> {
        self.fetch_task(id).await
    }

    async fn update_task(&self, mut task: Task) -> LedgerResult<Task> {
        let existing = self.fetch_task(task.id).await?.ok_or(LedgerError::NotFound(task.id))?;
        if !existing.status.can_transition_to(task.status) {
            return Err(LedgerError::InvalidTransition {
                from: existing.status,
                to: task.status,
            });
        }
        task.updated_at = Utc::now();
        let metadata = serde_json::to_value(&task.metadata).map_err(|e| LedgerError::Serialization(e.to_string()))?;

        sqlx::query(
            "UPDATE taskmesh_tasks SET
                assigned_to = $2, output = $3, status = $4, error = $5,
                metadata = $6, updated_at = $7, completed_at = $8
             WHERE id = $1",
        )
        .bind(task.id)
        .bind(&task.assigned_to)
        .bind(&task.output)
        .bind(status_to_str(task.status))
        .bind(&task.error)
        .bind(metadata)
        .bind(task.updated_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        Ok(task)
    }

    async fn complete_task(&self, id: Uuid, output: serde_json::Value) -> LedgerResult<Task> {
        let mut task = self.fetch_task(id).await?.ok_or(LedgerError::NotFound(id))?;
        if !task.status.can_transition_to(TaskStatus::Completed) {
            return Err(LedgerError::InvalidTransition {
                from: task.status,
                to: TaskStatus::Completed,
            });
        }
        task.status = TaskStatus::Completed;
        task.output = Some(output);
        self.update_task(task).await
    }

    async fn fail_task(&self, id: Uuid, error: String) -> LedgerResult<Task> {
        let mut task = self.fetch_task(id).await?.ok_or(LedgerError::NotFound(id))?;
        if !task.status.can_transition_to(TaskStatus::Failed) {
            return Err(LedgerError::InvalidTransition {
                from: task.status,
                to: TaskStatus::Failed,
            });
        }
        task.status = TaskStatus::Failed;
        task.error = Some(error);
        self.update_task(task).await
    }

    async fn delete_task(&self, id: Uuid) -> LedgerResult<()> {
        let result = sqlx::query("DELETE FROM taskmesh_tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(id));
        }
        Ok(())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> LedgerResult<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM taskmesh_tasks")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        let tasks: Vec<Task> = rows
            .iter()
            .map(row_to_task)
            .collect::<LedgerResult<Vec<_>>>()?
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect();
        Ok(apply_sort_and_page(tasks, filter))
    }

    async fn record_progress(&self, update: ProgressUpdate) -> LedgerResult<()> {
        let metadata = serde_json::to_value(&update.metadata).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        sqlx::query(
            "INSERT INTO taskmesh_task_progress (task_id, agent_id, status, message, metadata, recorded_at)
             VALUES ($1,$2,$3,$4,$5,$6)",
        )
        .bind(update.task_id)
        .bind(&update.agent_id)
        .bind(status_to_str(update.status))
        .bind(&update.message)
        .bind(metadata)
        .bind(update.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_progress(&self, task_id: Uuid) -> LedgerResult<Vec<ProgressUpdate>> {
        let rows = sqlx::query(
            "SELECT task_id, agent_id, status, message, metadata, recorded_at
             FROM taskmesh_task_progress WHERE task_id = $1 ORDER BY recorded_at ASC, id ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let status_str: String = row.try_get("status").map_err(|e| LedgerError::Storage(e.to_string()))?;
                let metadata_json: serde_json::Value = row.try_get("metadata").map_err(|e| LedgerError::Storage(e.to_string()))?;
                Ok(ProgressUpdate {
                    task_id: row.try_get("task_id").map_err(|e| LedgerError::Storage(e.to_string()))?,
                    agent_id: row.try_get("agent_id").map_err(|e| LedgerError::Storage(e.to_string()))?,
                    status: status_from_str(&status_str)?,
                    message: row.try_get("message").map_err(|e| LedgerError::Storage(e.to_string()))?,
                    metadata: serde_json::from_value(metadata_json).map_err(|e| LedgerError::Serialization(e.to_string()))?,
                    recorded_at: row.try_get("recorded_at").map_err(|e| LedgerError::Storage(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn get_latest_progress(&self, task_id: Uuid) -> LedgerResult<Option<ProgressUpdate>> {
        Ok(self.get_progress(task_id).await?.into_iter().last())
    }

    async fn purge_completed_tasks(&self, older_than: DateTime<Utc>) -> LedgerResult<u64> {
        let result = sqlx::query(
            "DELETE FROM taskmesh_tasks WHERE status IN ('completed', 'failed', 'cancelled') AND completed_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn purge_progress(&self, older_than: DateTime<Utc>) -> LedgerResult<u64> {
        let result = sqlx::query("DELETE FROM taskmesh_task_progress WHERE recorded_at < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn health(&self) -> LedgerResult<bool> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| LedgerError::Storage(e.to_string()))
    }

    async fn stats(&self) -> LedgerResult<LedgerStats> {
        let row = sqlx::query(
            "SELECT
                count(*) FILTER (WHERE true) AS total,
                count(*) FILTER (WHERE status IN ('pending','assigned')) AS pending,
                count(*) FILTER (WHERE status = 'in_progress') AS in_progress,
                count(*) FILTER (WHERE status = 'completed') AS completed,
                count(*) FILTER (WHERE status IN ('failed','cancelled')) AS failed
             FROM taskmesh_tasks",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        Ok(LedgerStats {
            total_tasks: row.try_get::<i64, _>("total").map_err(|e| LedgerError::Storage(e.to_string()))? as u64,
            pending: row.try_get::<i64, _>("pending").map_err(|e| LedgerError::Storage(e.to_string()))? as u64,
            in_progress: row.try_get::<i64, _>("in_progress").map_err(|e| LedgerError::Storage(e.to_string()))? as u64,
            completed: row.try_get::<i64, _>("completed").map_err(|e| LedgerError::Storage(e.to_string()))? as u64,
            failed: row.try_get::<i64, _>("failed").map_err(|e| LedgerError::Storage(e.to_string()))? as u64,
        })
    }

    async fn close(&self) -> LedgerResult<()> {
        self.pool.close().await;
        Ok(())
    }
}
