use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskmesh_shared::model::TaskStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Listing filter (spec §4.3): `status ∈ set AND assigned_to= AND
/// created_by= AND created_at between AND updated_at between`, with
/// deterministic pagination and sort.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status_in: Option<HashSet<TaskStatus>>,
    pub assigned_to: Option<String>,
    pub created_by: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub updated_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matches(&self, task: &taskmesh_shared::model::Task) -> bool {
        if let Some(statuses) = &self.status_in {
            if !statuses.contains(&task.status) {
                return false;
            }
        }
        if let Some(assigned_to) = &self.assigned_to {
            if task.assigned_to.as_deref() != Some(assigned_to.as_str()) {
                return false;
            }
        }
        if let Some(created_by) = &self.created_by {
            if &task.created_by != created_by {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if task.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if task.created_at > before {
                return false;
            }
        }
        if let Some(after) = self.updated_after {
            if task.updated_at < after {
                return false;
            }
        }
        if let Some(before) = self.updated_before {
            if task.updated_at > before {
                return false;
            }
        }
        true
    }
}

/// Deterministic sort + pagination over an already-filtered snapshot.
pub fn apply_sort_and_page(mut tasks: Vec<taskmesh_shared::model::Task>, filter: &TaskFilter) -> Vec<taskmesh_shared::model::Task> {
    let order = filter.sort_order.unwrap_or(SortOrder::Desc);
    match filter.sort_by.unwrap_or(SortField::CreatedAt) {
        SortField::CreatedAt => tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))),
        SortField::UpdatedAt => tasks.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id))),
        SortField::Priority => tasks.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id))),
    }
    if order == SortOrder::Desc {
        tasks.reverse();
    }

    let offset = filter.offset.min(tasks.len());
    let end = filter.limit.map(|limit| (offset + limit).min(tasks.len())).unwrap_or(tasks.len());
    tasks[offset..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value as Json;
    use taskmesh_shared::model::Task;

    #[test]
    fn sort_is_deterministic_for_equal_keys() {
        let mut tasks = Vec::new();
        for _ in 0..5 {
            tasks.push(Task::new("t", "type", "creator", Json::Null));
        }
        let filter = TaskFilter {
            sort_by: Some(SortField::Priority),
            ..Default::default()
        };
        let first = apply_sort_and_page(tasks.clone(), &filter);
        let second = apply_sort_and_page(tasks, &filter);
        assert_eq!(first.iter().map(|t| t.id).collect::<Vec<_>>(), second.iter().map(|t| t.id).collect::<Vec<_>>());
    }

    #[test]
    fn pagination_respects_limit_and_offset() {
        let tasks: Vec<_> = (0..10).map(|_| Task::new("t", "type", "creator", Json::Null)).collect();
        let filter = TaskFilter {
            limit: Some(3),
            offset: 2,
            ..Default::default()
        };
        let page = apply_sort_and_page(tasks, &filter);
        assert_eq!(page.len(), 3);
    }
}
