//! Builds the subtask DAG from name-based `dependencies` (spec §4.8
//! "Dispatch": "build a DAG from dependencies (by name, then resolve to
//! ids after creation)").

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use taskmesh_shared::model::Task;

/// Maps each subtask's ledger-assigned id back to its plan name, and
/// resolves every dependency name to the corresponding id.
#[derive(Debug, Default)]
pub struct Dag {
    name_to_id: HashMap<String, Uuid>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, id: Uuid) {
        self.name_to_id.insert(name.to_string(), id);
    }

    pub fn id_of(&self, name: &str) -> Option<Uuid> {
        self.name_to_id.get(name).copied()
    }

    pub fn resolve_dependencies(&self, dependency_names: &[String]) -> Vec<Uuid> {
        dependency_names.iter().filter_map(|name| self.id_of(name)).collect()
    }

    /// Subtasks whose dependencies are all in `completed` and are not
    /// themselves already completed, dispatched, or waiting out a retry
    /// backoff (`unavailable` covers both of the latter).
    pub fn ready_tasks<'a>(tasks: &'a [Task], completed: &HashSet<Uuid>, unavailable: &HashSet<Uuid>) -> Vec<&'a Task> {
        tasks
            .iter()
            .filter(|t| !completed.contains(&t.id) && !unavailable.contains(&t.id) && t.is_ready(completed))
            .collect()
    }
}
