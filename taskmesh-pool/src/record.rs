//! A single tracked worker: its registration metadata plus the
//! heartbeat timestamp the supervisor task watches (spec §4.5).

use chrono::{DateTime, Utc};

use taskmesh_shared::model::AgentMetadata;

#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub metadata: AgentMetadata,
    pub last_heartbeat: DateTime<Utc>,
}

impl WorkerRecord {
    pub fn new(metadata: AgentMetadata) -> Self {
        Self {
            metadata,
            last_heartbeat: Utc::now(),
        }
    }

    pub fn touch_heartbeat(&mut self) {
        self.last_heartbeat = Utc::now();
    }
}
