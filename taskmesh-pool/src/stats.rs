//! Pool-wide statistics (spec §4.5: "Stats returned").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub total: usize,
    pub busy: usize,
    pub idle: usize,
    /// `busy / total`, defined as `0.0` when `total == 0`.
    pub utilization: f64,
    pub capabilities: HashMap<String, usize>,
    /// Supplied by the caller (e.g. the orchestrator's dispatch queue
    /// depth) since the pool itself has no notion of pending work.
    pub pending_tasks: u64,
}
