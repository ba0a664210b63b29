//! Orchestrator configuration (spec §4.8, defaults per spec §6).

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_concurrent_tasks: usize,
    pub task_timeout: Duration,
    pub enable_replanning: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            max_concurrent_tasks: 5,
            task_timeout: Duration::from_secs(5 * 60),
            enable_replanning: true,
        }
    }
}
