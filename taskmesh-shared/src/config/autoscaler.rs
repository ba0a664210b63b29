//! Autoscaler policy configuration (spec §4.7).
//!
//! Spec §6 fixes `min_workers`/`max_workers` defaults (2/20); the
//! remaining thresholds are only pinned by example in spec §8 scenario
//! S5 (`MaxQueueDepth=50`, `ScaleUpStep=2`). Those are adopted below as
//! the implementer defaults and recorded as such in DESIGN.md.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoscalerConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub max_queue_depth: usize,
    pub min_queue_depth: usize,
    pub max_utilization: f64,
    pub min_utilization: f64,
    pub min_idle_workers: usize,
    pub scale_up_threshold: u32,
    pub scale_down_threshold: u32,
    pub scale_up_cooldown: Duration,
    pub scale_down_cooldown: Duration,
    pub scale_up_step: usize,
    pub scale_down_step: usize,
    pub evaluation_interval: Duration,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: 20,
            max_queue_depth: 50,
            min_queue_depth: 5,
            max_utilization: 0.8,
            min_utilization: 0.2,
            min_idle_workers: 1,
            scale_up_threshold: 3,
            scale_down_threshold: 3,
            scale_up_cooldown: Duration::from_secs(60),
            scale_down_cooldown: Duration::from_secs(120),
            scale_up_step: 2,
            scale_down_step: 1,
            evaluation_interval: Duration::from_secs(10),
        }
    }
}
