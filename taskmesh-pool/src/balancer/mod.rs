//! `LoadBalancer` (spec C6 / §4.6): selects an eligible worker for a
//! task and folds dispatch results back into per-strategy weights.

mod strategies;

use std::time::Duration;

use async_trait::async_trait;

use taskmesh_shared::config::balancer::{LoadBalancerConfig, LoadBalancerStrategy};
use taskmesh_shared::model::AgentStatus;

use crate::error::{PoolError, PoolResult};
use crate::record::WorkerRecord;

pub use strategies::{CapabilityBestBalancer, LatencyBasedBalancer, LeastLoadedBalancer, RandomBalancer, RoundRobinBalancer, WeightedRoundRobinBalancer};

#[async_trait]
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    async fn select_worker(&self, task_type: &str, candidates: &[WorkerRecord]) -> PoolResult<String>;

    async fn record_result(&self, worker_id: &str, task_type: &str, duration: Duration, err: Option<&str>);
}

/// Common eligibility filter (spec §4.6): idle AND (exact capability
/// match OR the `"general"` wildcard).
pub fn eligible_candidates<'a>(task_type: &str, candidates: &'a [WorkerRecord]) -> PoolResult<Vec<&'a WorkerRecord>> {
    if candidates.is_empty() {
        return Err(PoolError::NoWorkerAvailable);
    }
    let eligible: Vec<&WorkerRecord> = candidates
        .iter()
        .filter(|w| w.metadata.status == AgentStatus::Idle && w.metadata.can_handle(task_type))
        .collect();
    if eligible.is_empty() {
        return Err(PoolError::NoCapableWorker);
    }
    Ok(eligible)
}

pub fn build_balancer(config: &LoadBalancerConfig) -> Box<dyn LoadBalancer> {
    match config.strategy {
        LoadBalancerStrategy::RoundRobin => Box::new(RoundRobinBalancer::default()),
        LoadBalancerStrategy::LeastLoaded => Box::new(LeastLoadedBalancer::default()),
        LoadBalancerStrategy::Random => Box::new(RandomBalancer),
        LoadBalancerStrategy::CapabilityBest => Box::new(CapabilityBestBalancer::new(config.weight_decay_factor)),
        LoadBalancerStrategy::LatencyBased => Box::new(LatencyBasedBalancer::new(config.tracking_window_size)),
        LoadBalancerStrategy::WeightedRoundRobin => Box::new(WeightedRoundRobinBalancer::default()),
    }
}
