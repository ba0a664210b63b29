//! The six selection strategies named in spec §4.6.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{eligible_candidates, LoadBalancer};
use crate::error::PoolResult;
use crate::record::WorkerRecord;

const ASSUMED_NEW_WORKER_LATENCY: Duration = Duration::from_secs(5);
const FAST_SUCCESS_THRESHOLD: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    counter: AtomicUsize,
}

#[async_trait]
impl LoadBalancer for RoundRobinBalancer {
    async fn select_worker(&self, task_type: &str, candidates: &[WorkerRecord]) -> PoolResult<String> {
        let eligible = eligible_candidates(task_type, candidates)?;
        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % eligible.len();
        Ok(eligible[idx].metadata.agent_id.clone())
    }

    async fn record_result(&self, _worker_id: &str, _task_type: &str, _duration: Duration, _err: Option<&str>) {}
}

/// Tracks a per-worker counter incremented on successful completions
/// (spec §4.6: "increment on RecordResult with err=nil") and picks the
/// worker with the lowest count, spreading successful completions evenly.
#[derive(Debug, Default)]
pub struct LeastLoadedBalancer {
    load: DashMap<String, i64>,
}

#[async_trait]
impl LoadBalancer for LeastLoadedBalancer {
    async fn select_worker(&self, task_type: &str, candidates: &[WorkerRecord]) -> PoolResult<String> {
        let eligible = eligible_candidates(task_type, candidates)?;
        let picked = eligible
            .iter()
            .min_by_key(|w| self.load.get(&w.metadata.agent_id).map(|c| *c).unwrap_or(0))
            .expect("eligible is non-empty");
        Ok(picked.metadata.agent_id.clone())
    }

    async fn record_result(&self, worker_id: &str, _task_type: &str, _duration: Duration, err: Option<&str>) {
        if err.is_none() {
            *self.load.entry(worker_id.to_string()).or_insert(0) += 1;
        }
    }
}

#[derive(Debug)]
pub struct RandomBalancer;

#[async_trait]
impl LoadBalancer for RandomBalancer {
    async fn select_worker(&self, task_type: &str, candidates: &[WorkerRecord]) -> PoolResult<String> {
        let eligible = eligible_candidates(task_type, candidates)?;
        let idx = fastrand::usize(0..eligible.len());
        Ok(eligible[idx].metadata.agent_id.clone())
    }

    async fn record_result(&self, _worker_id: &str, _task_type: &str, _duration: Duration, _err: Option<&str>) {}
}

/// Default strategy (spec §4.6): weight = base x capability-match bonus
/// x historical weight x busy penalty, historical weight updated by
/// exponential smoothing keyed on `(task_type, worker_id)`.
#[derive(Debug)]
pub struct CapabilityBestBalancer {
    weight_decay_factor: f64,
    historical: DashMap<(String, String), f64>,
}

impl CapabilityBestBalancer {
    pub fn new(weight_decay_factor: f64) -> Self {
        Self {
            weight_decay_factor,
            historical: DashMap::new(),
        }
    }

    fn historical_weight(&self, task_type: &str, worker_id: &str) -> f64 {
        self.historical.get(&(task_type.to_string(), worker_id.to_string())).map(|w| *w).unwrap_or(1.0)
    }
}

#[async_trait]
impl LoadBalancer for CapabilityBestBalancer {
    async fn select_worker(&self, task_type: &str, candidates: &[WorkerRecord]) -> PoolResult<String> {
        let eligible = eligible_candidates(task_type, candidates)?;
        let picked = eligible
            .iter()
            .max_by(|a, b| {
                let wa = self.weight(task_type, a);
                let wb = self.weight(task_type, b);
                wa.partial_cmp(&wb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("eligible is non-empty");
        Ok(picked.metadata.agent_id.clone())
    }

    async fn record_result(&self, worker_id: &str, task_type: &str, duration: Duration, err: Option<&str>) {
        let sample = match err {
            None if duration < FAST_SUCCESS_THRESHOLD => 1.5,
            None => 1.2,
            Some(_) => 0.5,
        };
        let key = (task_type.to_string(), worker_id.to_string());
        let mut entry = self.historical.entry(key).or_insert(1.0);
        *entry = *entry * self.weight_decay_factor + sample * (1.0 - self.weight_decay_factor);
    }
}

impl CapabilityBestBalancer {
    fn weight(&self, task_type: &str, worker: &WorkerRecord) -> f64 {
        use taskmesh_shared::model::AgentStatus;
        let capability_bonus = if worker.metadata.capabilities.contains(task_type) { 2.0 } else { 1.0 };
        let busy_penalty = if worker.metadata.status == AgentStatus::Busy { 0.5 } else { 1.0 };
        1.0 * capability_bonus * self.historical_weight(task_type, &worker.metadata.agent_id) * busy_penalty
    }
}

/// Picks the worker with the lowest rolling-average latency; new
/// workers without samples yet are assumed to take 5s (spec §4.6).
#[derive(Debug)]
pub struct LatencyBasedBalancer {
    window_size: usize,
    samples: DashMap<String, VecDeque<Duration>>,
}

impl LatencyBasedBalancer {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            samples: DashMap::new(),
        }
    }

    fn average(&self, worker_id: &str) -> Duration {
        match self.samples.get(worker_id) {
            Some(window) if !window.is_empty() => {
                let total: Duration = window.iter().sum();
                total / window.len() as u32
            }
            _ => ASSUMED_NEW_WORKER_LATENCY,
        }
    }
}

#[async_trait]
impl LoadBalancer for LatencyBasedBalancer {
    async fn select_worker(&self, task_type: &str, candidates: &[WorkerRecord]) -> PoolResult<String> {
        let eligible = eligible_candidates(task_type, candidates)?;
        let picked = eligible
            .iter()
            .min_by_key(|w| self.average(&w.metadata.agent_id))
            .expect("eligible is non-empty");
        Ok(picked.metadata.agent_id.clone())
    }

    async fn record_result(&self, worker_id: &str, _task_type: &str, duration: Duration, _err: Option<&str>) {
        let mut window = self.samples.entry(worker_id.to_string()).or_default();
        window.push_back(duration);
        while window.len() > self.window_size {
            window.pop_front();
        }
    }
}

/// Smooth weighted round robin: each tick adds its static weight to a
/// running counter and the highest counter wins, then is discounted by
/// the sum of all weights (spec §4.6).
#[derive(Debug, Default)]
pub struct WeightedRoundRobinBalancer {
    weight: DashMap<String, i64>,
    current: DashMap<String, i64>,
}

impl WeightedRoundRobinBalancer {
    fn weight_of(&self, worker_id: &str) -> i64 {
        self.weight.get(worker_id).map(|w| *w).unwrap_or(1)
    }
}

#[async_trait]
impl LoadBalancer for WeightedRoundRobinBalancer {
    async fn select_worker(&self, task_type: &str, candidates: &[WorkerRecord]) -> PoolResult<String> {
        let eligible = eligible_candidates(task_type, candidates)?;
        let total_weight: i64 = eligible.iter().map(|w| self.weight_of(&w.metadata.agent_id)).sum();

        for worker in &eligible {
            let id = &worker.metadata.agent_id;
            let w = self.weight_of(id);
            *self.current.entry(id.clone()).or_insert(0) += w;
        }

        let picked = eligible
            .iter()
            .max_by_key(|w| self.current.get(&w.metadata.agent_id).map(|c| *c).unwrap_or(0))
            .expect("eligible is non-empty");
        let picked_id = picked.metadata.agent_id.clone();
        *self.current.entry(picked_id.clone()).or_insert(0) -= total_weight;
        Ok(picked_id)
    }

    async fn record_result(&self, worker_id: &str, _task_type: &str, duration: Duration, err: Option<&str>) {
        let mut w = self.weight.entry(worker_id.to_string()).or_insert(1);
        if err.is_none() && duration < FAST_SUCCESS_THRESHOLD {
            *w += 1;
        } else if err.is_some() {
            *w = (*w - 1).max(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_shared::model::{AgentMetadata, AgentRole};

    fn worker(id: &str, capability: &str) -> WorkerRecord {
        WorkerRecord::new(AgentMetadata::new(id, AgentRole::Worker, [capability.to_string()]))
    }

    #[tokio::test]
    async fn round_robin_cycles_through_eligible_workers() {
        let balancer = RoundRobinBalancer::default();
        let candidates = vec![worker("a", "research"), worker("b", "research")];
        let first = balancer.select_worker("research", &candidates).await.unwrap();
        let second = balancer.select_worker("research", &candidates).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn capability_best_prefers_exact_capability_match() {
        let balancer = CapabilityBestBalancer::new(0.9);
        let candidates = vec![worker("generalist", "general"), worker("specialist", "research")];
        let picked = balancer.select_worker("research", &candidates).await.unwrap();
        assert_eq!(picked, "specialist");
    }

    #[tokio::test]
    async fn empty_candidates_yields_no_worker_available() {
        let balancer = RoundRobinBalancer::default();
        assert!(matches!(
            balancer.select_worker("research", &[]).await,
            Err(crate::error::PoolError::NoWorkerAvailable)
        ));
    }

    #[tokio::test]
    async fn no_capability_match_yields_no_capable_worker() {
        let balancer = RoundRobinBalancer::default();
        let candidates = vec![worker("a", "research")];
        assert!(matches!(
            balancer.select_worker("content_creation", &candidates).await,
            Err(crate::error::PoolError::NoCapableWorker)
        ));
    }
}
