//! `WorkerPool` (spec C5 / §4.5): lifecycle, capability index, and
//! heartbeat supervision over registered workers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use taskmesh_shared::model::{AgentMetadata, AgentStatus};

use crate::error::{PoolError, PoolResult};
use crate::record::WorkerRecord;
use crate::stats::PoolStats;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub health_check_interval: Duration,
    pub heartbeat_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct WorkerPool {
    workers: DashMap<String, WorkerRecord>,
    capability_index: DashMap<String, HashSet<String>>,
    config: WorkerPoolConfig,
    cancellation: CancellationToken,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self {
            workers: DashMap::new(),
            capability_index: DashMap::new(),
            config,
            cancellation: CancellationToken::new(),
        }
    }

    /// Spawns the heartbeat supervisor. Marks any worker whose
    /// `last_heartbeat` has exceeded `heartbeat_timeout` as `failed`
    /// (spec §4.5 invariant).
    pub fn start(self: &Arc<Self>) {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.config.health_check_interval);
            loop {
                tokio::select! {
                    _ = pool.cancellation.cancelled() => break,
                    _ = ticker.tick() => pool.sweep_stale_heartbeats(),
                }
            }
        });
    }

    pub fn stop(&self) {
        self.cancellation.cancel();
    }

    fn sweep_stale_heartbeats(&self) {
        let now = Utc::now();
        for mut entry in self.workers.iter_mut() {
            let age = now.signed_duration_since(entry.last_heartbeat);
            if age.to_std().unwrap_or_default() > self.config.heartbeat_timeout && entry.metadata.status != AgentStatus::Failed {
                entry.metadata.status = AgentStatus::Failed;
                error!(agent_id = %entry.metadata.agent_id, "worker heartbeat timed out, marked failed");
            }
        }
    }

    /// Registers a worker, auto-assigning an id if `metadata.agent_id` is empty.
    pub fn add_worker(&self, mut metadata: AgentMetadata) -> PoolResult<String> {
        if metadata.agent_id.is_empty() {
            metadata.agent_id = Uuid::now_v7().to_string();
        }
        let id = metadata.agent_id.clone();
        if self.workers.contains_key(&id) {
            return Err(PoolError::AlreadyExists(id));
        }
        for capability in &metadata.capabilities {
            self.capability_index.entry(capability.clone()).or_default().insert(id.clone());
        }
        self.workers.insert(id.clone(), WorkerRecord::new(metadata));
        info!(agent_id = %id, "worker registered");
        Ok(id)
    }

    /// Removes a worker from the capability index before dropping its slot
    /// (spec §4.5 invariant ordering).
    pub fn remove_worker(&self, id: &str) -> PoolResult<()> {
        let (_, record) = self.workers.remove(id).ok_or_else(|| PoolError::NotFound(id.to_string()))?;
        for capability in &record.metadata.capabilities {
            if let Some(mut members) = self.capability_index.get_mut(capability) {
                members.remove(id);
            }
        }
        Ok(())
    }

    pub fn get_worker(&self, id: &str) -> Option<WorkerRecord> {
        self.workers.get(id).map(|entry| entry.clone())
    }

    pub fn get_workers_by_capability(&self, capability: &str) -> Vec<WorkerRecord> {
        self.capability_index
            .get(capability)
            .map(|members| members.iter().filter_map(|id| self.get_worker(id)).collect())
            .unwrap_or_default()
    }

    pub fn get_idle_workers(&self, capability: &str, limit: usize) -> Vec<WorkerRecord> {
        self.get_workers_by_capability(capability)
            .into_iter()
            .filter(|w| w.metadata.status == AgentStatus::Idle)
            .take(limit)
            .collect()
    }

    pub fn update_worker_status(&self, id: &str, status: AgentStatus) -> PoolResult<()> {
        let mut entry = self.workers.get_mut(id).ok_or_else(|| PoolError::NotFound(id.to_string()))?;
        entry.metadata.status = status;
        entry.touch_heartbeat();
        Ok(())
    }

    pub fn get_all_workers(&self) -> Vec<WorkerRecord> {
        self.workers.iter().map(|entry| entry.clone()).collect()
    }

    pub fn get_worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn get_stats(&self, pending_tasks: u64) -> PoolStats {
        let mut stats = PoolStats {
            pending_tasks,
            ..Default::default()
        };
        for entry in self.workers.iter() {
            stats.total += 1;
            match entry.metadata.status {
                AgentStatus::Busy => stats.busy += 1,
                AgentStatus::Idle => stats.idle += 1,
                _ => {}
            }
            for capability in &entry.metadata.capabilities {
                *stats.capabilities.entry(capability.clone()).or_insert(0) += 1;
            }
        }
        stats.utilization = if stats.total == 0 { 0.0 } else { stats.busy as f64 / stats.total as f64 };
        stats
    }

    /// Registers `n` new idle workers advertising `capability`.
    pub fn scale_up(&self, n: usize, capability: &str) -> PoolResult<Vec<String>> {
        let mut ids = Vec::with_capacity(n);
        for _ in 0..n {
            let metadata = AgentMetadata::new(String::new(), taskmesh_shared::model::AgentRole::Worker, [capability.to_string()]);
            ids.push(self.add_worker(metadata)?);
        }
        Ok(ids)
    }

    /// Removes up to `n` idle workers advertising `capability`. Returns
    /// the ids actually removed, which may be fewer than `n` if not
    /// enough idle candidates exist.
    pub fn scale_down(&self, n: usize, capability: &str) -> PoolResult<Vec<String>> {
        let candidates: Vec<String> = self
            .get_idle_workers(capability, n)
            .into_iter()
            .map(|w| w.metadata.agent_id)
            .collect();
        for id in &candidates {
            self.remove_worker(id)?;
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_shared::model::AgentRole;

    fn worker(capability: &str) -> AgentMetadata {
        AgentMetadata::new(String::new(), AgentRole::Worker, [capability.to_string()])
    }

    #[test]
    fn add_worker_auto_generates_id_and_indexes_capability() {
        let pool = WorkerPool::new(WorkerPoolConfig::default());
        let id = pool.add_worker(worker("research")).unwrap();
        assert!(!id.is_empty());
        assert_eq!(pool.get_workers_by_capability("research").len(), 1);
    }

    #[test]
    fn remove_worker_clears_capability_index() {
        let pool = WorkerPool::new(WorkerPoolConfig::default());
        let id = pool.add_worker(worker("research")).unwrap();
        pool.remove_worker(&id).unwrap();
        assert!(pool.get_workers_by_capability("research").is_empty());
        assert_eq!(pool.get_worker_count(), 0);
    }

    #[test]
    fn stats_compute_utilization_and_capability_counts() {
        let pool = WorkerPool::new(WorkerPoolConfig::default());
        let a = pool.add_worker(worker("research")).unwrap();
        pool.add_worker(worker("research")).unwrap();
        pool.update_worker_status(&a, AgentStatus::Busy).unwrap();

        let stats = pool.get_stats(3);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.busy, 1);
        assert_eq!(stats.idle, 1);
        assert!((stats.utilization - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.capabilities["research"], 2);
        assert_eq!(stats.pending_tasks, 3);
    }

    #[test]
    fn stats_utilization_is_zero_with_no_workers() {
        let pool = WorkerPool::new(WorkerPoolConfig::default());
        assert_eq!(pool.get_stats(0).utilization, 0.0);
    }

    #[test]
    fn scale_down_only_removes_idle_workers() {
        let pool = WorkerPool::new(WorkerPoolConfig::default());
        let busy = pool.add_worker(worker("research")).unwrap();
        pool.add_worker(worker("research")).unwrap();
        pool.update_worker_status(&busy, AgentStatus::Busy).unwrap();

        let removed = pool.scale_down(5, "research").unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(pool.get_worker_count(), 1);
    }
}
