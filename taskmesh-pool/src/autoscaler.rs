//! `Autoscaler` (spec C7 / §4.7): hysteresis + cooldown-gated scaling
//! decisions derived from [`PoolStats`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use taskmesh_shared::config::autoscaler::AutoscalerConfig;

use crate::stats::PoolStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
    ScaleUp(usize),
    ScaleDown(usize),
    NoAction,
}

#[derive(Debug)]
struct CooldownState {
    last_scale_up: Option<DateTime<Utc>>,
    last_scale_down: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct Autoscaler {
    config: AutoscalerConfig,
    scale_up_counter: AtomicU32,
    scale_down_counter: AtomicU32,
    cooldowns: Mutex<CooldownState>,
}

impl Autoscaler {
    pub fn new(config: AutoscalerConfig) -> Self {
        Self {
            config,
            scale_up_counter: AtomicU32::new(0),
            scale_down_counter: AtomicU32::new(0),
            cooldowns: Mutex::new(CooldownState {
                last_scale_up: None,
                last_scale_down: None,
            }),
        }
    }

    /// Evaluates one tick of the evaluation loop against `stats`. Pure
    /// with respect to the pool (callers apply the returned decision via
    /// `WorkerPool::scale_up`/`scale_down`); the hysteresis counters and
    /// cooldown clocks are the only mutated state.
    pub fn evaluate(&self, stats: &PoolStats) -> ScalingDecision {
        let idle_workers = stats.idle;
        let scale_up_trigger = stats.pending_tasks as usize > self.config.max_queue_depth
            || stats.utilization > self.config.max_utilization
            || idle_workers < self.config.min_idle_workers;
        let scale_down_trigger =
            (stats.pending_tasks as usize) < self.config.min_queue_depth && stats.utilization < self.config.min_utilization;

        if scale_up_trigger {
            self.scale_down_counter.store(0, Ordering::Relaxed);
            let count = self.scale_up_counter.fetch_add(1, Ordering::Relaxed) + 1;
            if count >= self.config.scale_up_threshold && self.cooldown_elapsed_for_scale_up() {
                return self.bounded_scale_up(stats.total);
            }
            return ScalingDecision::NoAction;
        }

        if scale_down_trigger {
            self.scale_up_counter.store(0, Ordering::Relaxed);
            let count = self.scale_down_counter.fetch_add(1, Ordering::Relaxed) + 1;
            if count >= self.config.scale_down_threshold && self.cooldown_elapsed_for_scale_down() {
                return self.bounded_scale_down(stats.total);
            }
            return ScalingDecision::NoAction;
        }

        self.scale_up_counter.store(0, Ordering::Relaxed);
        self.scale_down_counter.store(0, Ordering::Relaxed);
        ScalingDecision::NoAction
    }

    fn cooldown_elapsed_for_scale_up(&self) -> bool {
        let state = self.cooldowns.lock().expect("autoscaler cooldown lock poisoned");
        match state.last_scale_up {
            None => true,
            Some(last) => Utc::now().signed_duration_since(last).to_std().unwrap_or_default() >= self.config.scale_up_cooldown,
        }
    }

    fn cooldown_elapsed_for_scale_down(&self) -> bool {
        let state = self.cooldowns.lock().expect("autoscaler cooldown lock poisoned");
        match state.last_scale_down {
            None => true,
            Some(last) => Utc::now().signed_duration_since(last).to_std().unwrap_or_default() >= self.config.scale_down_cooldown,
        }
    }

    fn bounded_scale_up(&self, current_total: usize) -> ScalingDecision {
        let headroom = self.config.max_workers.saturating_sub(current_total);
        let step = self.config.scale_up_step.min(headroom);
        self.scale_up_counter.store(0, Ordering::Relaxed);
        if step == 0 {
            return ScalingDecision::NoAction;
        }
        self.cooldowns.lock().expect("autoscaler cooldown lock poisoned").last_scale_up = Some(Utc::now());
        ScalingDecision::ScaleUp(step)
    }

    fn bounded_scale_down(&self, current_total: usize) -> ScalingDecision {
        let floor = current_total.saturating_sub(self.config.min_workers);
        let step = self.config.scale_down_step.min(floor);
        self.scale_down_counter.store(0, Ordering::Relaxed);
        if step == 0 {
            return ScalingDecision::NoAction;
        }
        self.cooldowns.lock().expect("autoscaler cooldown lock poisoned").last_scale_down = Some(Utc::now());
        ScalingDecision::ScaleDown(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AutoscalerConfig {
        AutoscalerConfig {
            scale_up_threshold: 2,
            scale_down_threshold: 2,
            ..AutoscalerConfig::default()
        }
    }

    fn overloaded_stats() -> PoolStats {
        PoolStats {
            total: 5,
            busy: 5,
            idle: 0,
            utilization: 1.0,
            pending_tasks: 100,
            ..Default::default()
        }
    }

    #[test]
    fn scale_up_requires_consecutive_threshold_ticks() {
        let autoscaler = Autoscaler::new(config());
        assert_eq!(autoscaler.evaluate(&overloaded_stats()), ScalingDecision::NoAction);
        assert_eq!(autoscaler.evaluate(&overloaded_stats()), ScalingDecision::ScaleUp(2));
    }

    #[test]
    fn idle_evaluation_resets_counters() {
        let autoscaler = Autoscaler::new(config());
        autoscaler.evaluate(&overloaded_stats());
        let calm = PoolStats {
            total: 5,
            idle: 5,
            utilization: 0.5,
            pending_tasks: 10,
            ..Default::default()
        };
        autoscaler.evaluate(&calm);
        assert_eq!(autoscaler.evaluate(&overloaded_stats()), ScalingDecision::NoAction);
    }

    #[test]
    fn scale_up_step_is_clamped_to_max_workers() {
        let mut cfg = config();
        cfg.max_workers = 6;
        let autoscaler = Autoscaler::new(cfg);
        let stats = PoolStats {
            total: 5,
            ..overloaded_stats()
        };
        autoscaler.evaluate(&stats);
        assert_eq!(autoscaler.evaluate(&stats), ScalingDecision::ScaleUp(1));
    }
}
