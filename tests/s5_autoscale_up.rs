//! S5: sustained overload for `scale_up_threshold` consecutive ticks
//! grows the pool by `scale_up_step`; a second scale-up is suppressed
//! until the cooldown elapses.

use std::sync::Arc;

use taskmesh_pool::{Autoscaler, ScalingDecision, WorkerPool, WorkerPoolConfig};
use taskmesh_shared::config::autoscaler::AutoscalerConfig;

#[test]
fn pool_grows_on_the_third_consecutive_overloaded_tick() {
    let config = AutoscalerConfig {
        min_workers: 2,
        max_queue_depth: 50,
        scale_up_step: 2,
        ..AutoscalerConfig::default()
    };
    let autoscaler = Autoscaler::new(config.clone());
    let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::default()));
    for _ in 0..config.min_workers {
        pool.scale_up(1, "research").unwrap();
    }
    assert_eq!(pool.get_worker_count(), 2);

    let mut applied = Vec::new();
    for tick in 1..=3 {
        let stats = pool.get_stats(60);
        let decision = autoscaler.evaluate(&stats);
        applied.push(decision);
        if let ScalingDecision::ScaleUp(n) = decision {
            pool.scale_up(n, "research").unwrap();
        }
    }

    assert_eq!(applied[0], ScalingDecision::NoAction);
    assert_eq!(applied[1], ScalingDecision::NoAction);
    assert_eq!(applied[2], ScalingDecision::ScaleUp(2));
    assert_eq!(pool.get_worker_count(), 4);

    // Three more overloaded ticks retrigger the threshold, but the
    // cooldown from the scale-up above hasn't elapsed yet, so it's
    // suppressed.
    for _ in 0..3 {
        let stats = pool.get_stats(60);
        assert_eq!(autoscaler.evaluate(&stats), ScalingDecision::NoAction);
    }
    assert_eq!(pool.get_worker_count(), 4);
}
