//! Load balancer strategy configuration (spec §4.6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancerStrategy {
    RoundRobin,
    LeastLoaded,
    Random,
    CapabilityBest,
    LatencyBased,
    WeightedRoundRobin,
}

impl Default for LoadBalancerStrategy {
    fn default() -> Self {
        Self::CapabilityBest
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    pub strategy: LoadBalancerStrategy,
    /// Exponential smoothing factor for `capability_best` historical weight.
    pub weight_decay_factor: f64,
    /// Rolling window size for `latency_based`.
    pub tracking_window_size: usize,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            strategy: LoadBalancerStrategy::default(),
            weight_decay_factor: 0.9,
            tracking_window_size: 20,
        }
    }
}
