//! Circuit breaker used to gate transport-fatal failure classes (spec §7:
//! "Transport fatal ... propagate; circuit open optional").

mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
