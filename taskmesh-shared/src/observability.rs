//! Injected observability surface.
//!
//! Global state: none. Observability (logger, metrics, tracer) is
//! injected; tests pass a no-op implementation. `Telemetry` is the single
//! object-safe seam every component accepts as `Arc<dyn Telemetry>`, in
//! the style of a `MetricsCollector` trait plus a
//! `PrometheusMetricsExporter`-style default and a silent test double.

use std::fmt::Debug;

/// Severity for a structured event passed to [`Telemetry::event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Uniform observability seam: structured events, counters, and timing.
///
/// Object-safe so it can be held as `Arc<dyn Telemetry>` and shared freely
/// across component boundaries without generics infecting every type.
pub trait Telemetry: Send + Sync + Debug {
    /// Emit a structured, leveled event with a component tag.
    fn event(&self, level: EventLevel, component: &str, message: &str);

    /// Increment a named counter by `delta`.
    fn counter(&self, name: &str, delta: u64);

    /// Record an observed duration against a named histogram-ish metric.
    fn timing(&self, name: &str, millis: f64);
}

/// Default production telemetry: routes everything through the `tracing`
/// crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn event(&self, level: EventLevel, component: &str, message: &str) {
        match level {
            EventLevel::Debug => tracing::debug!(component, "{message}"),
            EventLevel::Info => tracing::info!(component, "{message}"),
            EventLevel::Warn => tracing::warn!(component, "{message}"),
            EventLevel::Error => tracing::error!(component, "{message}"),
        }
    }

    fn counter(&self, name: &str, delta: u64) {
        tracing::debug!(metric = name, delta, "counter");
    }

    fn timing(&self, name: &str, millis: f64) {
        tracing::debug!(metric = name, millis, "timing");
    }
}

/// Silent telemetry used by unit tests so assertions aren't drowned in
/// log noise and so tests don't depend on a subscriber being installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn event(&self, _level: EventLevel, _component: &str, _message: &str) {}
    fn counter(&self, _name: &str, _delta: u64) {}
    fn timing(&self, _name: &str, _millis: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_telemetry_is_inert() {
        let t = NoopTelemetry;
        t.event(EventLevel::Error, "test", "should not panic");
        t.counter("c", 1);
        t.timing("t", 1.0);
    }
}
