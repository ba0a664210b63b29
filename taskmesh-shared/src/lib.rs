//! Shared data model, configuration, error taxonomy, and observability
//! seam used by every taskmesh crate.

pub mod config;
pub mod error;
pub mod model;
pub mod observability;
pub mod resilience;

pub use error::{TaskMeshError, TaskMeshResult};
pub use observability::{EventLevel, NoopTelemetry, Telemetry, TracingTelemetry};
