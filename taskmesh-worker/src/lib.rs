//! Worker agent: capability-set task handlers, the human-approval
//! decorator, and the `created -> started -> (idle <-> busy) -> stopped`
//! poll loop that drives them (spec C4 / §4.4).

mod agent;
mod approval;
mod content;
pub mod error;
mod handler;

pub use agent::{WorkerAgent, WorkerState, DEFAULT_POLL_INTERVAL};
pub use approval::{ApprovalGate, FixedApprovalGate, HumanApprovalDecorator};
pub use content::normalize_task_content;
pub use error::{WorkerError, WorkerResult};
pub use handler::{SharedTaskHandler, TaskContext, TaskHandler};
