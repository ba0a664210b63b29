//! The `ReasoningService` collaborator: spec.md's opaque
//! `Completion(systemPrompt, userPrompt) -> text` dependency (spec §4.8/
//! §9), abstracted as a trait so Plan can be exercised without a live
//! LLM endpoint.

mod http;
mod scripted;

use async_trait::async_trait;

pub use http::HttpReasoningService;
pub use scripted::ScriptedReasoningService;

use crate::error::OrchestratorResult;

#[async_trait]
pub trait ReasoningService: Send + Sync + std::fmt::Debug {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> OrchestratorResult<String>;
}
