use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;

use super::ReasoningService;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    system_prompt: &'a str,
    user_prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    text: String,
}

/// Production adapter: calls out to an HTTP reasoning endpoint (the
/// planner's LLM front door) via a single shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpReasoningService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReasoningService {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ReasoningService for HttpReasoningService {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, OrchestratorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&CompletionRequest { system_prompt, user_prompt })
            .send()
            .await
            .map_err(|e| OrchestratorError::Planning(e.to_string()))?;

        let body: CompletionResponse = response
            .error_for_status()
            .map_err(|e| OrchestratorError::Planning(e.to_string()))?
            .json()
            .await
            .map_err(|e| OrchestratorError::Planning(e.to_string()))?;

        Ok(body.text)
    }
}
