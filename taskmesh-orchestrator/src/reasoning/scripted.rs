use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::OrchestratorError;

use super::ReasoningService;

/// Deterministic test double: returns pre-programmed plan JSON in order,
/// repeating the last response once the queue is drained (spec §8 seed
/// tests require no external reasoning service).
#[derive(Debug)]
pub struct ScriptedReasoningService {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedReasoningService {
    pub fn new(responses: impl IntoIterator<Item = String>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoningService {
    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, OrchestratorError> {
        let mut queue = self.responses.lock().expect("scripted reasoning lock poisoned");
        queue
            .pop_front()
            .ok_or_else(|| OrchestratorError::Planning("scripted reasoning service exhausted its responses".to_string()))
    }
}
