use crate::llm::LLMClient;
use crate::reasoning::{prompts, ReasoningStage, ReasoningTask};
use crate::types::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Reasoning stage backed by a language model.
pub struct LlmAnalyst {
    client: Arc<dyn LLMClient>,
}

impl LlmAnalyst {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReasoningStage for LlmAnalyst {
    async fn respond(&self, task: &ReasoningTask) -> Result<String> {
        let (system, prompt) = prompts::render(task)?;
        tracing::debug!(
            unit = %task.unit,
            task = %task.name,
            model = %self.client.model_name(),
            "Prompting model"
        );
        self.client.generate_with_system(&system, &prompt).await
    }
}
