//! Reasoning Stage
//!
//! A reasoning stage turns the raw data a pipeline has gathered into one
//! structured record. It is consumed through a narrow capability:
//! [`ReasoningStage::respond`] receives a [`ReasoningTask`] (instruction,
//! declared output schema, visible namespace state) and returns text.
//!
//! Text is never trusted directly. [`Validated`] parses it into the declared
//! record and runs its semantic checks; any failure is a
//! [`ValidationFailure`](crate::types::AppError::ValidationFailure).
//!
//! Two implementations ship:
//!
//! - [`RuleAnalyst`] - deterministic classification rules, the default
//! - [`LlmAnalyst`] - prompts an [`LLMClient`](crate::llm::LLMClient)

pub mod llm_analyst;
pub mod prompts;
pub mod rules;
pub mod validated;

pub use llm_analyst::LlmAnalyst;
pub use rules::RuleAnalyst;
pub use validated::{parse_record, Validated};

use crate::blackboard::UnitId;
use crate::llm::OllamaClient;
use crate::schemas::StageRecord;
use crate::types::Result;
use crate::utils::toml_config::{ReasoningConfig, ReasoningProvider};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Names of the reasoning tasks a worker pipeline issues.
pub mod task_names {
    pub const REGIME_SYNTHESIZER: &str = "regime_synthesizer";
    pub const CANDIDATE_SYNTHESIZER: &str = "candidate_synthesizer";
}

/// One request to a reasoning stage.
#[derive(Debug, Clone)]
pub struct ReasoningTask {
    pub name: String,
    pub unit: UnitId,
    pub instruction: String,
    /// JSON schema the response must conform to
    pub output_schema: Value,
    /// Keys visible in the unit's namespace when the task was issued
    pub state: Map<String, Value>,
}

impl ReasoningTask {
    /// Build a task whose expected output is the record `T`.
    pub fn for_record<T: StageRecord>(
        name: &str,
        unit: &UnitId,
        instruction: &str,
        state: Map<String, Value>,
    ) -> Self {
        Self {
            name: name.to_string(),
            unit: unit.clone(),
            instruction: instruction.to_string(),
            output_schema: T::declared_schema(),
            state,
        }
    }

    pub fn state_value(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }
}

/// Capability that answers a reasoning task with text.
#[async_trait]
pub trait ReasoningStage: Send + Sync {
    async fn respond(&self, task: &ReasoningTask) -> Result<String>;
}

/// Build the analyst selected by configuration.
pub fn build_analyst(config: &ReasoningConfig) -> Result<Arc<dyn ReasoningStage>> {
    match config.provider {
        ReasoningProvider::Rules => Ok(Arc::new(RuleAnalyst::new())),
        ReasoningProvider::Ollama => {
            let client = OllamaClient::new(config.base_url.clone(), config.model.clone())
                .with_temperature(config.temperature)
                .with_timeout(Duration::from_secs(config.request_timeout_secs))?;
            tracing::info!(model = %config.model, base_url = %config.base_url, "Using Ollama analyst");
            Ok(Arc::new(LlmAnalyst::new(Arc::new(client))))
        }
    }
}
