use crate::{
    AppState,
    types::{DispatchResponse, Result},
    utils::toml_config::{LoomConfig, ReasoningProvider},
};
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Effective settings of the running coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EffectiveConfig {
    pub coordinator: String,
    pub units_key: String,
    pub run_type: String,
    /// 0 means no run deadline
    pub run_timeout_secs: u64,
    pub enrichment_concurrency: usize,
    pub max_candidates: usize,
    pub min_gap_percent: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub min_volume: u64,
    pub reasoning_provider: String,
    /// Only set for LLM-backed reasoning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_model: Option<String>,
}

impl From<&LoomConfig> for EffectiveConfig {
    fn from(config: &LoomConfig) -> Self {
        let (provider, model) = match config.reasoning.provider {
            ReasoningProvider::Rules => ("rules", None),
            ReasoningProvider::Ollama => ("ollama", Some(config.reasoning.model.clone())),
        };
        let pipeline = &config.pipeline;

        Self {
            coordinator: config.coordinator.name.clone(),
            units_key: config.coordinator.units_key.clone(),
            run_type: pipeline.run_type.clone(),
            run_timeout_secs: pipeline.run_timeout_secs,
            enrichment_concurrency: pipeline.enrichment_concurrency,
            max_candidates: pipeline.max_candidates,
            min_gap_percent: pipeline.min_gap_percent,
            min_price: pipeline.min_price,
            max_price: pipeline.max_price,
            min_volume: pipeline.min_volume,
            reasoning_provider: provider.to_string(),
            reasoning_model: model,
        }
    }
}

/// Show the effective pipeline configuration
#[utoipa::path(
    get,
    path = "/api/config",
    responses(
        (status = 200, description = "Current configuration", body = EffectiveConfig)
    ),
    tag = "system"
)]
pub async fn effective_config(State(state): State<AppState>) -> Json<EffectiveConfig> {
    Json(EffectiveConfig::from(state.config.config().as_ref()))
}

/// Re-read the configuration file and rebuild the coordinator
#[utoipa::path(
    post,
    path = "/api/config/reload",
    responses(
        (status = 200, description = "Configuration reloaded", body = EffectiveConfig),
        (status = 500, description = "Configuration rejected, previous one kept", body = DispatchResponse)
    ),
    tag = "system"
)]
pub async fn reload_config(State(state): State<AppState>) -> Result<Json<EffectiveConfig>> {
    let config = state.reload()?;
    Ok(Json(EffectiveConfig::from(config.as_ref())))
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Server is up", body = String)
    ),
    tag = "system"
)]
pub async fn health() -> &'static str {
    "OK"
}
