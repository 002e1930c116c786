//! Implementations of the `run` and `config` subcommands.

use crate::cli::output::Output;
use crate::coordinator::Coordinator;
use crate::types::{AppError, DispatchResponse, Result};
use crate::utils::toml_config::{LoomConfig, ReasoningProvider};
use std::io::Read;
use std::path::Path;

/// Read a request payload from a file, or from stdin when `input` is `-`.
pub fn read_payload(input: &str) -> Result<String> {
    if input == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .map_err(|e| AppError::BadRequest(format!("Failed to read stdin: {}", e)))?;
        return Ok(raw);
    }

    std::fs::read_to_string(input)
        .map_err(|e| AppError::BadRequest(format!("Failed to read '{}': {}", input, e)))
}

/// Dispatch one raw payload with a coordinator built from `config`.
///
/// Only coordinator construction can fail; a failed run is an error envelope.
pub async fn run_once(config: &LoomConfig, raw: &str) -> Result<DispatchResponse> {
    let coordinator = Coordinator::from_config(config)?;
    Ok(coordinator.dispatch_str(raw).await)
}

pub fn render_envelope(response: &DispatchResponse, pretty: bool) -> Result<String> {
    let rendered = if pretty {
        serde_json::to_string_pretty(response)
    } else {
        serde_json::to_string(response)
    };
    rendered.map_err(|e| AppError::Internal(format!("Failed to render response: {}", e)))
}

/// Print the effective configuration.
pub fn show_config(output: &Output, config: &LoomConfig, source: Option<&Path>) {
    output.header("Configuration");
    match source {
        Some(path) => output.kv("Source", &path.display().to_string()),
        None => output.kv("Source", "built-in defaults"),
    }

    output.subheader("Server");
    output.kv("Address", &config.bind_address());
    output.kv("Log level", &config.server.log_level);

    output.subheader("Coordinator");
    output.kv("Name", &config.coordinator.name);
    output.kv("Units key", &config.coordinator.units_key);

    output.subheader("Pipeline");
    let timeout = match config.pipeline.run_timeout_secs {
        0 => "disabled".to_string(),
        secs => format!("{}s", secs),
    };
    output.kv("Run timeout", &timeout);
    output.kv(
        "Enrichment concurrency",
        &config.pipeline.enrichment_concurrency.to_string(),
    );
    output.kv("Max candidates", &config.pipeline.max_candidates.to_string());
    output.kv("Run type", &config.pipeline.run_type);

    output.subheader("Gap screen");
    output.kv("Min gap", &format!("{}%", config.pipeline.min_gap_percent));
    output.kv(
        "Price range",
        &format!("{} - {}", config.pipeline.min_price, config.pipeline.max_price),
    );
    output.kv("Min volume", &config.pipeline.min_volume.to_string());

    output.subheader("Reasoning");
    match config.reasoning.provider {
        ReasoningProvider::Rules => output.kv("Provider", "rules"),
        ReasoningProvider::Ollama => {
            output.kv("Provider", "ollama");
            output.kv("Base URL", &config.reasoning.base_url);
            output.kv("Model", &config.reasoning.model);
        }
    }
    output.newline();
}
