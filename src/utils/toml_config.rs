//! TOML-based configuration for Loom
//!
//! Server, pipeline, reasoning and coordinator settings are read from a TOML
//! file (`loom.toml`). Every section and field has a default, so an empty file
//! is a valid configuration.
//!
//! Use [`ConfigManager`] for thread-safe access to the current configuration.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Root configuration structure loaded from loom.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoomConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub reasoning: ReasoningConfig,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

// ============= Pipeline Configuration =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Deadline for one whole orchestration run; 0 disables it
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    /// Concurrent enrichment calls per pipeline; 1 enriches sequentially
    #[serde(default = "default_enrichment_concurrency")]
    pub enrichment_concurrency: usize,

    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Run type stamped on reports when the request does not name one
    #[serde(default = "default_run_type")]
    pub run_type: String,

    /// Gap screen: minimum absolute pre-market gap, in percent
    #[serde(default = "default_min_gap_percent")]
    pub min_gap_percent: f64,

    #[serde(default = "default_min_price")]
    pub min_price: f64,

    #[serde(default = "default_max_price")]
    pub max_price: f64,

    /// Gap screen: minimum pre-market volume, in shares
    #[serde(default = "default_min_volume")]
    pub min_volume: u64,
}

fn default_run_timeout_secs() -> u64 {
    120
}

fn default_enrichment_concurrency() -> usize {
    4
}

fn default_max_candidates() -> usize {
    10
}

fn default_run_type() -> String {
    "Pre-Market".to_string()
}

fn default_min_gap_percent() -> f64 {
    1.0
}

fn default_min_price() -> f64 {
    5.0
}

fn default_max_price() -> f64 {
    1000.0
}

fn default_min_volume() -> u64 {
    100_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_timeout_secs: default_run_timeout_secs(),
            enrichment_concurrency: default_enrichment_concurrency(),
            max_candidates: default_max_candidates(),
            run_type: default_run_type(),
            min_gap_percent: default_min_gap_percent(),
            min_price: default_min_price(),
            max_price: default_max_price(),
            min_volume: default_min_volume(),
        }
    }
}

// ============= Reasoning Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningProvider {
    /// Deterministic rule-based analyst
    #[default]
    Rules,
    /// Local Ollama server
    Ollama,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default)]
    pub provider: ReasoningProvider,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            provider: ReasoningProvider::default(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: 0.0,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ============= Coordinator Configuration =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Routing target this coordinator answers to
    #[serde(default = "default_coordinator_name")]
    pub name: String,

    /// Request parameter holding the unit list; `units` is always accepted too
    #[serde(default = "default_units_key")]
    pub units_key: String,
}

fn default_coordinator_name() -> String {
    "market_analyst".to_string()
}

fn default_units_key() -> String {
    "exchanges".to_string()
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            name: default_coordinator_name(),
            units_key: default_units_key(),
        }
    }
}

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl LoomConfig {
    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: LoomConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::FileNotFound(path)) => {
                info!("No configuration at {:?}, using defaults", path);
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "server.host must not be empty".to_string(),
            ));
        }
        if self.pipeline.enrichment_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.enrichment_concurrency must be at least 1".to_string(),
            ));
        }
        if self.pipeline.max_candidates == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_candidates must be at least 1".to_string(),
            ));
        }
        if self.pipeline.run_type.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "pipeline.run_type must not be empty".to_string(),
            ));
        }
        let pipeline = &self.pipeline;
        for (name, value) in [
            ("min_gap_percent", pipeline.min_gap_percent),
            ("min_price", pipeline.min_price),
            ("max_price", pipeline.max_price),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "pipeline.{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if pipeline.min_price > pipeline.max_price {
            return Err(ConfigError::ValidationError(format!(
                "pipeline.min_price ({}) exceeds pipeline.max_price ({})",
                pipeline.min_price, pipeline.max_price
            )));
        }
        if self.coordinator.name.trim().is_empty() || self.coordinator.units_key.trim().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "coordinator.name and coordinator.units_key must not be empty".to_string(),
            ));
        }

        let reasoning = &self.reasoning;
        if !(0.0..=2.0).contains(&reasoning.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "reasoning.temperature must be between 0 and 2, got {}",
                reasoning.temperature
            )));
        }
        if reasoning.provider == ReasoningProvider::Ollama {
            if reasoning.model.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "reasoning.model is required for the ollama provider".to_string(),
                ));
            }
            if !reasoning.base_url.starts_with("http://")
                && !reasoning.base_url.starts_with("https://")
            {
                return Err(ConfigError::ValidationError(format!(
                    "reasoning.base_url must be an http(s) URL, got '{}'",
                    reasoning.base_url
                )));
            }
            if reasoning.request_timeout_secs == 0 {
                return Err(ConfigError::ValidationError(
                    "reasoning.request_timeout_secs must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Address the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

// ============= Configuration Manager =============

/// Thread-safe configuration holder with lock-free reads
#[derive(Clone)]
pub struct ConfigManager {
    config: Arc<ArcSwap<LoomConfig>>,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create a new configuration manager and load the initial config
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let config = LoomConfig::load(&path)?;

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: Some(path),
        })
    }

    /// Create a config manager directly from a config (no backing file)
    pub fn from_config(config: LoomConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: None,
        }
    }

    /// Get the current configuration (lockless read)
    pub fn config(&self) -> Arc<LoomConfig> {
        self.config.load_full()
    }

    /// Read and validate the backing file without activating it.
    ///
    /// A manager without a file returns a copy of the current config.
    pub fn load_source(&self) -> Result<LoomConfig, ConfigError> {
        match &self.config_path {
            Some(path) => {
                info!("Reading configuration from {:?}", path);
                LoomConfig::load(path)
            }
            None => Ok(self.config().as_ref().clone()),
        }
    }

    /// Make `config` the current configuration.
    pub fn replace(&self, config: Arc<LoomConfig>) {
        self.config.store(config);
    }
}
