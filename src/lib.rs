//! # L.O.O.M - Layered Orchestration Of Market analysts
//!
//! A concurrent fan-out/fan-in pipeline orchestrator. Given a set of
//! independent units of work (exchanges to analyze), the coordinator builds one
//! worker pipeline per unit, runs them all concurrently and folds their
//! outputs into one consolidated report.
//!
//! ## Overview
//!
//! L.O.O.M can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `loom-server` binary
//! 2. **As a library** - Embed a [`Coordinator`] in your own Rust project
//!
//! ### Basic Example
//!
//! ```rust,ignore
//! use loom::{Coordinator, LoomConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = Coordinator::from_config(&LoomConfig::default())?;
//!
//!     let response = coordinator
//!         .dispatch(json!({
//!             "target": "market_analyst",
//!             "parameters": { "exchanges": ["NASDAQ", "TSX"] }
//!         }))
//!         .await;
//!
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!     Ok(())
//! }
//! ```
//!
//! ### Custom Collaborators
//!
//! ```rust,ignore
//! use loom::{Coordinator, PipelineDeps, RuleAnalyst, ToolRegistry};
//! use std::sync::Arc;
//!
//! let mut tools = ToolRegistry::new();
//! tools.register(Arc::new(MyVixFeed::new()));
//!
//! let deps = PipelineDeps::new(Arc::new(tools), Arc::new(RuleAnalyst));
//! let coordinator = Coordinator::new(Arc::new(deps));
//! ```
//!
//! ## Modules
//!
//! - [`blackboard`] - Run-scoped, per-unit namespaced state store
//! - [`tools`] - Tool trait, registry, invocation unit and market data tools
//! - [`reasoning`] - Reasoning stage capability and its implementations
//! - [`pipeline`] - Parallel group runner and worker pipeline
//! - [`coordinator`] - Request boundary, fan-out and consolidation
//! - [`api`] - REST API handlers and routes
//! - [`types`] - Common types and error handling
//!
//! ## Architecture
//!
//! Stages communicate only through the [`blackboard::Blackboard`]. Each
//! pipeline owns a namespace handle for its own unit and can read, but never
//! write, the global namespace the coordinator seals before fan-out.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// Namespaced run-scoped state store.
pub mod blackboard;
/// Command-line interface.
pub mod cli;
/// Fan-out coordinator and dispatch boundary.
pub mod coordinator;
/// LLM client abstraction and the Ollama client.
pub mod llm;
/// Parallel group runner and worker pipeline.
pub mod pipeline;
/// Reasoning stage capability and analysts.
pub mod reasoning;
/// Domain records with JSON schema and semantic validation.
pub mod schemas;
/// Tool trait, registry and built-in market tools.
pub mod tools;
/// Core types (requests, responses, errors).
pub mod types;
/// Configuration utilities (TOML).
pub mod utils;

// Re-export commonly used types
pub use blackboard::{Blackboard, NamespaceHandle, UnitId};
pub use coordinator::Coordinator;
pub use llm::{LLMClient, OllamaClient};
pub use pipeline::{ParallelGroup, PipelineDeps, PipelineOutcome, WorkerPipeline};
pub use reasoning::{ReasoningStage, RuleAnalyst};
pub use schemas::ConsolidatedReport;
pub use tools::{Tool, ToolInvocation, ToolRegistry};
pub use types::{AppError, DispatchRequest, DispatchResponse, Result};
pub use utils::toml_config::{ConfigManager, LoomConfig};

use arc_swap::ArcSwap;
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Coordinator answering dispatch requests, replaced on reload
    pub coordinator: Arc<ArcSwap<Coordinator>>,
    /// TOML configuration with reload support
    pub config: Arc<ConfigManager>,
}

impl AppState {
    pub fn new(coordinator: Coordinator, config: ConfigManager) -> Self {
        Self {
            coordinator: Arc::new(ArcSwap::from_pointee(coordinator)),
            config: Arc::new(config),
        }
    }

    /// Build the state from a configuration manager, wiring the coordinator from its current config.
    pub fn from_config_manager(config: ConfigManager) -> Result<Self> {
        let coordinator = Coordinator::from_config(&config.config())?;
        Ok(Self::new(coordinator, config))
    }

    /// The coordinator serving new requests. Runs already in flight keep theirs.
    pub fn coordinator(&self) -> Arc<Coordinator> {
        self.coordinator.load_full()
    }

    /// Re-read the configuration source and rebuild the coordinator from it.
    ///
    /// The config and the coordinator are swapped together, and only once both
    /// were built; on error the running pair stays active.
    pub fn reload(&self) -> Result<Arc<LoomConfig>> {
        let config = self
            .config
            .load_source()
            .map_err(|e| AppError::Configuration(e.to_string()))?;
        let coordinator = Coordinator::from_config(&config)?;

        let config = Arc::new(config);
        self.config.replace(Arc::clone(&config));
        self.coordinator.store(Arc::new(coordinator));
        tracing::info!(coordinator = %config.coordinator.name, "Configuration reloaded");
        Ok(config)
    }
}

/// Full application router: health check, `/api` routes, tracing and CORS.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", axum::routing::get(api::handlers::system::health))
        .nest("/api", api::routes::create_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
