//! HTTP API Handlers and Routes
//!
//! This module exposes the coordinator over HTTP, built on the Axum web framework.
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - Request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) - Route definitions and router configuration
//!
//! # API Endpoints
//!
//! ## Dispatch (`/api/dispatch`)
//! - `POST /api/dispatch` - Run one orchestration and receive the response envelope
//!
//! ## System
//! - `GET /api/config` - Effective pipeline configuration
//! - `POST /api/config/reload` - Re-read the configuration file and rebuild the coordinator
//! - `GET /api/openapi.json` - OpenAPI document
//! - `GET /health` - Health check endpoint
//!
//! # Envelope
//!
//! Every dispatch answer, including malformed bodies, has the same shape:
//! ```text
//! {"status": "success", "result": { ...consolidated report... }}
//! {"status": "error", "result": {"error_message": "..."}}
//! ```

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;

use utoipa::OpenApi;

/// OpenAPI description of the HTTP surface.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::dispatch::dispatch,
        handlers::system::effective_config,
        handlers::system::reload_config,
        handlers::system::health,
    ),
    components(schemas(
        crate::types::DispatchRequest,
        crate::types::DispatchResponse,
        crate::types::DispatchStatus,
        handlers::system::EffectiveConfig,
    )),
    tags(
        (name = "dispatch", description = "Fan-out analysis runs"),
        (name = "system", description = "Health and configuration"),
    )
)]
pub struct ApiDoc;
