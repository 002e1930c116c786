use crate::AppState;
use axum::{
    Json, Router,
    routing::{get, post},
};
use utoipa::OpenApi;

/// Routes mounted under `/api`.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/dispatch", post(crate::api::handlers::dispatch::dispatch))
        .route(
            "/config",
            get(crate::api::handlers::system::effective_config),
        )
        .route(
            "/config/reload",
            post(crate::api::handlers::system::reload_config),
        )
        .route(
            "/openapi.json",
            get(|| async { Json(crate::api::ApiDoc::openapi()) }),
        )
}
