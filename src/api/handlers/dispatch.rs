use crate::{
    AppState,
    types::{AppError, DispatchRequest, DispatchResponse, Result},
};
use axum::{Json, body::Bytes, extract::State};

/// Run one orchestration for the units named in the request body
///
/// The body is read raw so that empty or malformed payloads are still
/// answered with the error envelope instead of an extractor rejection.
#[utoipa::path(
    post,
    path = "/api/dispatch",
    request_body = DispatchRequest,
    responses(
        (status = 200, description = "At least one unit produced a result", body = DispatchResponse),
        (status = 400, description = "Malformed request", body = DispatchResponse),
        (status = 502, description = "Every unit failed", body = DispatchResponse),
        (status = 504, description = "Run deadline exceeded", body = DispatchResponse)
    ),
    tag = "dispatch"
)]
pub async fn dispatch(State(state): State<AppState>, body: Bytes) -> Result<Json<DispatchResponse>> {
    let raw = std::str::from_utf8(&body)
        .map_err(|_| AppError::BadRequest("Invalid JSON payload.".to_string()))?;

    let report = state.coordinator().try_dispatch_str(raw).await?;
    Ok(Json(DispatchResponse::success(&report)))
}
