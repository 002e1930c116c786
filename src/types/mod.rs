use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Literal message carried by the error envelope when no unit produced a result.
pub const ALL_UNITS_FAILED_MESSAGE: &str = "All unit analyses failed to produce a valid result.";

// ============= Dispatch Request/Response Types =============

/// Incoming machine-to-machine task for a coordinator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DispatchRequest {
    /// Routing discriminator naming the coordinator that should handle the task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Arbitrary parameters; the unit list lives here (e.g. `exchanges`)
    #[serde(default)]
    #[schema(value_type = Object)]
    pub parameters: Map<String, Value>,
}

/// Overall status of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Success,
    Error,
}

/// Structured response envelope. Always well-formed, even on total failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DispatchResponse {
    pub status: DispatchStatus,
    /// The consolidated report on success, `{ "error_message": ... }` otherwise
    #[schema(value_type = Object)]
    pub result: Value,
}

impl DispatchResponse {
    pub fn success<T: Serialize>(result: &T) -> Self {
        match serde_json::to_value(result) {
            Ok(result) => Self {
                status: DispatchStatus::Success,
                result,
            },
            Err(e) => Self::error(format!("Failed to serialize result: {}", e)),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: DispatchStatus::Error,
            result: serde_json::json!({ "error_message": message.into() }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DispatchStatus::Success
    }

    /// The error message, if this is an error envelope.
    pub fn error_message(&self) -> Option<&str> {
        match self.status {
            DispatchStatus::Error => self.result.get("error_message").and_then(Value::as_str),
            DispatchStatus::Success => None,
        }
    }
}

impl From<AppError> for DispatchResponse {
    fn from(err: AppError) -> Self {
        Self::error(err.to_string())
    }
}

// ============= Error Types =============

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Missing input '{parameter}' in namespace '{namespace}'")]
    MissingInput { namespace: String, parameter: String },

    #[error("Validation failure for {schema}: {reason}")]
    ValidationFailure { schema: String, reason: String },

    #[error("Tool '{tool}' failed: {reason}")]
    ToolError { tool: String, reason: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Namespace error: {0}")]
    Namespace(String),

    #[error("All unit analyses failed to produce a valid result.")]
    AllUnitsFailed,

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(schema: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::ValidationFailure {
            schema: schema.into(),
            reason: reason.into(),
        }
    }

    pub fn tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::ToolError {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status used when the error crosses the API boundary.
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AllUnitsFailed => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        (status, axum::Json(DispatchResponse::from(self))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_units_failed_message_is_stable() {
        assert_eq!(AppError::AllUnitsFailed.to_string(), ALL_UNITS_FAILED_MESSAGE);
    }

    #[test]
    fn test_error_envelope_shape() {
        let response = DispatchResponse::from(AppError::AllUnitsFailed);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["status"], "error");
        assert_eq!(json["result"]["error_message"], ALL_UNITS_FAILED_MESSAGE);
        assert_eq!(response.error_message(), Some(ALL_UNITS_FAILED_MESSAGE));
    }

    #[test]
    fn test_status_codes() {
        use axum::http::StatusCode;
        assert_eq!(
            AppError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::AllUnitsFailed.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AppError::tool("get_vix_data", "down").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
