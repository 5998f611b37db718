//! Unified API error type
//!
//! Transport-agnostic error with a stable machine code; the REST
//! adapter maps codes to HTTP statuses.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineError;

/// Unified API error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Stable machine-readable code
    pub code: String,
    pub message: String,
    /// Structured context, e.g. the eligibility issue list
    pub context: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(
        code: impl Into<String>,
        message: impl Into<String>,
        context: serde_json::Value,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: Some(context),
        }
    }

    /// Map the code to an HTTP status
    #[cfg(feature = "http")]
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self.code.as_str() {
            "VALIDATION_ERROR" | "BAD_REQUEST" => StatusCode::BAD_REQUEST,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "NOT_ELIGIBLE" => StatusCode::UNPROCESSABLE_ENTITY,
            "UNAUTHORIZED" => StatusCode::FORBIDDEN,
            "TRANSIENT" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let code = err.code().to_string();
        match err {
            EngineError::Eligibility { issues } => ApiError::with_context(
                code,
                "caregiver is not eligible for this shift",
                serde_json::json!({ "issues": issues }),
            ),
            other => ApiError::new(code, other.to_string()),
        }
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
