//! REST transport adapter
//!
//! Converts between REST-specific types (axum responses, status
//! codes) and unified models. Success envelopes are `{ data, meta? }`;
//! failures are `{ error, code, context? }`.

use axum::{http::StatusCode, response::IntoResponse, Json};

use crate::api::models::errors::ApiError;

/// REST adapter for converting unified models into axum responses
pub struct RestAdapter;

impl RestAdapter {
    /// Success envelope with the given status
    pub fn ok_with_status<T: serde::Serialize>(
        status: StatusCode,
        data: T,
    ) -> axum::response::Response {
        (status, Json(serde_json::json!({ "data": data }))).into_response()
    }

    /// 200 success envelope
    pub fn ok<T: serde::Serialize>(data: T) -> axum::response::Response {
        Self::ok_with_status(StatusCode::OK, data)
    }

    /// Success envelope with pagination metadata
    pub fn ok_paged<T: serde::Serialize>(
        data: T,
        total: usize,
        offset: usize,
        limit: usize,
    ) -> axum::response::Response {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "data": data,
                "meta": { "total": total, "offset": offset, "limit": limit }
            })),
        )
            .into_response()
    }

    /// Error response with the mapped status
    pub fn error_to_response(error: ApiError) -> axum::response::Response {
        let status = error.to_http_status();
        (
            status,
            Json(serde_json::json!({
                "error": error.message,
                "code": error.code,
                "context": error.context,
            })),
        )
            .into_response()
    }

    /// Map a service result into a response
    pub fn result_to_response<T: serde::Serialize>(
        result: Result<T, ApiError>,
    ) -> axum::response::Response {
        match result {
            Ok(data) => Self::ok(data),
            Err(error) => Self::error_to_response(error),
        }
    }

    /// Map a creation result into a 201 response
    pub fn created_to_response<T: serde::Serialize>(
        result: Result<T, ApiError>,
    ) -> axum::response::Response {
        match result {
            Ok(data) => Self::ok_with_status(StatusCode::CREATED, data),
            Err(error) => Self::error_to_response(error),
        }
    }
}
