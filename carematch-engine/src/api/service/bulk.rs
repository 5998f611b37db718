//! Bulk match service
//!
//! Submit validates the requested shift subset first; shifts that
//! cannot participate are reported per-id while the rest proceed, so
//! the transport can answer with a partial-success status.

use std::sync::Arc;

use crate::api::context::UserContext;
use crate::api::models::{
    errors::ApiError,
    requests::BulkMatchSubmitRequest,
    responses::{BulkSubmitError, BulkSubmitResponse},
    ApiResult,
};
use crate::bulk::BulkMatchRequest;
use crate::engine::{BulkSubmission, Engine};
use crate::ids::BulkMatchId;

/// Bulk optimization operations
pub struct BulkService {
    engine: Arc<Engine>,
}

impl BulkService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Submit a job; invalid shift ids are dropped and reported
    pub async fn submit(
        &self,
        ctx: &UserContext,
        request: BulkMatchSubmitRequest,
    ) -> ApiResult<BulkSubmitResponse> {
        let mut errors = Vec::new();
        let mut accepted_ids = Vec::with_capacity(request.shift_ids.len());
        for shift_id in &request.shift_ids {
            match self.engine.get_shift(ctx, *shift_id).await {
                Ok((shift, _)) if shift.status.is_open() => accepted_ids.push(*shift_id),
                Ok((shift, _)) => errors.push(BulkSubmitError {
                    shift_id: shift_id.to_string(),
                    code: "CONFLICT".to_string(),
                    message: format!("shift is {}", shift.status),
                }),
                Err(e) => errors.push(BulkSubmitError {
                    shift_id: shift_id.to_string(),
                    code: e.code().to_string(),
                    message: e.to_string(),
                }),
            }
        }
        if !request.shift_ids.is_empty() && accepted_ids.is_empty() {
            return Err(ApiError::with_context(
                "VALIDATION_ERROR",
                "no usable shifts in the requested subset",
                serde_json::json!({ "errors": errors }),
            ));
        }

        let submission = BulkSubmission {
            date_from: request.date_from,
            date_to: request.date_to,
            shift_ids: accepted_ids,
            goal: request.goal,
            genetic: request.genetic,
        };
        let job = self
            .engine
            .submit_bulk(ctx, submission)
            .await
            .map_err(ApiError::from)?;
        Ok(BulkSubmitResponse { job, errors })
    }

    /// Poll a job
    pub async fn get(&self, ctx: &UserContext, id: BulkMatchId) -> ApiResult<BulkMatchRequest> {
        self.engine.get_bulk(ctx, id).await.map_err(ApiError::from)
    }
}
