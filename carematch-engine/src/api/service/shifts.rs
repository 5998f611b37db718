//! Shift service
//!
//! Service layer for shift registration, listing, and matching.

use chrono::Utc;
use std::sync::Arc;

use crate::api::context::UserContext;
use crate::api::models::{
    errors::ApiError,
    requests::{CreateShiftRequest, ListShiftsRequest, MatchShiftRequest},
    responses::{MatchResponse, ShiftResponse},
    ApiResult,
};
use crate::engine::{Engine, MatchShiftOptions};
use crate::ids::ShiftId;
use crate::shift::{MatchingStatus, OpenShift};
use crate::store::{Page, PageResult, ShiftFilter};

/// Shift management operations
pub struct ShiftService {
    engine: Arc<Engine>,
}

impl ShiftService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Register an open shift
    pub async fn create_shift(
        &self,
        ctx: &UserContext,
        request: CreateShiftRequest,
    ) -> ApiResult<OpenShift> {
        let now = Utc::now();
        let shift = OpenShift {
            id: ShiftId::new(),
            visit_id: request.visit_id,
            organization_id: ctx.organization_id,
            branch_id: request.branch_id,
            client_id: request.client_id,
            scheduled_date: request.scheduled_date,
            start_time: request.start_time,
            end_time: request.end_time,
            timezone: request.timezone,
            duration_minutes: request.duration_minutes,
            service_type: request.service_type,
            required_skills: request.required_skills,
            required_certifications: request.required_certifications,
            preferred_caregivers: request.preferred_caregivers,
            blocked_caregivers: request.blocked_caregivers,
            gender_preference: request.gender_preference,
            language_preference: request.language_preference,
            location: request.location,
            priority: request.priority,
            urgency: request.urgency,
            fill_by: request.fill_by,
            status: MatchingStatus::New,
            needs_operator_review: false,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        self.engine
            .create_shift(ctx, shift)
            .await
            .map_err(ApiError::from)
    }

    /// List shifts with filters and pagination
    pub async fn list_shifts(
        &self,
        ctx: &UserContext,
        request: ListShiftsRequest,
    ) -> ApiResult<PageResult<OpenShift>> {
        let filter = ShiftFilter {
            organization_id: None,
            branch_id: request.branch_id,
            statuses: request.status.into_iter().collect(),
            scheduled_from: request.scheduled_from,
            scheduled_to: request.scheduled_to,
            urgency: request.urgency,
        };
        let page = Page {
            offset: request.offset.unwrap_or(0),
            limit: request.limit.unwrap_or(50).min(200),
        };
        self.engine
            .list_shifts(ctx, filter, page)
            .await
            .map_err(ApiError::from)
    }

    /// Read one shift with its proposals
    pub async fn get_shift(&self, ctx: &UserContext, shift_id: ShiftId) -> ApiResult<ShiftResponse> {
        let (shift, proposals) = self
            .engine
            .get_shift(ctx, shift_id)
            .await
            .map_err(ApiError::from)?;
        Ok(ShiftResponse { shift, proposals })
    }

    /// Run the evaluator for one shift
    pub async fn match_shift(
        &self,
        ctx: &UserContext,
        shift_id: ShiftId,
        request: MatchShiftRequest,
    ) -> ApiResult<MatchResponse> {
        let opts = MatchShiftOptions {
            max_candidates: request.max_candidates.unwrap_or(10).clamp(1, 100),
            auto_propose: request.auto_propose,
            use_ml: request.use_ml,
            include_ineligible: request.include_ineligible,
        };
        let run = self
            .engine
            .match_shift(ctx, shift_id, opts)
            .await
            .map_err(ApiError::from)?;
        Ok(MatchResponse {
            shift: run.shift,
            candidates: run.candidates,
            proposals: run.proposals,
        })
    }

    /// Cancel a shift
    pub async fn cancel_shift(&self, ctx: &UserContext, shift_id: ShiftId) -> ApiResult<OpenShift> {
        self.engine
            .cancel_shift(ctx, shift_id)
            .await
            .map_err(ApiError::from)
    }
}
