//! Proposal service
//!
//! Service layer for proposal responses, views, manual proposals, and
//! the caregiver self-select path.

use std::sync::Arc;

use crate::api::context::UserContext;
use crate::api::models::{
    errors::ApiError,
    requests::{CreateProposalRequest, RespondRequest, SelectShiftRequest},
    responses::{RespondResponse, SelectShiftResponse},
    ApiResult,
};
use crate::engine::Engine;
use crate::ids::{CaregiverId, ProposalId, ShiftId};
use crate::matcher::EligibleShift;
use crate::proposal::AssignmentProposal;

/// Proposal lifecycle operations
pub struct ProposalService {
    engine: Arc<Engine>,
}

impl ProposalService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// List proposals for a shift
    pub async fn list_for_shift(
        &self,
        ctx: &UserContext,
        shift_id: ShiftId,
    ) -> ApiResult<Vec<AssignmentProposal>> {
        self.engine
            .list_proposals(ctx, shift_id)
            .await
            .map_err(ApiError::from)
    }

    /// Operator creates a manual proposal
    pub async fn create_manual(
        &self,
        ctx: &UserContext,
        request: CreateProposalRequest,
    ) -> ApiResult<AssignmentProposal> {
        self.engine
            .create_manual_proposal(ctx, request.shift_id, request.caregiver_id)
            .await
            .map_err(ApiError::from)
    }

    /// Accept or reject a proposal
    pub async fn respond(
        &self,
        ctx: &UserContext,
        proposal_id: ProposalId,
        request: RespondRequest,
    ) -> ApiResult<RespondResponse> {
        let commit = self
            .engine
            .respond(
                ctx,
                proposal_id,
                request.expected_version,
                request.accept,
                request.reason,
                request.category,
            )
            .await
            .map_err(ApiError::from)?;
        Ok(RespondResponse {
            proposal: commit.proposal,
            superseded: commit.superseded,
            shift: commit.shift,
        })
    }

    /// Idempotent view acknowledgement
    pub async fn view(
        &self,
        ctx: &UserContext,
        proposal_id: ProposalId,
    ) -> ApiResult<AssignmentProposal> {
        self.engine
            .view_proposal(ctx, proposal_id)
            .await
            .map_err(ApiError::from)
    }

    /// Shifts a caregiver may self-select
    pub async fn eligible_shifts(
        &self,
        ctx: &UserContext,
        caregiver_id: CaregiverId,
        min_score: Option<u8>,
    ) -> ApiResult<Vec<EligibleShift>> {
        self.engine
            .eligible_shifts(ctx, caregiver_id, min_score)
            .await
            .map_err(ApiError::from)
    }

    /// Caregiver self-selects a shift
    pub async fn select_shift(
        &self,
        ctx: &UserContext,
        shift_id: ShiftId,
        request: SelectShiftRequest,
    ) -> ApiResult<SelectShiftResponse> {
        let outcome = self
            .engine
            .select_shift(ctx, request.caregiver_id, shift_id)
            .await
            .map_err(ApiError::from)?;
        Ok(SelectShiftResponse {
            proposal: outcome.proposal,
            auto_assigned: outcome.auto_assigned,
        })
    }
}
