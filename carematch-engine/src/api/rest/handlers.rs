//! REST API route handlers
//!
//! Thin adapters: parse path/query/body, build the caller context
//! from the gateway-populated identity headers, delegate to the
//! service layer, and map the result through [`RestAdapter`].

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json as JsonResponse},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::context::UserContext;
use crate::api::models::errors::ApiError;
use crate::api::models::requests::{
    BulkMatchSubmitRequest, CreateProposalRequest, CreateShiftRequest, ListShiftsRequest,
    MatchShiftRequest, MetricsRequest, PutConfigurationRequest, PutPreferencesRequest,
    RespondRequest, SelectShiftRequest,
};
use crate::api::service::{
    BulkService, ConfigurationService, MetricsService, PreferenceService, ProposalService,
    ShiftService,
};
use crate::api::transport::rest::RestAdapter;
use crate::engine::Engine;
use crate::ids::{BulkMatchId, CaregiverId, ConfigId, ProposalId, ShiftId};

/// Build the caller context from gateway identity headers
fn user_context(headers: &HeaderMap) -> Result<UserContext, ApiError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let user_id = header("x-user-id")
        .and_then(|v| Uuid::parse_str(&v).ok())
        .ok_or_else(|| ApiError::new("UNAUTHORIZED", "missing or invalid x-user-id header"))?;
    let organization_id = header("x-organization-id")
        .and_then(|v| crate::ids::OrganizationId::parse_str(&v).ok())
        .ok_or_else(|| {
            ApiError::new("UNAUTHORIZED", "missing or invalid x-organization-id header")
        })?;
    let csv = |name: &str| {
        header(name)
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    };
    let branch_ids = csv("x-branch-ids")
        .iter()
        .filter_map(|v| crate::ids::BranchId::parse_str(v).ok())
        .collect();
    Ok(UserContext {
        user_id,
        organization_id,
        roles: csv("x-roles"),
        permissions: csv("x-permissions"),
        branch_ids,
    })
}

macro_rules! require_context {
    ($headers:expr) => {
        match user_context($headers) {
            Ok(ctx) => ctx,
            Err(e) => return RestAdapter::error_to_response(e),
        }
    };
}

macro_rules! parse_id {
    ($ty:ty, $raw:expr, $what:literal) => {
        match <$ty>::parse_str(&$raw) {
            Ok(id) => id,
            Err(_) => {
                return RestAdapter::error_to_response(ApiError::new(
                    "BAD_REQUEST",
                    concat!("invalid ", $what, " id"),
                ))
            }
        }
    };
}

/// Register an open shift
pub async fn create_shift(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Json(request): Json<CreateShiftRequest>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let service = ShiftService::new(engine);
    RestAdapter::created_to_response(service.create_shift(&ctx, request).await)
}

/// List open shifts
pub async fn list_shifts(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Query(request): Query<ListShiftsRequest>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let service = ShiftService::new(engine);
    match service.list_shifts(&ctx, request).await {
        Ok(page) => RestAdapter::ok_paged(page.items, page.total, page.offset, page.limit),
        Err(e) => RestAdapter::error_to_response(e),
    }
}

/// Read one shift and its proposals
pub async fn get_shift(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let shift_id = parse_id!(ShiftId, id, "shift");
    let service = ShiftService::new(engine);
    RestAdapter::result_to_response(service.get_shift(&ctx, shift_id).await)
}

/// Run the evaluator for one shift
pub async fn match_shift(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<MatchShiftRequest>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let shift_id = parse_id!(ShiftId, id, "shift");
    let service = ShiftService::new(engine);
    RestAdapter::result_to_response(service.match_shift(&ctx, shift_id, request).await)
}

/// Cancel a shift
pub async fn cancel_shift(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let shift_id = parse_id!(ShiftId, id, "shift");
    let service = ShiftService::new(engine);
    RestAdapter::result_to_response(service.cancel_shift(&ctx, shift_id).await)
}

/// List proposals for a shift
pub async fn list_proposals(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let shift_id = parse_id!(ShiftId, id, "shift");
    let service = ProposalService::new(engine);
    RestAdapter::result_to_response(service.list_for_shift(&ctx, shift_id).await)
}

/// Operator creates a manual proposal
pub async fn create_proposal(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Json(request): Json<CreateProposalRequest>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let service = ProposalService::new(engine);
    RestAdapter::created_to_response(service.create_manual(&ctx, request).await)
}

/// Accept or reject a proposal
pub async fn respond_to_proposal(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<RespondRequest>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let proposal_id = parse_id!(ProposalId, id, "proposal");
    let service = ProposalService::new(engine);
    RestAdapter::result_to_response(service.respond(&ctx, proposal_id, request).await)
}

/// Idempotent view acknowledgement
pub async fn view_proposal(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let proposal_id = parse_id!(ProposalId, id, "proposal");
    let service = ProposalService::new(engine);
    RestAdapter::result_to_response(service.view(&ctx, proposal_id).await)
}

/// Caregiver self-selects a shift
pub async fn select_shift(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<SelectShiftRequest>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let shift_id = parse_id!(ShiftId, id, "shift");
    let service = ProposalService::new(engine);
    RestAdapter::result_to_response(service.select_shift(&ctx, shift_id, request).await)
}

/// Shifts a caregiver may self-select
pub async fn eligible_shifts(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<std::collections::HashMap<String, String>>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let caregiver_id = parse_id!(CaregiverId, id, "caregiver");
    let min_score = query.get("min_score").and_then(|v| v.parse().ok());
    let service = ProposalService::new(engine);
    RestAdapter::result_to_response(service.eligible_shifts(&ctx, caregiver_id, min_score).await)
}

/// Submit a bulk optimization job
pub async fn submit_bulk(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Json(request): Json<BulkMatchSubmitRequest>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let service = BulkService::new(engine);
    match service.submit(&ctx, request).await {
        Ok(response) if response.errors.is_empty() => {
            RestAdapter::ok_with_status(StatusCode::CREATED, response)
        }
        // Some shifts were dropped at submit; the job still runs
        Ok(response) => RestAdapter::ok_with_status(StatusCode::MULTI_STATUS, response),
        Err(e) => RestAdapter::error_to_response(e),
    }
}

/// Poll a bulk job
pub async fn get_bulk(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let bulk_id = parse_id!(BulkMatchId, id, "bulk job");
    let service = BulkService::new(engine);
    RestAdapter::result_to_response(service.get(&ctx, bulk_id).await)
}

/// Read caregiver preferences
pub async fn get_preferences(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let caregiver_id = parse_id!(CaregiverId, id, "caregiver");
    let service = PreferenceService::new(engine);
    RestAdapter::result_to_response(service.get(&ctx, caregiver_id).await)
}

/// Upsert caregiver preferences
pub async fn put_preferences(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<PutPreferencesRequest>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let caregiver_id = parse_id!(CaregiverId, id, "caregiver");
    let service = PreferenceService::new(engine);
    RestAdapter::result_to_response(service.put(&ctx, caregiver_id, request).await)
}

/// Read a matching configuration
pub async fn get_configuration(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let config_id = parse_id!(ConfigId, id, "configuration");
    let service = ConfigurationService::new(engine);
    RestAdapter::result_to_response(service.get(&ctx, config_id).await)
}

/// Create or replace a matching configuration
pub async fn put_configuration(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<PutConfigurationRequest>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let config_id = parse_id!(ConfigId, id, "configuration");
    let service = ConfigurationService::new(engine);
    RestAdapter::result_to_response(service.put(&ctx, config_id, request).await)
}

/// Aggregate matching KPIs
pub async fn matching_metrics(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Query(request): Query<MetricsRequest>,
) -> axum::response::Response {
    let ctx = require_context!(&headers);
    let service = MetricsService::new(engine);
    RestAdapter::result_to_response(service.matching(&ctx, request).await)
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        JsonResponse(serde_json::json!({ "status": "healthy" })),
    )
}
