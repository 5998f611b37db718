//! Unified API response models

use serde::{Deserialize, Serialize};

use crate::bulk::BulkMatchRequest;
use crate::kpi::MatchingKpis;
use crate::matcher::EligibleShift;
use crate::proposal::AssignmentProposal;
use crate::scoring::MatchCandidate;
use crate::shift::OpenShift;

/// A shift with its live and historical proposals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftResponse {
    pub shift: OpenShift,
    pub proposals: Vec<AssignmentProposal>,
}

/// Result of a match run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResponse {
    pub shift: OpenShift,
    pub candidates: Vec<MatchCandidate>,
    pub proposals: Vec<AssignmentProposal>,
}

/// Result of a respond command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondResponse {
    pub proposal: AssignmentProposal,
    pub superseded: Vec<AssignmentProposal>,
    pub shift: OpenShift,
}

/// Result of a caregiver self-select
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectShiftResponse {
    pub proposal: AssignmentProposal,
    pub auto_assigned: bool,
}

/// Bulk submission acknowledgement, with per-shift submit errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSubmitResponse {
    pub job: BulkMatchRequest,
    /// Shift ids the submission could not include
    pub errors: Vec<BulkSubmitError>,
}

/// One shift rejected at submit time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSubmitError {
    pub shift_id: String,
    pub code: String,
    pub message: String,
}

/// Shifts a caregiver may self-select
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibleShiftsResponse {
    pub shifts: Vec<EligibleShift>,
}

/// Matching KPI aggregation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub kpis: MatchingKpis,
}
