//! Durable state for the engine
//!
//! The rest of the engine treats persistence as the typed capability
//! set in [`Store`]. Two backings exist: [`MemoryStore`] for tests and
//! local runs, and a sled-backed [`SledStore`] behind the `storage`
//! feature. Multi-row writes are serialized per backend so the accept
//! path, supersession, and the expiry sweep cannot interleave.

pub mod memory;
#[cfg(feature = "storage")]
pub mod sled;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bulk::BulkMatchRequest;
use crate::caregiver::{Caregiver, CaregiverContext, CaregiverPreferenceProfile, VisitWindow};
use crate::configuration::MatchingConfiguration;
use crate::error::EngineResult;
use crate::history::{MatchHistory, MatchOutcome};
use crate::ids::{BranchId, BulkMatchId, CaregiverId, ClientId, ConfigId, ExperimentId, OrganizationId, ProposalId, ShiftId};
use crate::ml::{Experiment, ExperimentAssignment, ModelRegistration, VariantOutcome};
use crate::proposal::{AssignmentProposal, RejectionCategory};
use crate::shift::{MatchingStatus, OpenShift, ShiftUrgency};

pub use memory::MemoryStore;
#[cfg(feature = "storage")]
pub use sled::SledStore;

/// Minutes of travel slack added around a shift window when looking
/// for conflicting visits
pub const TRAVEL_BUFFER_MINUTES: i64 = 30;

/// Lookback window for rejection counts and acceptance rates
pub const RECENT_WINDOW_DAYS: i64 = 30;

/// Filter for open-shift queries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShiftFilter {
    pub organization_id: Option<OrganizationId>,
    pub branch_id: Option<BranchId>,
    /// Empty means any status
    pub statuses: Vec<MatchingStatus>,
    pub scheduled_from: Option<NaiveDate>,
    pub scheduled_to: Option<NaiveDate>,
    pub urgency: Option<ShiftUrgency>,
}

impl ShiftFilter {
    /// Whether a shift passes the filter
    pub fn matches(&self, shift: &OpenShift) -> bool {
        if let Some(org) = self.organization_id {
            if shift.organization_id != org {
                return false;
            }
        }
        if let Some(branch) = self.branch_id {
            if shift.branch_id != branch {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&shift.status) {
            return false;
        }
        if let Some(from) = self.scheduled_from {
            if shift.scheduled_date < from {
                return false;
            }
        }
        if let Some(to) = self.scheduled_to {
            if shift.scheduled_date > to {
                return false;
            }
        }
        if let Some(urgency) = self.urgency {
            if shift.urgency != urgency {
                return false;
            }
        }
        true
    }
}

/// Pagination request
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// One page of results plus the unpaginated total
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Caregiver decision on a proposal
#[derive(Debug, Clone)]
pub enum ProposalResponse {
    Accept {
        actor: Uuid,
    },
    Reject {
        actor: Uuid,
        reason: Option<String>,
        category: Option<RejectionCategory>,
    },
}

/// Result of the transactional respond path
#[derive(Debug, Clone)]
pub struct ResponseCommit {
    pub proposal: AssignmentProposal,
    /// Siblings moved to superseded on an accept
    pub superseded: Vec<AssignmentProposal>,
    pub shift: OpenShift,
}

/// Result of one expiry sweep
#[derive(Debug, Clone, Default)]
pub struct ExpireSweep {
    pub expired: Vec<AssignmentProposal>,
    /// Shifts returned to matching because their last live proposal expired
    pub reopened_shifts: Vec<ShiftId>,
}

/// Typed, transactional persistence operations
///
/// Transactional semantics live in dedicated operations
/// (`persist_proposals`, `commit_response`, `expire_proposals`) rather
/// than an exposed closure primitive; each backend guarantees
/// serializability for them. Transient backend failures are retried
/// inside the implementation and surface as `Transient` only after
/// retries exhaust.
#[async_trait]
pub trait Store: Send + Sync {
    // --- shifts ---

    async fn insert_shift(&self, shift: OpenShift) -> EngineResult<OpenShift>;
    async fn get_shift(&self, id: ShiftId) -> EngineResult<OpenShift>;
    /// Optimistic write: `shift.version` must equal the stored version
    async fn update_shift(&self, shift: OpenShift) -> EngineResult<OpenShift>;
    /// Deterministic ordering: priority desc, scheduled date asc, id asc
    async fn find_open_shifts(
        &self,
        filter: &ShiftFilter,
        page: Page,
    ) -> EngineResult<PageResult<OpenShift>>;

    // --- caregivers ---

    async fn insert_caregiver(&self, caregiver: Caregiver) -> EngineResult<Caregiver>;
    async fn get_caregiver(&self, id: CaregiverId) -> EngineResult<Caregiver>;
    /// Coarse pre-scoring filter: same organization, ACTIVE employment,
    /// branch overlap
    async fn find_candidates_for_shift(&self, shift: &OpenShift) -> EngineResult<Vec<Caregiver>>;
    /// Assemble the full evaluation context for one caregiver
    async fn caregiver_context(
        &self,
        caregiver_id: CaregiverId,
        shift: &OpenShift,
        now: DateTime<Utc>,
    ) -> EngineResult<CaregiverContext>;
    /// Commit a visit window onto the caregiver's calendar
    async fn record_assigned_visit(
        &self,
        caregiver_id: CaregiverId,
        visit: VisitWindow,
    ) -> EngineResult<()>;
    async fn record_client_rating(
        &self,
        caregiver_id: CaregiverId,
        client_id: ClientId,
        rating: f64,
    ) -> EngineResult<()>;

    // --- proposals ---

    async fn get_proposal(&self, id: ProposalId) -> EngineResult<AssignmentProposal>;
    /// Optimistic write for single-row transitions (sent/viewed)
    async fn update_proposal(
        &self,
        proposal: AssignmentProposal,
    ) -> EngineResult<AssignmentProposal>;
    async fn find_proposals_for_shift(
        &self,
        shift_id: ShiftId,
    ) -> EngineResult<Vec<AssignmentProposal>>;
    /// Proposals in pending, sent, or viewed
    async fn find_nonterminal_proposals(
        &self,
        shift_id: ShiftId,
    ) -> EngineResult<Vec<AssignmentProposal>>;
    async fn find_proposals_for_caregiver(
        &self,
        caregiver_id: CaregiverId,
    ) -> EngineResult<Vec<AssignmentProposal>>;
    async fn find_expired_proposals(
        &self,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<AssignmentProposal>>;

    // --- transactional operations ---

    /// Atomically write a proposal batch, transition the shift, and
    /// append the history rows. Refuses when a non-terminal proposal
    /// already exists for any (shift, caregiver) pair or the shift is
    /// already assigned.
    async fn persist_proposals(
        &self,
        shift: OpenShift,
        proposals: Vec<AssignmentProposal>,
        history: Vec<MatchHistory>,
    ) -> EngineResult<OpenShift>;

    /// The respond path: validate the version, apply the response,
    /// supersede siblings on accept, transition the shift, and append
    /// history. Serializable per shift.
    async fn commit_response(
        &self,
        proposal_id: ProposalId,
        expected_version: u64,
        response: ProposalResponse,
        now: DateTime<Utc>,
    ) -> EngineResult<ResponseCommit>;

    /// Move every live proposal past its TTL to expired and append one
    /// history row per. Safe to run concurrently with `commit_response`.
    async fn expire_proposals(&self, now: DateTime<Utc>) -> EngineResult<ExpireSweep>;

    // --- configurations ---

    async fn insert_configuration(
        &self,
        config: MatchingConfiguration,
    ) -> EngineResult<MatchingConfiguration>;
    async fn update_configuration(
        &self,
        config: MatchingConfiguration,
    ) -> EngineResult<MatchingConfiguration>;
    async fn get_configuration(&self, id: ConfigId) -> EngineResult<MatchingConfiguration>;
    /// Branch override when present, else the organization default
    async fn resolve_configuration(
        &self,
        organization_id: OrganizationId,
        branch_id: Option<BranchId>,
    ) -> EngineResult<Option<MatchingConfiguration>>;

    // --- preferences ---

    async fn upsert_preferences(
        &self,
        profile: CaregiverPreferenceProfile,
    ) -> EngineResult<CaregiverPreferenceProfile>;
    async fn get_preferences(
        &self,
        caregiver_id: CaregiverId,
    ) -> EngineResult<Option<CaregiverPreferenceProfile>>;

    // --- bulk jobs ---

    async fn insert_bulk_request(&self, request: BulkMatchRequest)
        -> EngineResult<BulkMatchRequest>;
    async fn update_bulk_request(&self, request: BulkMatchRequest)
        -> EngineResult<BulkMatchRequest>;
    async fn get_bulk_request(&self, id: BulkMatchId) -> EngineResult<BulkMatchRequest>;

    // --- history ---

    async fn append_history(&self, rows: Vec<MatchHistory>) -> EngineResult<()>;
    async fn find_history_for_shift(&self, shift_id: ShiftId) -> EngineResult<Vec<MatchHistory>>;
    async fn find_history_for_organization(
        &self,
        organization_id: OrganizationId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<Vec<MatchHistory>>;

    // --- experiments and model registry ---

    async fn insert_experiment(&self, experiment: Experiment) -> EngineResult<Experiment>;
    async fn get_active_experiment(
        &self,
        organization_id: OrganizationId,
    ) -> EngineResult<Option<Experiment>>;
    /// Write-once: returns the stored assignment when one exists
    async fn get_or_insert_assignment(
        &self,
        assignment: ExperimentAssignment,
    ) -> EngineResult<ExperimentAssignment>;
    async fn record_experiment_outcome(
        &self,
        shift_id: ShiftId,
        outcome: VariantOutcome,
    ) -> EngineResult<()>;
    async fn list_assignments(
        &self,
        experiment_id: ExperimentId,
    ) -> EngineResult<Vec<ExperimentAssignment>>;
    async fn upsert_model_registration(
        &self,
        registration: ModelRegistration,
    ) -> EngineResult<ModelRegistration>;
    async fn get_model_registration(
        &self,
        organization_id: OrganizationId,
    ) -> EngineResult<Option<ModelRegistration>>;
}

/// Sort open shifts deterministically: priority desc, date asc, id asc
pub(crate) fn sort_shifts(shifts: &mut [OpenShift]) {
    shifts.sort_by(|a, b| {
        b.priority
            .rank()
            .cmp(&a.priority.rank())
            .then(a.scheduled_date.cmp(&b.scheduled_date))
            .then(a.id.cmp(&b.id))
    });
}

/// Raw ingredients a backend gathers before building a context
pub(crate) struct ContextSources<'a> {
    pub caregiver: Caregiver,
    /// All committed visits on the caregiver's calendar
    pub visits: &'a [VisitWindow],
    /// Latest rating the shift's client gave this caregiver
    pub client_rating: Option<f64>,
    /// Completed visits for the client across all caregivers
    pub client_total_visits: u32,
    /// History rows for this caregiver inside the recent window
    pub recent_history: &'a [MatchHistory],
}

/// Shared context assembly used by every backend
pub(crate) fn assemble_context(
    sources: ContextSources<'_>,
    shift: &OpenShift,
) -> CaregiverContext {
    let week_start = shift.scheduled_date
        - Duration::days(shift.scheduled_date.weekday().num_days_from_monday() as i64);
    let week_end = week_start + Duration::days(7);

    let current_week_minutes: u32 = sources
        .visits
        .iter()
        .filter(|v| v.date >= week_start && v.date < week_end)
        .map(VisitWindow::minutes)
        .sum();

    let buffer = Duration::minutes(TRAVEL_BUFFER_MINUTES);
    let window_start = shift.window_start() - buffer;
    let window_end = shift.window_end() + buffer;
    let conflicting_visits: Vec<VisitWindow> = sources
        .visits
        .iter()
        .filter(|v| v.start() < window_end && v.end() > window_start)
        .cloned()
        .collect();

    let previous_visits_with_client = sources
        .visits
        .iter()
        .filter(|v| v.client_id == shift.client_id && v.start() < shift.window_start())
        .count() as u32;

    let recent_rejections_30d = sources
        .recent_history
        .iter()
        .filter(|h| h.outcome == MatchOutcome::Rejected)
        .count() as u32;

    let responded: u32 = sources
        .recent_history
        .iter()
        .filter(|h| {
            matches!(
                h.outcome,
                MatchOutcome::Accepted
                    | MatchOutcome::AutoAssigned
                    | MatchOutcome::Rejected
                    | MatchOutcome::Expired
            )
        })
        .count() as u32;
    let accepted: u32 = sources
        .recent_history
        .iter()
        .filter(|h| {
            matches!(h.outcome, MatchOutcome::Accepted | MatchOutcome::AutoAssigned)
        })
        .count() as u32;
    let acceptance_rate_30d = if responded > 0 {
        Some(accepted as f64 / responded as f64)
    } else {
        None
    };

    let distance_miles = match (
        sources.caregiver.latitude,
        sources.caregiver.longitude,
        shift.location.latitude,
        shift.location.longitude,
    ) {
        (Some(lat1), Some(lon1), Some(lat2), Some(lon2)) => {
            Some(haversine_miles(lat1, lon1, lat2, lon2))
        }
        _ => None,
    };
    // Straight-line distance at an assumed 30 mph average
    let travel_minutes = distance_miles.map(|d| (d * 2.0).ceil() as u32);

    let reliability_score = sources.caregiver.reliability_score;

    CaregiverContext {
        caregiver: sources.caregiver,
        current_week_minutes,
        conflicting_visits,
        previous_visits_with_client,
        client_total_visits: sources.client_total_visits,
        latest_client_rating: sources.client_rating,
        reliability_score,
        recent_rejections_30d,
        acceptance_rate_30d,
        distance_miles,
        travel_minutes,
    }
}

/// Great-circle distance in miles
pub(crate) fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_MILES: f64 = 3958.8;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * a.sqrt().asin()
}
