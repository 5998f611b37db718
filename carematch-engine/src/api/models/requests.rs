//! Unified API request models
//!
//! Request models shared by all transports.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bulk::GeneticParameters;
use crate::caregiver::{Gender, NotificationChannel, TimeRange};
use crate::configuration::{HardConstraints, MatchingThresholds, MatchingWeights, OptimizationFlags, OptimizationGoal};
use crate::ids::{BranchId, CaregiverId, ClientId, ShiftId};
use crate::proposal::RejectionCategory;
use crate::shift::{MatchingStatus, ShiftLocation, ShiftPriority, ShiftUrgency};

/// Register an open shift from an upstream visit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateShiftRequest {
    pub visit_id: Uuid,
    pub branch_id: BranchId,
    pub client_id: ClientId,
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub timezone: String,
    pub duration_minutes: u32,
    pub service_type: String,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub required_certifications: Vec<String>,
    #[serde(default)]
    pub preferred_caregivers: Vec<CaregiverId>,
    #[serde(default)]
    pub blocked_caregivers: Vec<CaregiverId>,
    #[serde(default)]
    pub gender_preference: Option<Gender>,
    #[serde(default)]
    pub language_preference: Option<String>,
    pub location: ShiftLocation,
    pub priority: ShiftPriority,
    pub urgency: ShiftUrgency,
    #[serde(default)]
    pub fill_by: Option<DateTime<Utc>>,
}

/// Filter and pagination for shift listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListShiftsRequest {
    #[serde(default)]
    pub status: Option<MatchingStatus>,
    #[serde(default)]
    pub branch_id: Option<BranchId>,
    #[serde(default)]
    pub scheduled_from: Option<NaiveDate>,
    #[serde(default)]
    pub scheduled_to: Option<NaiveDate>,
    #[serde(default)]
    pub urgency: Option<ShiftUrgency>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Run the evaluator for one shift
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchShiftRequest {
    #[serde(default)]
    pub max_candidates: Option<usize>,
    /// Write proposals for the top candidates; defaults to true
    #[serde(default = "default_true")]
    pub auto_propose: bool,
    #[serde(default)]
    pub use_ml: bool,
    #[serde(default = "default_true")]
    pub include_ineligible: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MatchShiftRequest {
    fn default() -> Self {
        Self {
            max_candidates: None,
            auto_propose: true,
            use_ml: false,
            include_ineligible: true,
        }
    }
}

/// Operator creates a proposal for a specific caregiver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProposalRequest {
    pub shift_id: ShiftId,
    pub caregiver_id: CaregiverId,
}

/// Accept or reject a proposal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondRequest {
    pub accept: bool,
    /// Version the caller last read; guards against lost updates
    pub expected_version: u64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub category: Option<RejectionCategory>,
}

/// Caregiver self-selects a shift
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectShiftRequest {
    pub caregiver_id: CaregiverId,
}

/// Submit a bulk optimization job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkMatchSubmitRequest {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    #[serde(default)]
    pub shift_ids: Vec<ShiftId>,
    pub goal: OptimizationGoal,
    #[serde(default)]
    pub genetic: Option<GeneticParameters>,
}

/// Upsert a caregiver preference profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutPreferencesRequest {
    #[serde(default)]
    pub preferred_days: Vec<Weekday>,
    #[serde(default)]
    pub preferred_time_ranges: Vec<TimeRange>,
    #[serde(default)]
    pub max_shifts_per_week: Option<u32>,
    #[serde(default)]
    pub max_hours_per_week: Option<u32>,
    #[serde(default)]
    pub max_travel_miles: Option<f64>,
    #[serde(default)]
    pub willing_urgent: bool,
    #[serde(default)]
    pub willing_weekends: bool,
    #[serde(default)]
    pub willing_holidays: bool,
    #[serde(default)]
    pub accept_auto_assignment: bool,
    #[serde(default)]
    pub notification_channels: Vec<NotificationChannel>,
    #[serde(default)]
    pub quiet_hours: Option<TimeRange>,
}

/// Create or replace a matching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutConfigurationRequest {
    #[serde(default)]
    pub branch_id: Option<BranchId>,
    pub name: String,
    pub weights: MatchingWeights,
    pub constraints: HardConstraints,
    pub thresholds: MatchingThresholds,
    pub optimization: OptimizationFlags,
    /// Version the caller last read; omitted on create
    #[serde(default)]
    pub expected_version: Option<u64>,
}

/// Reporting window for the matching KPIs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsRequest {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}
