//! Bulk match job records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::configuration::OptimizationGoal;
use crate::ids::{BulkMatchId, OrganizationId, ShiftId};

/// Lifecycle of a bulk optimization job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkMatchStatus {
    Queued,
    Running,
    Completed,
    /// Finished, but some shifts could not be planned
    PartiallyCompleted,
    Failed,
}

/// Parameters for the optional genetic refinement pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneticParameters {
    pub population_size: usize,
    pub generations: usize,
    /// Per-gene mutation chance, in percent
    pub mutation_percent: u8,
    pub tournament_size: usize,
}

impl Default for GeneticParameters {
    fn default() -> Self {
        Self {
            population_size: 40,
            generations: 60,
            mutation_percent: 5,
            tournament_size: 3,
        }
    }
}

/// Job record for one optimizer run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkMatchRequest {
    pub id: BulkMatchId,
    pub organization_id: OrganizationId,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    /// Restrict the run to these shifts when non-empty
    pub shift_ids: Vec<ShiftId>,
    pub goal: OptimizationGoal,
    /// Enables the genetic pass after the greedy baseline
    pub genetic: Option<GeneticParameters>,
    pub status: BulkMatchStatus,
    pub total_shifts: u32,
    pub matched_shifts: u32,
    pub unmatched_shifts: u32,
    pub proposals_generated: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl BulkMatchRequest {
    /// Create a queued job
    pub fn new(
        organization_id: OrganizationId,
        date_from: NaiveDate,
        date_to: NaiveDate,
        goal: OptimizationGoal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BulkMatchId::new(),
            organization_id,
            date_from,
            date_to,
            shift_ids: Vec::new(),
            goal,
            genetic: None,
            status: BulkMatchStatus::Queued,
            total_shifts: 0,
            matched_shifts: 0,
            unmatched_shifts: 0,
            proposals_generated: 0,
            error: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}
