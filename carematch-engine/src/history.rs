//! Match history
//!
//! Append-only record per match attempt. Source for analytics KPIs and
//! model training rows; ordering follows commit order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::configuration::{MatchingConfiguration, MatchingThresholds, MatchingWeights, OptimizationGoal};
use crate::ids::{CaregiverId, OrganizationId, ShiftId};

/// Version tag for the configuration snapshot layout
pub const CONFIG_SNAPSHOT_VERSION: u32 = 1;

/// Outcome of one match attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    Proposed,
    Accepted,
    Rejected,
    Expired,
    Superseded,
    Withdrawn,
    AutoAssigned,
    NoMatch,
}

/// Tagged snapshot of the configuration used for an attempt
///
/// Explicit versioned record, never an opaque bag: analytics reads
/// these rows long after the live configuration has changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// Layout version tag
    pub version: u32,
    pub weights: MatchingWeights,
    pub thresholds: MatchingThresholds,
    pub optimize_for: OptimizationGoal,
}

impl ConfigSnapshot {
    /// Capture the analytics-relevant parts of a configuration
    pub fn capture(config: &MatchingConfiguration) -> Self {
        Self {
            version: CONFIG_SNAPSHOT_VERSION,
            weights: config.weights,
            thresholds: config.thresholds.clone(),
            optimize_for: config.optimization.optimize_for,
        }
    }
}

/// One append-only history row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchHistory {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub shift_id: ShiftId,
    pub caregiver_id: CaregiverId,
    /// Ordinal of this attempt for the shift, starting at 1
    pub attempt: u32,
    pub score: u8,
    pub outcome: MatchOutcome,
    /// Seconds between proposal and response, when a response happened
    pub response_seconds: Option<i64>,
    pub config: ConfigSnapshot,
    pub recorded_at: DateTime<Utc>,
}

impl MatchHistory {
    /// Build a history row for one attempt
    pub fn record(
        organization_id: OrganizationId,
        shift_id: ShiftId,
        caregiver_id: CaregiverId,
        attempt: u32,
        score: u8,
        outcome: MatchOutcome,
        config: ConfigSnapshot,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            shift_id,
            caregiver_id,
            attempt,
            score,
            outcome,
            response_seconds: None,
            config,
            recorded_at,
        }
    }

    /// Attach the observed response latency
    pub fn with_response_seconds(mut self, seconds: i64) -> Self {
        self.response_seconds = Some(seconds);
        self
    }
}
