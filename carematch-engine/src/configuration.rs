//! Matching configuration
//!
//! Tunable weights, hard constraints, thresholds, and optimization
//! flags. One default per organization with optional per-branch
//! overrides; resolution prefers the branch row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::ids::{BranchId, ConfigId, OrganizationId};

/// Per-dimension weights; must sum to exactly 100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingWeights {
    pub skill_match: u8,
    pub availability_match: u8,
    pub proximity_match: u8,
    pub preference_match: u8,
    pub experience_match: u8,
    pub reliability_match: u8,
    pub compliance_match: u8,
    pub capacity_match: u8,
}

impl MatchingWeights {
    /// Sum of all weights
    pub fn total(&self) -> u32 {
        self.skill_match as u32
            + self.availability_match as u32
            + self.proximity_match as u32
            + self.preference_match as u32
            + self.experience_match as u32
            + self.reliability_match as u32
            + self.compliance_match as u32
            + self.capacity_match as u32
    }
}

impl Default for MatchingWeights {
    fn default() -> Self {
        Self {
            skill_match: 20,
            availability_match: 20,
            proximity_match: 15,
            preference_match: 10,
            experience_match: 10,
            reliability_match: 10,
            compliance_match: 10,
            capacity_match: 5,
        }
    }
}

/// Hard constraints applied before and during scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardConstraints {
    pub max_travel_distance_miles: f64,
    pub max_travel_minutes: Option<u32>,
    pub require_exact_skill_match: bool,
    pub require_active_certifications: bool,
    pub respect_gender_preference: bool,
    pub respect_language_preference: bool,
}

impl Default for HardConstraints {
    fn default() -> Self {
        Self {
            max_travel_distance_miles: 25.0,
            max_travel_minutes: Some(45),
            require_exact_skill_match: true,
            require_active_certifications: true,
            respect_gender_preference: true,
            respect_language_preference: true,
        }
    }
}

/// Score thresholds and proposal limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingThresholds {
    /// Self-selects at or above this score may auto-assign
    pub auto_assign_threshold: u8,
    /// Candidates below this score are never proposed
    pub min_score_for_proposal: u8,
    pub max_proposals_per_shift: usize,
    /// TTL applied to new proposals, in minutes
    pub proposal_ttl_minutes: i64,
}

impl Default for MatchingThresholds {
    fn default() -> Self {
        Self {
            auto_assign_threshold: 90,
            min_score_for_proposal: 60,
            max_proposals_per_shift: 5,
            proposal_ttl_minutes: 120,
        }
    }
}

/// Named objective for bulk optimization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptimizationGoal {
    BestMatch,
    FastestFill,
    CostEfficient,
    BalancedWorkload,
    Continuity,
    CaregiverSatisfaction,
}

/// Optimization behavior flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationFlags {
    pub optimize_for: OptimizationGoal,
    pub prioritize_continuity: bool,
    pub balance_workload: bool,
    pub penalize_frequent_rejections: bool,
    pub boost_reliable_performers: bool,
}

impl Default for OptimizationFlags {
    fn default() -> Self {
        Self {
            optimize_for: OptimizationGoal::BestMatch,
            prioritize_continuity: true,
            balance_workload: false,
            penalize_frequent_rejections: true,
            boost_reliable_performers: true,
        }
    }
}

/// Durable matching configuration row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfiguration {
    pub id: ConfigId,
    pub organization_id: OrganizationId,
    /// None marks the organization default; Some overrides one branch
    pub branch_id: Option<BranchId>,
    pub name: String,
    pub weights: MatchingWeights,
    pub constraints: HardConstraints,
    pub thresholds: MatchingThresholds,
    pub optimization: OptimizationFlags,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl MatchingConfiguration {
    /// Organization default configuration
    pub fn default_for(organization_id: OrganizationId, now: DateTime<Utc>) -> Self {
        Self {
            id: ConfigId::new(),
            organization_id,
            branch_id: None,
            name: "default".to_string(),
            weights: MatchingWeights::default(),
            constraints: HardConstraints::default(),
            thresholds: MatchingThresholds::default(),
            optimization: OptimizationFlags::default(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Validate weight sum, threshold ranges, and constraint sanity
    pub fn validate(&self) -> EngineResult<()> {
        let total = self.weights.total();
        if total != 100 {
            return Err(EngineError::Validation(format!(
                "matching weights must sum to 100, got {}",
                total
            )));
        }
        if self.thresholds.min_score_for_proposal > 100 {
            return Err(EngineError::Validation(format!(
                "min_score_for_proposal {} exceeds 100",
                self.thresholds.min_score_for_proposal
            )));
        }
        if self.thresholds.auto_assign_threshold > 100 {
            return Err(EngineError::Validation(format!(
                "auto_assign_threshold {} exceeds 100",
                self.thresholds.auto_assign_threshold
            )));
        }
        if self.thresholds.max_proposals_per_shift == 0 {
            return Err(EngineError::Validation(
                "max_proposals_per_shift cannot be zero".to_string(),
            ));
        }
        if self.thresholds.proposal_ttl_minutes <= 0 {
            return Err(EngineError::Validation(format!(
                "proposal_ttl_minutes {} must be positive",
                self.thresholds.proposal_ttl_minutes
            )));
        }
        if self.constraints.max_travel_distance_miles <= 0.0 {
            return Err(EngineError::Validation(format!(
                "max_travel_distance_miles {} must be positive",
                self.constraints.max_travel_distance_miles
            )));
        }
        Ok(())
    }

    /// A valid ready-made configuration for tests and examples
    pub fn example() -> Self {
        Self::default_for(OrganizationId::new(), Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_100() {
        assert_eq!(MatchingWeights::default().total(), 100);
        assert!(MatchingConfiguration::example().validate().is_ok());
    }

    #[test]
    fn rejects_weights_not_summing_to_100() {
        let mut config = MatchingConfiguration::example();
        config.weights.skill_match = 50;
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(err.to_string().contains("sum to 100"));
    }

    #[test]
    fn rejects_zero_proposal_limit() {
        let mut config = MatchingConfiguration::example();
        config.thresholds.max_proposals_per_shift = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_nonpositive_ttl() {
        let mut config = MatchingConfiguration::example();
        config.thresholds.proposal_ttl_minutes = 0;
        assert!(config.validate().is_err());
    }
}
