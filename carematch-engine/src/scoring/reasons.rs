//! Match reasons
//!
//! Compact justification records attached to a candidate, one per
//! dimension that pushed the score meaningfully up or down. Order
//! follows dimension order, so ties resolve by insertion.

use serde::{Deserialize, Serialize};

use crate::configuration::MatchingWeights;
use crate::scoring::dimensions::DimensionScores;
use crate::scoring::eligibility::{EligibilityIssue, IssueSeverity};

/// Direction a dimension pushed the overall score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonImpact {
    Positive,
    Negative,
}

/// A scoped justification for a candidate's score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReason {
    /// Dimension or rule that produced the reason
    pub category: String,
    pub description: String,
    pub impact: ReasonImpact,
    /// Configured weight of the originating dimension
    pub weight: u8,
}

const POSITIVE_FLOOR: u8 = 80;
const NEGATIVE_CEILING: u8 = 40;

/// Build the reason list for one evaluation
pub fn build_reasons(
    dimensions: &DimensionScores,
    issues: &[EligibilityIssue],
    weights: &MatchingWeights,
) -> Vec<MatchReason> {
    let mut reasons = Vec::new();

    let entries: [(&str, u8, u8, &str, &str); 8] = [
        (
            "skill_match",
            dimensions.skill_match,
            weights.skill_match,
            "holds every required skill and certification",
            "missing required skills or certifications",
        ),
        (
            "availability_match",
            dimensions.availability_match,
            weights.availability_match,
            "calendar is clear for the shift window",
            "committed visits conflict with the shift window",
        ),
        (
            "proximity_match",
            dimensions.proximity_match,
            weights.proximity_match,
            "close to the client's location",
            "far from the client's location",
        ),
        (
            "preference_match",
            dimensions.preference_match,
            weights.preference_match,
            "aligned with the client's stated preferences",
            "misaligned with the client's stated preferences",
        ),
        (
            "experience_match",
            dimensions.experience_match,
            weights.experience_match,
            "established history with this client",
            "little history with this client",
        ),
        (
            "reliability_match",
            dimensions.reliability_match,
            weights.reliability_match,
            "strong reliability record",
            "weak reliability record",
        ),
        (
            "compliance_match",
            dimensions.compliance_match,
            weights.compliance_match,
            "credentials fully compliant",
            "credential compliance concerns",
        ),
        (
            "capacity_match",
            dimensions.capacity_match,
            weights.capacity_match,
            "shift fits well within the weekly hour budget",
            "shift strains the weekly hour budget",
        ),
    ];

    for (category, score, weight, positive, negative) in entries {
        if score >= POSITIVE_FLOOR {
            reasons.push(MatchReason {
                category: category.to_string(),
                description: positive.to_string(),
                impact: ReasonImpact::Positive,
                weight,
            });
        } else if score <= NEGATIVE_CEILING {
            reasons.push(MatchReason {
                category: category.to_string(),
                description: negative.to_string(),
                impact: ReasonImpact::Negative,
                weight,
            });
        }
    }

    for issue in issues {
        if issue.severity == IssueSeverity::Blocking {
            reasons.push(MatchReason {
                category: "eligibility".to_string(),
                description: issue.detail.clone(),
                impact: ReasonImpact::Negative,
                weight: 0,
            });
        }
    }

    reasons
}
