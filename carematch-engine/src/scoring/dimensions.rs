//! Dimensional scores
//!
//! Each dimension maps one aspect of the (shift, caregiver) pairing to
//! 0-100. The weighted combination produces the overall score.

use serde::{Deserialize, Serialize};

use crate::caregiver::{CaregiverContext, ComplianceStatus};
use crate::configuration::{MatchingConfiguration, MatchingWeights};
use crate::shift::OpenShift;

/// The eight dimensional scores, each 0-100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub skill_match: u8,
    pub availability_match: u8,
    pub proximity_match: u8,
    pub preference_match: u8,
    pub experience_match: u8,
    pub reliability_match: u8,
    pub compliance_match: u8,
    pub capacity_match: u8,
}

impl DimensionScores {
    /// Compute all dimensions for one pairing
    pub fn compute(
        shift: &OpenShift,
        ctx: &CaregiverContext,
        config: &MatchingConfiguration,
    ) -> Self {
        Self {
            skill_match: skill_match(shift, ctx),
            availability_match: availability_match(ctx),
            proximity_match: proximity_match(ctx, config),
            preference_match: preference_match(shift, ctx),
            experience_match: experience_match(ctx),
            reliability_match: reliability_match(ctx, config),
            compliance_match: compliance_match(ctx),
            capacity_match: capacity_match(shift, ctx),
        }
    }

    /// Weighted overall score: round(sum(score_i * weight_i) / 100)
    pub fn weighted_overall(&self, weights: &MatchingWeights) -> u8 {
        let sum = self.skill_match as u32 * weights.skill_match as u32
            + self.availability_match as u32 * weights.availability_match as u32
            + self.proximity_match as u32 * weights.proximity_match as u32
            + self.preference_match as u32 * weights.preference_match as u32
            + self.experience_match as u32 * weights.experience_match as u32
            + self.reliability_match as u32 * weights.reliability_match as u32
            + self.compliance_match as u32 * weights.compliance_match as u32
            + self.capacity_match as u32 * weights.capacity_match as u32;
        // Round-half-up integer division keeps the kernel float-free
        ((sum + 50) / 100).min(100) as u8
    }
}

fn clamp_score(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

/// 100 minus 30 per missing required skill minus 40 per missing
/// required certification, floored at 0
fn skill_match(shift: &OpenShift, ctx: &CaregiverContext) -> u8 {
    let caregiver = &ctx.caregiver;
    let missing_skills = shift
        .required_skills
        .iter()
        .filter(|s| !caregiver.has_skill(s))
        .count() as i64;
    let missing_certs = shift
        .required_certifications
        .iter()
        .filter(|c| !caregiver.has_active_certification(c))
        .count() as i64;
    (100 - 30 * missing_skills - 40 * missing_certs).max(0) as u8
}

/// All-or-nothing: any conflicting visit zeroes availability
fn availability_match(ctx: &CaregiverContext) -> u8 {
    if ctx.conflicting_visits.is_empty() {
        100
    } else {
        0
    }
}

/// 50 when distance unknown; else linear from 100 at 0 miles down to
/// 20 at the travel cap; 0 beyond the cap
fn proximity_match(ctx: &CaregiverContext, config: &MatchingConfiguration) -> u8 {
    let max = config.constraints.max_travel_distance_miles;
    match ctx.distance_miles {
        None => 50,
        Some(d) if d <= 0.0 => 100,
        Some(d) if max > 0.0 && d <= max => clamp_score(100.0 - (d / max) * 80.0),
        Some(_) => 0,
    }
}

/// Starts at 50, adjusted by client preference, gender, and language
fn preference_match(shift: &OpenShift, ctx: &CaregiverContext) -> u8 {
    let caregiver = &ctx.caregiver;

    if shift.blocked_caregivers.contains(&caregiver.id) {
        return 0;
    }

    let mut score: f64 = 50.0;
    if shift.preferred_caregivers.contains(&caregiver.id) {
        score += 30.0;
    }
    if let Some(wanted) = shift.gender_preference {
        if caregiver.gender == wanted {
            score += 10.0;
        } else {
            score -= 10.0;
        }
    }
    if let Some(wanted) = &shift.language_preference {
        if caregiver
            .languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(wanted))
        {
            score += 10.0;
        } else {
            score -= 15.0;
        }
    }
    clamp_score(score)
}

/// Starts at 50; prior visits with the client and a good rating raise it
fn experience_match(ctx: &CaregiverContext) -> u8 {
    let mut score: f64 = 50.0;
    score += (ctx.previous_visits_with_client as f64 * 5.0).min(30.0);
    if let Some(rating) = ctx.latest_client_rating {
        score += 10.0 * (rating - 3.0);
    }
    clamp_score(score)
}

/// Starts at the rolling reliability score, adjusted by configuration
fn reliability_match(ctx: &CaregiverContext, config: &MatchingConfiguration) -> u8 {
    let mut score = ctx.reliability_score;
    if config.optimization.penalize_frequent_rejections {
        score -= 5.0 * ctx.recent_rejections_30d as f64;
    }
    if config.optimization.boost_reliable_performers && ctx.reliability_score >= 90.0 {
        score += 10.0;
    }
    clamp_score(score)
}

/// Direct mapping from aggregated compliance status
fn compliance_match(ctx: &CaregiverContext) -> u8 {
    match ctx.caregiver.compliance_status {
        ComplianceStatus::Compliant => 100,
        ComplianceStatus::ExpiringSoon => 70,
        ComplianceStatus::PendingVerification => 50,
        ComplianceStatus::Expired | ComplianceStatus::NonCompliant => 0,
    }
}

/// Rewards landing the caregiver's week in the 60-80% utilization band
fn capacity_match(shift: &OpenShift, ctx: &CaregiverContext) -> u8 {
    let Some(max_hours) = ctx.caregiver.max_hours_per_week else {
        return 100;
    };
    let cap_minutes = max_hours * 60;
    let projected = ctx.current_week_minutes + shift.duration_minutes;
    if projected > cap_minutes {
        return 0;
    }
    let utilization = projected as f64 / cap_minutes as f64;
    if (0.6..=0.8).contains(&utilization) {
        100
    } else if utilization < 0.6 {
        80
    } else {
        60
    }
}
