//! Pure, deterministic scoring kernel
//!
//! Given an open shift, a caregiver context, and a matching
//! configuration, produces a [`MatchCandidate`]. No I/O, no clock
//! reads; equal inputs yield equal output. Missing inputs fall back to
//! neutral defaults rather than errors.

pub mod dimensions;
pub mod eligibility;
pub mod reasons;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::caregiver::{CaregiverContext, VisitWindow};
use crate::configuration::MatchingConfiguration;
use crate::ids::CaregiverId;
use crate::shift::OpenShift;

pub use dimensions::DimensionScores;
pub use eligibility::{EligibilityIssue, IssueKind, IssueSeverity};
pub use reasons::{MatchReason, ReasonImpact};

/// Quality band derived from overall score and eligibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBand {
    Excellent,
    Good,
    Fair,
    Poor,
    Ineligible,
}

impl QualityBand {
    /// Band for a score; ineligible candidates band as INELIGIBLE
    /// regardless of score
    pub fn from_score(eligible: bool, score: u8) -> Self {
        if !eligible {
            QualityBand::Ineligible
        } else if score >= 85 {
            QualityBand::Excellent
        } else if score >= 70 {
            QualityBand::Good
        } else if score >= 50 {
            QualityBand::Fair
        } else {
            QualityBand::Poor
        }
    }
}

/// Transient evaluation result for one (shift, caregiver) pairing
///
/// Never persisted; always recomputed. The proposal snapshot captures
/// the fields that must survive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub caregiver_id: CaregiverId,
    /// Weighted overall score, 0-100
    pub overall_score: u8,
    pub dimensions: DimensionScores,
    pub is_eligible: bool,
    /// Ordered findings; blocking issues disqualify
    pub issues: Vec<EligibilityIssue>,
    pub quality: QualityBand,
    pub reasons: Vec<MatchReason>,
    pub distance_miles: Option<f64>,
    pub conflicts: Vec<VisitWindow>,
    /// Minutes left under the weekly cap after this shift, if capped
    pub remaining_week_minutes: Option<i64>,
    pub previous_visits_with_client: u32,
    pub reliability_score: f64,
    pub computed_at: DateTime<Utc>,
}

/// Score one caregiver against one shift
pub fn score_candidate(
    shift: &OpenShift,
    ctx: &CaregiverContext,
    config: &MatchingConfiguration,
    computed_at: DateTime<Utc>,
) -> MatchCandidate {
    let issues = eligibility::evaluate(shift, ctx, config);
    let is_eligible = eligibility::is_eligible(&issues);
    let dimensions = DimensionScores::compute(shift, ctx, config);
    let overall_score = dimensions.weighted_overall(&config.weights);
    let reasons = reasons::build_reasons(&dimensions, &issues, &config.weights);

    let remaining_week_minutes = ctx.caregiver.max_hours_per_week.map(|cap| {
        cap as i64 * 60 - ctx.current_week_minutes as i64 - shift.duration_minutes as i64
    });

    MatchCandidate {
        caregiver_id: ctx.caregiver.id,
        overall_score,
        dimensions,
        is_eligible,
        issues,
        quality: QualityBand::from_score(is_eligible, overall_score),
        reasons,
        distance_miles: ctx.distance_miles,
        conflicts: ctx.conflicting_visits.clone(),
        remaining_week_minutes,
        previous_visits_with_client: ctx.previous_visits_with_client,
        reliability_score: ctx.reliability_score,
        computed_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caregiver::{
        Caregiver, CertificationStatus, ComplianceStatus, EmploymentStatus, Gender,
    };
    use crate::configuration::MatchingConfiguration;
    use crate::ids::{BranchId, CaregiverId, ClientId, OrganizationId, ShiftId};
    use crate::shift::{MatchingStatus, ShiftLocation, ShiftPriority, ShiftUrgency};
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use uuid::Uuid;

    fn shift() -> OpenShift {
        OpenShift {
            id: ShiftId::new(),
            visit_id: Uuid::new_v4(),
            organization_id: OrganizationId::new(),
            branch_id: BranchId::new(),
            client_id: ClientId::new(),
            scheduled_date: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            timezone: "America/New_York".to_string(),
            duration_minutes: 120,
            service_type: "personal_care".to_string(),
            required_skills: vec!["Personal Care".to_string()],
            required_certifications: vec!["CNA".to_string()],
            preferred_caregivers: vec![],
            blocked_caregivers: vec![],
            gender_preference: Some(Gender::Male),
            language_preference: None,
            location: ShiftLocation {
                address: "12 Main St".to_string(),
                latitude: None,
                longitude: None,
            },
            priority: ShiftPriority::Normal,
            urgency: ShiftUrgency::Scheduled,
            fill_by: None,
            status: MatchingStatus::New,
            needs_operator_review: false,
            created_at: chrono::Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            updated_at: chrono::Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            version: 1,
        }
    }

    fn context() -> CaregiverContext {
        let caregiver = Caregiver {
            id: CaregiverId(Uuid::from_u128(1)),
            organization_id: OrganizationId::new(),
            branch_ids: vec![BranchId::new()],
            name: "Sam Ortiz".to_string(),
            gender: Gender::Male,
            languages: vec!["English".to_string()],
            skills: vec!["Personal Care".to_string()],
            certifications: vec![crate::caregiver::Certification {
                name: "CNA".to_string(),
                status: CertificationStatus::Active,
                expires_on: None,
            }],
            employment_status: EmploymentStatus::Active,
            compliance_status: ComplianceStatus::Compliant,
            max_hours_per_week: Some(40),
            hired_on: None,
            latitude: None,
            longitude: None,
            reliability_score: 92.0,
            no_show_rate_30d: None,
            created_at: chrono::Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            updated_at: chrono::Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            version: 1,
        };
        CaregiverContext {
            caregiver,
            current_week_minutes: 1200,
            conflicting_visits: vec![],
            previous_visits_with_client: 4,
            client_total_visits: 10,
            latest_client_rating: Some(4.5),
            reliability_score: 92.0,
            recent_rejections_30d: 0,
            acceptance_rate_30d: Some(0.9),
            distance_miles: Some(2.5),
            travel_minutes: Some(8),
        }
    }

    #[test]
    fn strong_candidate_scores_excellent() {
        let now = chrono::Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let candidate = score_candidate(&shift(), &context(), &MatchingConfiguration::example(), now);
        assert!(candidate.is_eligible, "issues: {:?}", candidate.issues);
        assert!(candidate.overall_score >= 85, "score {}", candidate.overall_score);
        assert_eq!(candidate.quality, QualityBand::Excellent);
        assert!(!candidate.reasons.is_empty());
    }

    #[test]
    fn output_is_deterministic() {
        let now = chrono::Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let config = MatchingConfiguration::example();
        let a = score_candidate(&shift(), &context(), &config, now);
        let b = score_candidate(&shift(), &context(), &config, now);
        assert_eq!(a, b);
    }

    #[test]
    fn blocked_caregiver_is_ineligible_with_zero_preference() {
        let ctx = context();
        let mut s = shift();
        s.blocked_caregivers.push(ctx.caregiver.id);
        let now = chrono::Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let candidate = score_candidate(&s, &ctx, &MatchingConfiguration::example(), now);
        assert!(!candidate.is_eligible);
        assert_eq!(candidate.quality, QualityBand::Ineligible);
        assert_eq!(candidate.dimensions.preference_match, 0);
        assert_eq!(candidate.issues[0].kind, IssueKind::BlockedByClient);
    }

    #[test]
    fn hour_cap_overflow_blocks() {
        let mut ctx = context();
        ctx.caregiver.max_hours_per_week = Some(20);
        ctx.current_week_minutes = 1140;
        let now = chrono::Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let candidate = score_candidate(&shift(), &ctx, &MatchingConfiguration::example(), now);
        assert!(!candidate.is_eligible);
        assert!(candidate
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::OverHourLimit));
        assert_eq!(candidate.dimensions.capacity_match, 0);
        // Score is still reported for operator visibility
        assert!(candidate.overall_score > 0);
    }

    #[test]
    fn unknown_distance_scores_neutral_proximity() {
        let mut ctx = context();
        ctx.distance_miles = None;
        let now = chrono::Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let candidate = score_candidate(&shift(), &ctx, &MatchingConfiguration::example(), now);
        assert_eq!(candidate.dimensions.proximity_match, 50);
    }

    #[test]
    fn conflicts_zero_availability() {
        let mut ctx = context();
        ctx.conflicting_visits.push(crate::caregiver::VisitWindow {
            client_id: ClientId::new(),
            date: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        });
        let now = chrono::Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let candidate = score_candidate(&shift(), &ctx, &MatchingConfiguration::example(), now);
        assert_eq!(candidate.dimensions.availability_match, 0);
        assert!(candidate
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::ScheduleConflict));
    }

    #[test]
    fn quality_band_thresholds() {
        assert_eq!(QualityBand::from_score(true, 85), QualityBand::Excellent);
        assert_eq!(QualityBand::from_score(true, 84), QualityBand::Good);
        assert_eq!(QualityBand::from_score(true, 70), QualityBand::Good);
        assert_eq!(QualityBand::from_score(true, 69), QualityBand::Fair);
        assert_eq!(QualityBand::from_score(true, 50), QualityBand::Fair);
        assert_eq!(QualityBand::from_score(true, 49), QualityBand::Poor);
        assert_eq!(QualityBand::from_score(false, 99), QualityBand::Ineligible);
    }
}
