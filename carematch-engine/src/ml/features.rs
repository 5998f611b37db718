//! Feature extraction for the learned scoring model
//!
//! The vector layout is stable and versioned; the offline training
//! pipeline consumes the same encoding. Unknown numeric inputs encode
//! as -1.0 so the model can distinguish absence from zero.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::caregiver::CaregiverContext;
use crate::scoring::MatchCandidate;
use crate::shift::OpenShift;

/// Version tag for the feature vector layout
pub const FEATURE_VECTOR_VERSION: u32 = 1;

/// Input vector for `predict`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Layout version tag
    pub version: u32,

    // Rule-based dimensional scores, 0-100
    pub skill_match: f64,
    pub availability_match: f64,
    pub proximity_match: f64,
    pub preference_match: f64,
    pub experience_match: f64,
    pub reliability_match: f64,
    pub compliance_match: f64,
    pub capacity_match: f64,

    // Pairing geometry
    /// Straight-line miles; -1 when unknown
    pub distance_miles: f64,
    /// Estimated minutes of travel; -1 when unknown
    pub travel_minutes: f64,

    // Relationship history
    pub previous_visits_with_client: f64,
    pub reliability_score: f64,
    /// Minutes left under the weekly cap; -1 when uncapped
    pub remaining_week_minutes: f64,

    // Shift shape
    pub shift_duration_minutes: f64,
    /// 0 = Monday .. 6 = Sunday
    pub day_of_week: f64,
    pub hour_of_day: f64,
    pub is_weekend: bool,
    /// Starts at or after 18:00
    pub is_evening: bool,
    /// Starts at or after 22:00 or before 06:00
    pub is_night: bool,

    // Caregiver profile
    pub tenure_years: f64,
    /// -1 when untracked
    pub acceptance_rate_30d: f64,
    /// -1 when untracked
    pub no_show_rate_30d: f64,
    /// -1 when the client never rated this caregiver
    pub avg_client_rating: f64,
    pub client_total_visits: f64,

    // Requirement flags
    pub requires_specialization: bool,
    pub has_gender_preference: bool,
    pub has_language_preference: bool,

    // Urgency signals
    /// Hours between evaluation and shift start; negative if started
    pub time_to_shift_hours: f64,
    pub competing_caregivers: f64,
    pub priority: f64,
    pub recent_rejections_30d: f64,
}

/// Extract the feature vector for one evaluated pairing
pub fn extract(
    shift: &OpenShift,
    ctx: &CaregiverContext,
    candidate: &MatchCandidate,
    competing_caregivers: usize,
    now: DateTime<Utc>,
) -> FeatureVector {
    let dims = &candidate.dimensions;
    let start = shift.window_start();
    let start_hour = start.hour();
    let weekday = shift.scheduled_date.weekday().num_days_from_monday();
    let time_to_shift_hours =
        (start - now.naive_utc()).num_minutes() as f64 / 60.0;

    FeatureVector {
        version: FEATURE_VECTOR_VERSION,
        skill_match: dims.skill_match as f64,
        availability_match: dims.availability_match as f64,
        proximity_match: dims.proximity_match as f64,
        preference_match: dims.preference_match as f64,
        experience_match: dims.experience_match as f64,
        reliability_match: dims.reliability_match as f64,
        compliance_match: dims.compliance_match as f64,
        capacity_match: dims.capacity_match as f64,
        distance_miles: ctx.distance_miles.unwrap_or(-1.0),
        travel_minutes: ctx.travel_minutes.map(f64::from).unwrap_or(-1.0),
        previous_visits_with_client: ctx.previous_visits_with_client as f64,
        reliability_score: ctx.reliability_score,
        remaining_week_minutes: candidate
            .remaining_week_minutes
            .map(|m| m as f64)
            .unwrap_or(-1.0),
        shift_duration_minutes: shift.duration_minutes as f64,
        day_of_week: weekday as f64,
        hour_of_day: start_hour as f64,
        is_weekend: weekday >= 5,
        is_evening: start_hour >= 18,
        is_night: start_hour >= 22 || start_hour < 6,
        tenure_years: ctx.caregiver.tenure_years(now.date_naive()),
        acceptance_rate_30d: ctx.acceptance_rate_30d.unwrap_or(-1.0),
        no_show_rate_30d: ctx.caregiver.no_show_rate_30d.unwrap_or(-1.0),
        avg_client_rating: ctx.latest_client_rating.unwrap_or(-1.0),
        client_total_visits: ctx.client_total_visits as f64,
        requires_specialization: !shift.required_certifications.is_empty(),
        has_gender_preference: shift.gender_preference.is_some(),
        has_language_preference: shift.language_preference.is_some(),
        time_to_shift_hours,
        competing_caregivers: competing_caregivers as f64,
        priority: shift.priority.rank() as f64,
        recent_rejections_30d: ctx.recent_rejections_30d as f64,
    }
}
