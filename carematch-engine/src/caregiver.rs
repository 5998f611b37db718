//! Caregiver directory rows, evaluation context, and preference profiles

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::ids::{BranchId, CaregiverId, ClientId, OrganizationId};

/// Gender as recorded on the caregiver or requested on a shift
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    NonBinary,
    Unspecified,
}

/// Employment status; only ACTIVE caregivers are matchable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    Active,
    Inactive,
    OnLeave,
    Terminated,
}

/// Aggregated credential validity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    ExpiringSoon,
    PendingVerification,
    Expired,
    NonCompliant,
}

/// Status of a single certification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificationStatus {
    Active,
    Expired,
    Pending,
    Revoked,
}

/// A named certification held by a caregiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certification {
    pub name: String,
    pub status: CertificationStatus,
    pub expires_on: Option<NaiveDate>,
}

/// Directory row for a caregiver
///
/// Seeded by the hosting platform; the engine treats it as read-mostly
/// input to candidate queries and context assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caregiver {
    pub id: CaregiverId,
    pub organization_id: OrganizationId,
    pub branch_ids: Vec<BranchId>,
    pub name: String,
    pub gender: Gender,
    pub languages: Vec<String>,
    pub skills: Vec<String>,
    pub certifications: Vec<Certification>,
    pub employment_status: EmploymentStatus,
    pub compliance_status: ComplianceStatus,
    /// Weekly hour cap; None means uncapped
    pub max_hours_per_week: Option<u32>,
    pub hired_on: Option<NaiveDate>,
    /// Home base coordinates for the distance scalar
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Rolling reliability score, 0-100
    pub reliability_score: f64,
    /// Rolling 30-day no-show rate, if tracked upstream
    pub no_show_rate_30d: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Caregiver {
    /// Whether the caregiver lists the given skill
    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills.iter().any(|s| s.eq_ignore_ascii_case(skill))
    }

    /// Whether the caregiver holds the certification in ACTIVE status
    pub fn has_active_certification(&self, name: &str) -> bool {
        self.certifications.iter().any(|c| {
            c.status == CertificationStatus::Active && c.name.eq_ignore_ascii_case(name)
        })
    }

    /// Years since hire, fractional
    pub fn tenure_years(&self, today: NaiveDate) -> f64 {
        match self.hired_on {
            Some(hired) => ((today - hired).num_days().max(0) as f64) / 365.25,
            None => 0.0,
        }
    }
}

/// A committed visit window on a caregiver's calendar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitWindow {
    pub client_id: ClientId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl VisitWindow {
    /// Local start of the visit
    pub fn start(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    /// Local end; overnight visits spill to the next day
    pub fn end(&self) -> NaiveDateTime {
        if self.end_time > self.start_time {
            self.date.and_time(self.end_time)
        } else {
            self.date.succ_opt().unwrap_or(self.date).and_time(self.end_time)
        }
    }

    /// Duration in minutes
    pub fn minutes(&self) -> u32 {
        (self.end() - self.start()).num_minutes().max(0) as u32
    }
}

/// Everything the scoring kernel needs to know about one caregiver
/// relative to one shift. Assembled by the store, consumed read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaregiverContext {
    pub caregiver: Caregiver,
    /// Minutes already committed in the shift's week
    pub current_week_minutes: u32,
    /// Committed visits overlapping the shift window plus travel buffer
    pub conflicting_visits: Vec<VisitWindow>,
    /// Completed visits with this shift's client
    pub previous_visits_with_client: u32,
    /// Total completed visits for this client across all caregivers
    pub client_total_visits: u32,
    /// Most recent rating this client gave the caregiver, 1-5
    pub latest_client_rating: Option<f64>,
    pub reliability_score: f64,
    /// Proposals this caregiver rejected in the last 30 days
    pub recent_rejections_30d: u32,
    /// Share of proposals accepted over the last 30 days
    pub acceptance_rate_30d: Option<f64>,
    /// Straight-line distance to the shift, in miles
    pub distance_miles: Option<f64>,
    /// Estimated travel time, in minutes
    pub travel_minutes: Option<u32>,
}

impl CaregiverContext {
    /// Fallback used when context assembly fails for one caregiver:
    /// distance unknown, neutral reliability, no conflicts.
    pub fn degraded(caregiver: Caregiver) -> Self {
        Self {
            caregiver,
            current_week_minutes: 0,
            conflicting_visits: Vec::new(),
            previous_visits_with_client: 0,
            client_total_visits: 0,
            latest_client_rating: None,
            reliability_score: 50.0,
            recent_rejections_30d: 0,
            acceptance_rate_30d: None,
            distance_miles: None,
            travel_minutes: None,
        }
    }
}

/// Preferred notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Push,
    Sms,
    Email,
    PhoneCall,
    InApp,
}

/// A local wall-clock time range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Self-service preferences, one per caregiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaregiverPreferenceProfile {
    pub caregiver_id: CaregiverId,
    pub preferred_days: Vec<Weekday>,
    pub preferred_time_ranges: Vec<TimeRange>,
    pub max_shifts_per_week: Option<u32>,
    pub max_hours_per_week: Option<u32>,
    pub max_travel_miles: Option<f64>,
    pub willing_urgent: bool,
    pub willing_weekends: bool,
    pub willing_holidays: bool,
    /// Opt-in for immediate assignment on high-scoring self-selects
    pub accept_auto_assignment: bool,
    pub notification_channels: Vec<NotificationChannel>,
    pub quiet_hours: Option<TimeRange>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl CaregiverPreferenceProfile {
    /// Empty profile with conservative defaults
    pub fn empty(caregiver_id: CaregiverId, now: DateTime<Utc>) -> Self {
        Self {
            caregiver_id,
            preferred_days: Vec::new(),
            preferred_time_ranges: Vec::new(),
            max_shifts_per_week: None,
            max_hours_per_week: None,
            max_travel_miles: None,
            willing_urgent: false,
            willing_weekends: false,
            willing_holidays: false,
            accept_auto_assignment: false,
            notification_channels: vec![NotificationChannel::Push],
            quiet_hours: None,
            updated_at: now,
            version: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caregiver() -> Caregiver {
        Caregiver {
            id: CaregiverId::new(),
            organization_id: OrganizationId::new(),
            branch_ids: vec![BranchId::new()],
            name: "Alex Reyes".to_string(),
            gender: Gender::Female,
            languages: vec!["English".to_string()],
            skills: vec!["Personal Care".to_string()],
            certifications: vec![Certification {
                name: "CNA".to_string(),
                status: CertificationStatus::Active,
                expires_on: None,
            }],
            employment_status: EmploymentStatus::Active,
            compliance_status: ComplianceStatus::Compliant,
            max_hours_per_week: Some(40),
            hired_on: NaiveDate::from_ymd_opt(2024, 1, 15),
            latitude: None,
            longitude: None,
            reliability_score: 90.0,
            no_show_rate_30d: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn skill_and_certification_lookup_ignores_case() {
        let c = caregiver();
        assert!(c.has_skill("personal care"));
        assert!(c.has_active_certification("cna"));
        assert!(!c.has_active_certification("RN"));
    }

    #[test]
    fn expired_certification_is_not_active() {
        let mut c = caregiver();
        c.certifications[0].status = CertificationStatus::Expired;
        assert!(!c.has_active_certification("CNA"));
    }

    #[test]
    fn visit_window_minutes() {
        let w = VisitWindow {
            client_id: ClientId::new(),
            date: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
        };
        assert_eq!(w.minutes(), 150);
    }

    #[test]
    fn degraded_context_uses_neutral_defaults() {
        let ctx = CaregiverContext::degraded(caregiver());
        assert_eq!(ctx.reliability_score, 50.0);
        assert!(ctx.distance_miles.is_none());
        assert!(ctx.conflicting_visits.is_empty());
    }
}
