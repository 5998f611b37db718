//! Open shift management

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::caregiver::Gender;
use crate::error::{EngineError, EngineResult};
use crate::ids::{BranchId, CaregiverId, ClientId, OrganizationId, ShiftId};

/// Matching status of an open shift
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingStatus {
    /// Registered, no evaluation run yet
    New,
    /// Evaluation in progress or proposals exhausted without an accept
    Matching,
    /// Evaluated with viable candidates, no proposals issued yet
    Matched,
    /// One or more live proposals outstanding
    Proposed,
    /// A proposal was accepted; terminal
    Assigned,
    /// Evaluation ran and no candidate qualified
    NoMatch,
    /// Fill-by deadline passed without an assignment; terminal
    Expired,
    /// Withdrawn by the upstream visit; terminal
    Cancelled,
}

impl MatchingStatus {
    /// Whether the shift can still receive proposals
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            MatchingStatus::New
                | MatchingStatus::Matching
                | MatchingStatus::Matched
                | MatchingStatus::Proposed
                | MatchingStatus::NoMatch
        )
    }

    /// Terminal statuses admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MatchingStatus::Assigned | MatchingStatus::Expired | MatchingStatus::Cancelled
        )
    }
}

impl std::fmt::Display for MatchingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchingStatus::New => "new",
            MatchingStatus::Matching => "matching",
            MatchingStatus::Matched => "matched",
            MatchingStatus::Proposed => "proposed",
            MatchingStatus::Assigned => "assigned",
            MatchingStatus::NoMatch => "no_match",
            MatchingStatus::Expired => "expired",
            MatchingStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Priority of a shift; drives candidate ordering and bulk planning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl ShiftPriority {
    /// Numeric rank, higher is more important
    pub fn rank(&self) -> u8 {
        match self {
            ShiftPriority::Low => 0,
            ShiftPriority::Normal => 1,
            ShiftPriority::High => 2,
            ShiftPriority::Critical => 3,
        }
    }
}

/// How quickly the visit needs coverage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftUrgency {
    /// Planned in advance
    Scheduled,
    /// Needs coverage within days
    Urgent,
    /// Same-day or next-day coverage
    Emergency,
}

/// Visit location; coordinates are optional
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftLocation {
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// An unassigned visit waiting for a caregiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenShift {
    /// Unique shift identifier
    pub id: ShiftId,
    /// Upstream visit this shift covers
    pub visit_id: Uuid,
    pub organization_id: OrganizationId,
    pub branch_id: BranchId,
    pub client_id: ClientId,
    /// Visit date in the client's local calendar
    pub scheduled_date: NaiveDate,
    /// Local wall-clock start
    pub start_time: NaiveTime,
    /// Local wall-clock end
    pub end_time: NaiveTime,
    /// IANA timezone name of the visit locality
    pub timezone: String,
    pub duration_minutes: u32,
    pub service_type: String,
    pub required_skills: Vec<String>,
    pub required_certifications: Vec<String>,
    /// Caregivers the client prefers
    pub preferred_caregivers: Vec<CaregiverId>,
    /// Caregivers the client has blocked; always a blocking issue
    pub blocked_caregivers: Vec<CaregiverId>,
    pub gender_preference: Option<Gender>,
    pub language_preference: Option<String>,
    pub location: ShiftLocation,
    pub priority: ShiftPriority,
    pub urgency: ShiftUrgency,
    /// Deadline after which the shift expires unassigned
    pub fill_by: Option<DateTime<Utc>>,
    pub status: MatchingStatus,
    /// Set when an invariant violation was detected post-commit
    pub needs_operator_review: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version; increments on every write
    pub version: u64,
}

impl OpenShift {
    /// Local start of the visit window
    pub fn window_start(&self) -> NaiveDateTime {
        self.scheduled_date.and_time(self.start_time)
    }

    /// Local end of the visit window; overnight shifts spill to the next day
    pub fn window_end(&self) -> NaiveDateTime {
        if self.end_time > self.start_time {
            self.scheduled_date.and_time(self.end_time)
        } else {
            self.scheduled_date
                .succ_opt()
                .unwrap_or(self.scheduled_date)
                .and_time(self.end_time)
        }
    }

    /// Transition into active matching
    pub fn begin_matching(&mut self) -> EngineResult<()> {
        match self.status {
            MatchingStatus::New
            | MatchingStatus::Matching
            | MatchingStatus::Matched
            | MatchingStatus::NoMatch => {
                self.status = MatchingStatus::Matching;
                Ok(())
            }
            _ => Err(self.transition_error(MatchingStatus::Matching)),
        }
    }

    /// Record a completed evaluation without issuing proposals
    pub fn mark_matched(&mut self) -> EngineResult<()> {
        match self.status {
            MatchingStatus::New
            | MatchingStatus::Matching
            | MatchingStatus::Matched
            | MatchingStatus::NoMatch => {
                self.status = MatchingStatus::Matched;
                Ok(())
            }
            _ => Err(self.transition_error(MatchingStatus::Matched)),
        }
    }

    /// Proposals were issued for this shift
    pub fn mark_proposed(&mut self) -> EngineResult<()> {
        match self.status {
            MatchingStatus::New
            | MatchingStatus::Matching
            | MatchingStatus::Matched
            | MatchingStatus::NoMatch
            | MatchingStatus::Proposed => {
                self.status = MatchingStatus::Proposed;
                Ok(())
            }
            _ => Err(self.transition_error(MatchingStatus::Proposed)),
        }
    }

    /// Evaluation ran and nobody qualified
    pub fn mark_no_match(&mut self) -> EngineResult<()> {
        match self.status {
            MatchingStatus::New
            | MatchingStatus::Matching
            | MatchingStatus::Matched
            | MatchingStatus::Proposed => {
                self.status = MatchingStatus::NoMatch;
                Ok(())
            }
            _ => Err(self.transition_error(MatchingStatus::NoMatch)),
        }
    }

    /// A proposal was accepted; the shift is filled
    pub fn assign(&mut self) -> EngineResult<()> {
        match self.status {
            MatchingStatus::Proposed | MatchingStatus::Matching | MatchingStatus::Matched => {
                self.status = MatchingStatus::Assigned;
                Ok(())
            }
            _ => Err(self.transition_error(MatchingStatus::Assigned)),
        }
    }

    /// All outstanding proposals resolved without an accept; reopen for matching
    pub fn reopen_for_matching(&mut self) -> EngineResult<()> {
        match self.status {
            MatchingStatus::Proposed => {
                self.status = MatchingStatus::Matching;
                Ok(())
            }
            _ => Err(self.transition_error(MatchingStatus::Matching)),
        }
    }

    /// Fill-by deadline passed without an assignment
    pub fn expire(&mut self) -> EngineResult<()> {
        if self.status.is_open() {
            self.status = MatchingStatus::Expired;
            Ok(())
        } else {
            Err(self.transition_error(MatchingStatus::Expired))
        }
    }

    /// The upstream visit was withdrawn
    pub fn cancel(&mut self) -> EngineResult<()> {
        if self.status.is_open() {
            self.status = MatchingStatus::Cancelled;
            Ok(())
        } else {
            Err(self.transition_error(MatchingStatus::Cancelled))
        }
    }

    fn transition_error(&self, to: MatchingStatus) -> EngineError {
        EngineError::invalid_transition("shift", &self.status.to_string(), &to.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
            required_skills: vec![],
            required_certifications: vec![],
            preferred_caregivers: vec![],
            blocked_caregivers: vec![],
            gender_preference: None,
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
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn assignment_is_terminal() {
        let mut s = shift();
        s.mark_proposed().unwrap();
        s.assign().unwrap();
        assert!(s.status.is_terminal());
        assert!(s.mark_proposed().is_err());
        assert!(s.cancel().is_err());
    }

    #[test]
    fn rejected_out_reopens_for_matching() {
        let mut s = shift();
        s.mark_proposed().unwrap();
        s.reopen_for_matching().unwrap();
        assert_eq!(s.status, MatchingStatus::Matching);
    }

    #[test]
    fn overnight_window_spills_to_next_day() {
        let mut s = shift();
        s.start_time = NaiveTime::from_hms_opt(22, 0, 0).unwrap();
        s.end_time = NaiveTime::from_hms_opt(2, 0, 0).unwrap();
        assert!(s.window_end() > s.window_start());
        assert_eq!(
            s.window_end().date(),
            s.scheduled_date.succ_opt().unwrap()
        );
    }

    #[test]
    fn cancel_from_any_open_status() {
        let setups: [fn(&mut OpenShift); 4] = [
            |_| {},
            |s| s.mark_matched().unwrap(),
            |s| s.mark_proposed().unwrap(),
            |s| s.mark_no_match().unwrap(),
        ];
        for setup in setups {
            let mut s = shift();
            setup(&mut s);
            s.cancel().unwrap();
            assert_eq!(s.status, MatchingStatus::Cancelled);
        }
    }
}
