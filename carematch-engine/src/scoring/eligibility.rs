//! Eligibility evaluation
//!
//! Produces the ordered issue list for one caregiver against one shift.
//! A candidate is eligible iff no blocking issue is present.

use serde::{Deserialize, Serialize};

use crate::caregiver::{CaregiverContext, ComplianceStatus};
use crate::configuration::MatchingConfiguration;
use crate::shift::OpenShift;

/// Kind of eligibility issue, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    BlockedByClient,
    MissingSkill,
    MissingCertification,
    ScheduleConflict,
    NotCompliant,
    DistanceTooFar,
    OverHourLimit,
    ExpiredCredential,
    GenderMismatch,
    LanguageMismatch,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IssueKind::BlockedByClient => "BLOCKED_BY_CLIENT",
            IssueKind::MissingSkill => "MISSING_SKILL",
            IssueKind::MissingCertification => "MISSING_CERTIFICATION",
            IssueKind::ScheduleConflict => "SCHEDULE_CONFLICT",
            IssueKind::NotCompliant => "NOT_COMPLIANT",
            IssueKind::DistanceTooFar => "DISTANCE_TOO_FAR",
            IssueKind::OverHourLimit => "OVER_HOUR_LIMIT",
            IssueKind::ExpiredCredential => "EXPIRED_CREDENTIAL",
            IssueKind::GenderMismatch => "GENDER_MISMATCH",
            IssueKind::LanguageMismatch => "LANGUAGE_MISMATCH",
        };
        write!(f, "{}", s)
    }
}

/// Severity of an eligibility issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Disqualifies the candidate
    Blocking,
    /// Reported but does not disqualify
    Warning,
}

/// One eligibility finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityIssue {
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    pub detail: String,
}

impl EligibilityIssue {
    fn blocking(kind: IssueKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            severity: IssueSeverity::Blocking,
            detail: detail.into(),
        }
    }

    fn warning(kind: IssueKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            severity: IssueSeverity::Warning,
            detail: detail.into(),
        }
    }
}

/// Evaluate all eligibility rules in table order
pub fn evaluate(
    shift: &OpenShift,
    ctx: &CaregiverContext,
    config: &MatchingConfiguration,
) -> Vec<EligibilityIssue> {
    let caregiver = &ctx.caregiver;
    let mut issues = Vec::new();

    if shift.blocked_caregivers.contains(&caregiver.id) {
        issues.push(EligibilityIssue::blocking(
            IssueKind::BlockedByClient,
            "caregiver is blocked by this client",
        ));
    }

    if config.constraints.require_exact_skill_match {
        for skill in &shift.required_skills {
            if !caregiver.has_skill(skill) {
                issues.push(EligibilityIssue::blocking(
                    IssueKind::MissingSkill,
                    format!("missing required skill: {}", skill),
                ));
            }
        }
    }

    if config.constraints.require_active_certifications {
        for cert in &shift.required_certifications {
            if !caregiver.has_active_certification(cert) {
                issues.push(EligibilityIssue::blocking(
                    IssueKind::MissingCertification,
                    format!("missing active certification: {}", cert),
                ));
            }
        }
    }

    if !ctx.conflicting_visits.is_empty() {
        issues.push(EligibilityIssue::blocking(
            IssueKind::ScheduleConflict,
            format!(
                "{} conflicting visit(s) overlap the shift window",
                ctx.conflicting_visits.len()
            ),
        ));
    }

    if matches!(
        caregiver.compliance_status,
        ComplianceStatus::Expired | ComplianceStatus::NonCompliant
    ) {
        issues.push(EligibilityIssue::blocking(
            IssueKind::NotCompliant,
            "caregiver compliance status is expired or non-compliant",
        ));
    }

    if let Some(distance) = ctx.distance_miles {
        if distance > config.constraints.max_travel_distance_miles {
            issues.push(EligibilityIssue::blocking(
                IssueKind::DistanceTooFar,
                format!(
                    "{:.1} mi exceeds the {:.1} mi travel cap",
                    distance, config.constraints.max_travel_distance_miles
                ),
            ));
        }
    }

    if let Some(max_hours) = caregiver.max_hours_per_week {
        let projected = ctx.current_week_minutes + shift.duration_minutes;
        if projected > max_hours * 60 {
            issues.push(EligibilityIssue::blocking(
                IssueKind::OverHourLimit,
                format!(
                    "shift would put the week at {} min over a {} h cap",
                    projected, max_hours
                ),
            ));
        }
    }

    if caregiver.compliance_status == ComplianceStatus::ExpiringSoon {
        issues.push(EligibilityIssue::warning(
            IssueKind::ExpiredCredential,
            "a credential expires soon",
        ));
    }

    if config.constraints.respect_gender_preference {
        if let Some(wanted) = shift.gender_preference {
            if caregiver.gender != wanted {
                issues.push(EligibilityIssue::warning(
                    IssueKind::GenderMismatch,
                    "client prefers a different gender",
                ));
            }
        }
    }

    if config.constraints.respect_language_preference {
        if let Some(wanted) = &shift.language_preference {
            if !caregiver
                .languages
                .iter()
                .any(|l| l.eq_ignore_ascii_case(wanted))
            {
                issues.push(EligibilityIssue::warning(
                    IssueKind::LanguageMismatch,
                    format!("caregiver does not speak {}", wanted),
                ));
            }
        }
    }

    issues
}

/// Whether the issue list permits the candidate
pub fn is_eligible(issues: &[EligibilityIssue]) -> bool {
    issues.iter().all(|i| i.severity != IssueSeverity::Blocking)
}
