//! Shared fixtures for integration tests

// Not every test binary uses every fixture
#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use carematch_config::CarematchConfig;
use carematch_engine::api::context::UserContext;
use carematch_engine::caregiver::{
    Caregiver, Certification, CertificationStatus, ComplianceStatus, EmploymentStatus, Gender,
    VisitWindow,
};
use carematch_engine::engine::Engine;
use carematch_engine::ids::{BranchId, CaregiverId, ClientId, OrganizationId, ShiftId};
use carematch_engine::notify::LoggingNotifier;
use carematch_engine::shift::{
    MatchingStatus, OpenShift, ShiftLocation, ShiftPriority, ShiftUrgency,
};
use carematch_engine::store::Store;

/// Monday of the fixture week: always next week, so fixtures stay in
/// the future relative to the test run
pub fn week_monday() -> NaiveDate {
    let today = Utc::now().date_naive();
    let this_monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    this_monday + Duration::days(7)
}

/// Wednesday of the fixture week; default shift day
pub fn shift_day() -> NaiveDate {
    week_monday() + Duration::days(2)
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// Engine over the given store with default process configuration
pub fn build_engine(store: Arc<dyn Store>) -> Arc<Engine> {
    Arc::new(Engine::new(
        store,
        Arc::new(LoggingNotifier),
        None,
        &CarematchConfig::default(),
    ))
}

pub fn admin(org: OrganizationId) -> UserContext {
    UserContext::admin(org)
}

/// A personal-care shift on the fixture Wednesday, 09:00-11:00
pub fn shift_fixture(org: OrganizationId, branch: BranchId, client: ClientId) -> OpenShift {
    let now = Utc::now();
    OpenShift {
        id: ShiftId::new(),
        visit_id: Uuid::new_v4(),
        organization_id: org,
        branch_id: branch,
        client_id: client,
        scheduled_date: shift_day(),
        start_time: time(9, 0),
        end_time: time(11, 0),
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
            address: "12 Main St, Boston MA".to_string(),
            latitude: Some(42.3601),
            longitude: Some(-71.0589),
        },
        priority: ShiftPriority::Normal,
        urgency: ShiftUrgency::Scheduled,
        fill_by: None,
        status: MatchingStatus::New,
        needs_operator_review: false,
        created_at: now,
        updated_at: now,
        version: 1,
    }
}

/// A fully qualified caregiver about 2.5 miles from the fixture shift
pub fn caregiver_fixture(org: OrganizationId, branch: BranchId) -> Caregiver {
    let now = Utc::now();
    Caregiver {
        id: CaregiverId::new(),
        organization_id: org,
        branch_ids: vec![branch],
        name: "Sam Ortiz".to_string(),
        gender: Gender::Male,
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
        hired_on: NaiveDate::from_ymd_opt(2024, 6, 1),
        latitude: Some(42.39625),
        longitude: Some(-71.0589),
        reliability_score: 92.0,
        no_show_rate_30d: None,
        created_at: now,
        updated_at: now,
        version: 1,
    }
}

/// Seed committed visits on Monday and Tuesday of the fixture week so
/// the caregiver enters the shift's week with `minutes` already booked
pub async fn seed_week_minutes(
    store: &dyn Store,
    caregiver_id: CaregiverId,
    client_id: ClientId,
    minutes: u32,
) {
    assert!(minutes <= 1440, "fixture supports at most 24h of lead work");
    let monday_minutes = minutes.min(720);
    let tuesday_minutes = minutes - monday_minutes;
    if monday_minutes > 0 {
        store
            .record_assigned_visit(
                caregiver_id,
                VisitWindow {
                    client_id,
                    date: week_monday(),
                    start_time: time(6, 0),
                    end_time: minute_offset(6, 0, monday_minutes),
                },
            )
            .await
            .unwrap();
    }
    if tuesday_minutes > 0 {
        store
            .record_assigned_visit(
                caregiver_id,
                VisitWindow {
                    client_id,
                    date: week_monday() + chrono::Duration::days(1),
                    start_time: time(6, 0),
                    end_time: minute_offset(6, 0, tuesday_minutes),
                },
            )
            .await
            .unwrap();
    }
}

fn minute_offset(h: u32, m: u32, minutes: u32) -> NaiveTime {
    let total = h * 60 + m + minutes;
    NaiveTime::from_hms_opt(total / 60, total % 60, 0).unwrap()
}
