//! Aggregate matching KPIs
//!
//! Computed on demand from match history and shift state; backs the
//! matching metrics endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::EngineResult;
use crate::history::MatchOutcome;
use crate::ids::OrganizationId;
use crate::scoring::QualityBand;
use crate::shift::MatchingStatus;
use crate::store::{Page, ShiftFilter, Store};

/// Matching KPIs over a reporting window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingKpis {
    pub organization_id: OrganizationId,
    pub window_from: DateTime<Utc>,
    pub window_to: DateTime<Utc>,
    pub total_shifts: u32,
    pub assigned_shifts: u32,
    /// Assigned over total
    pub fill_rate: f64,
    pub proposals_issued: u32,
    pub proposals_accepted: u32,
    pub proposals_rejected: u32,
    pub proposals_expired: u32,
    /// Accepted over responded (accepted + rejected + expired)
    pub acceptance_rate: f64,
    /// Expired over issued
    pub expiry_rate: f64,
    /// Mean seconds between proposal and accept
    pub avg_response_seconds: Option<f64>,
    /// Accepted proposals by quality band
    pub accepted_by_quality: HashMap<String, u32>,
}

/// Compute KPIs for one organization over a window
pub async fn compute(
    store: &dyn Store,
    organization_id: OrganizationId,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> EngineResult<MatchingKpis> {
    let rows = store
        .find_history_for_organization(organization_id, from, to)
        .await?;

    let mut proposals_issued = 0u32;
    let mut proposals_accepted = 0u32;
    let mut proposals_rejected = 0u32;
    let mut proposals_expired = 0u32;
    let mut response_seconds = Vec::new();
    let mut accepted_by_quality: HashMap<String, u32> = HashMap::new();

    for row in &rows {
        match row.outcome {
            MatchOutcome::Proposed => proposals_issued += 1,
            MatchOutcome::Accepted | MatchOutcome::AutoAssigned => {
                proposals_accepted += 1;
                if row.outcome == MatchOutcome::AutoAssigned {
                    proposals_issued += 1;
                }
                if let Some(seconds) = row.response_seconds {
                    response_seconds.push(seconds as f64);
                }
                let band = format!("{:?}", QualityBand::from_score(true, row.score));
                *accepted_by_quality.entry(band).or_insert(0) += 1;
            }
            MatchOutcome::Rejected => proposals_rejected += 1,
            MatchOutcome::Expired => proposals_expired += 1,
            MatchOutcome::Superseded | MatchOutcome::Withdrawn | MatchOutcome::NoMatch => {}
        }
    }

    let filter = ShiftFilter {
        organization_id: Some(organization_id),
        scheduled_from: Some(from.date_naive()),
        scheduled_to: Some(to.date_naive()),
        ..Default::default()
    };
    let shifts = store
        .find_open_shifts(
            &filter,
            Page {
                offset: 0,
                limit: usize::MAX,
            },
        )
        .await?;
    let total_shifts = shifts.total as u32;
    let assigned_shifts = shifts
        .items
        .iter()
        .filter(|s| s.status == MatchingStatus::Assigned)
        .count() as u32;

    let responded = proposals_accepted + proposals_rejected + proposals_expired;
    let rate = |num: u32, denom: u32| {
        if denom > 0 {
            num as f64 / denom as f64
        } else {
            0.0
        }
    };

    Ok(MatchingKpis {
        organization_id,
        window_from: from,
        window_to: to,
        total_shifts,
        assigned_shifts,
        fill_rate: rate(assigned_shifts, total_shifts),
        proposals_issued,
        proposals_accepted,
        proposals_rejected,
        proposals_expired,
        acceptance_rate: rate(proposals_accepted, responded),
        expiry_rate: rate(proposals_expired, proposals_issued),
        avg_response_seconds: if response_seconds.is_empty() {
            None
        } else {
            Some(response_seconds.iter().sum::<f64>() / response_seconds.len() as f64)
        },
        accepted_by_quality,
    })
}
