//! Match evaluation
//!
//! The I/O-bound wrapper around the scoring kernel: pulls the coarse
//! candidate set, assembles per-caregiver contexts with bounded
//! fan-out, scores, optionally blends, and ranks. One caregiver's
//! context failure degrades that caregiver instead of aborting the
//! whole match.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::caregiver::CaregiverContext;
use crate::configuration::MatchingConfiguration;
use crate::error::{EngineError, EngineResult};
use crate::ids::{CaregiverId, ShiftId};
use crate::ml::{self, ExperimentAssignment, MlBlender, VariantOverrides};
use crate::scoring::{score_candidate, MatchCandidate};
use crate::shift::{MatchingStatus, OpenShift};
use crate::store::{Page, ShiftFilter, Store};

/// Options for one match run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MatchOptions {
    /// Keep ineligible candidates in the result, ranked last
    pub include_ineligible: bool,
    /// Run the learned-scoring blend when the blender is configured
    pub use_ml: bool,
}

/// A shift a caregiver may self-select, with its evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibleShift {
    pub shift: OpenShift,
    pub candidate: MatchCandidate,
}

/// Evaluates and ranks caregivers for shifts
pub struct MatchEvaluator {
    store: Arc<dyn Store>,
    blender: Option<Arc<MlBlender>>,
    fan_out: usize,
}

impl MatchEvaluator {
    pub fn new(store: Arc<dyn Store>, fan_out: usize) -> Self {
        Self {
            store,
            blender: None,
            fan_out: fan_out.max(1),
        }
    }

    /// Attach the learned-scoring blender
    pub fn with_blender(mut self, blender: Arc<MlBlender>) -> Self {
        self.blender = Some(blender);
        self
    }

    /// Default fan-out bound: min(cores * 4, 64)
    pub fn default_fan_out() -> usize {
        (num_cpus::get() * 4).min(64)
    }

    /// Evaluate and rank all candidates for one shift
    ///
    /// Ordering: eligible before ineligible, then score descending,
    /// then distance ascending (unknown last), then caregiver id.
    pub async fn rank_shift(
        &self,
        shift_id: ShiftId,
        config: &MatchingConfiguration,
        max_candidates: usize,
        opts: MatchOptions,
    ) -> EngineResult<Vec<MatchCandidate>> {
        let shift = self.store.get_shift(shift_id).await?;
        if shift.status.is_terminal() {
            return Err(EngineError::Conflict(format!(
                "shift {} is {} and cannot be matched",
                shift_id, shift.status
            )));
        }
        let candidates = self.store.find_candidates_for_shift(&shift).await?;
        let competing = candidates.len();
        let now = Utc::now();

        let overrides = if opts.use_ml {
            self.variant_overrides(&shift, now).await
        } else {
            None
        };

        let semaphore = Arc::new(Semaphore::new(self.fan_out));
        let mut join_set = JoinSet::new();
        for caregiver in candidates {
            let store = Arc::clone(&self.store);
            let blender = self.blender.clone();
            let semaphore = Arc::clone(&semaphore);
            let shift = shift.clone();
            let config = config.clone();
            let overrides = overrides.clone();
            let use_ml = opts.use_ml;
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let ctx = match store.caregiver_context(caregiver.id, &shift, now).await {
                    Ok(ctx) => ctx,
                    Err(e) => {
                        tracing::warn!(
                            caregiver = %caregiver.id,
                            shift = %shift.id,
                            error = %e,
                            "context fetch failed, scoring with neutral defaults"
                        );
                        CaregiverContext::degraded(caregiver)
                    }
                };
                let candidate = score_candidate(&shift, &ctx, &config, now);
                match (use_ml, blender) {
                    (true, Some(blender)) => {
                        let features = ml::extract(&shift, &ctx, &candidate, competing, now);
                        match blender
                            .blend(candidate.clone(), &features, overrides.as_ref())
                            .await
                        {
                            Ok(blended) => blended,
                            Err(e) => {
                                tracing::warn!(
                                    caregiver = %candidate.caregiver_id,
                                    error = %e,
                                    "blend failed, keeping rule-based score"
                                );
                                candidate
                            }
                        }
                    }
                    _ => candidate,
                }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(candidate) => results.push(candidate),
                Err(e) => {
                    tracing::error!(shift = %shift_id, error = %e, "candidate evaluation task failed");
                }
            }
        }

        if !opts.include_ineligible {
            results.retain(|c| c.is_eligible);
        }
        rank_candidates(&mut results);
        results.truncate(max_candidates);
        Ok(results)
    }

    /// Shifts a caregiver may self-select, best first
    ///
    /// Only shifts still waiting on a match are considered; the
    /// caller's minimum-score floor is applied.
    pub async fn eligible_shifts_for_caregiver(
        &self,
        caregiver_id: CaregiverId,
        config: &MatchingConfiguration,
        min_score: u8,
    ) -> EngineResult<Vec<EligibleShift>> {
        let caregiver = self.store.get_caregiver(caregiver_id).await?;
        let filter = ShiftFilter {
            organization_id: Some(caregiver.organization_id),
            statuses: vec![
                MatchingStatus::New,
                MatchingStatus::Matched,
                MatchingStatus::NoMatch,
            ],
            ..Default::default()
        };
        let page = Page {
            offset: 0,
            limit: 500,
        };
        let shifts = self.store.find_open_shifts(&filter, page).await?.items;
        let now = Utc::now();

        let mut eligible = Vec::new();
        for shift in shifts {
            if !caregiver.branch_ids.contains(&shift.branch_id) {
                continue;
            }
            let ctx = match self
                .store
                .caregiver_context(caregiver_id, &shift, now)
                .await
            {
                Ok(ctx) => ctx,
                Err(e) => {
                    tracing::warn!(shift = %shift.id, error = %e, "context fetch failed during self-select browse");
                    CaregiverContext::degraded(caregiver.clone())
                }
            };
            let candidate = score_candidate(&shift, &ctx, config, now);
            if candidate.is_eligible && candidate.overall_score >= min_score {
                eligible.push(EligibleShift { shift, candidate });
            }
        }
        eligible.sort_by(|a, b| {
            b.candidate
                .overall_score
                .cmp(&a.candidate.overall_score)
                .then(a.shift.scheduled_date.cmp(&b.shift.scheduled_date))
                .then(a.shift.id.cmp(&b.shift.id))
        });
        Ok(eligible)
    }

    /// Evaluate one caregiver against one shift on demand
    pub async fn evaluate_one(
        &self,
        shift: &OpenShift,
        caregiver_id: CaregiverId,
        config: &MatchingConfiguration,
    ) -> EngineResult<MatchCandidate> {
        let now = Utc::now();
        let ctx = self
            .store
            .caregiver_context(caregiver_id, shift, now)
            .await?;
        Ok(score_candidate(shift, &ctx, config, now))
    }

    /// Resolve the immutable experiment variant for a shift
    async fn variant_overrides(
        &self,
        shift: &OpenShift,
        now: DateTime<Utc>,
    ) -> Option<VariantOverrides> {
        let experiment = match self
            .store
            .get_active_experiment(shift.organization_id)
            .await
        {
            Ok(Some(experiment)) => experiment,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(shift = %shift.id, error = %e, "experiment lookup failed");
                return None;
            }
        };
        let variant = experiment.pick_variant(shift.id)?;
        let assignment = ExperimentAssignment {
            shift_id: shift.id,
            experiment_id: experiment.id,
            variant: variant.name.clone(),
            assigned_at: now,
            outcome: None,
        };
        match self.store.get_or_insert_assignment(assignment).await {
            Ok(stored) => experiment
                .variants
                .iter()
                .find(|v| v.name == stored.variant)
                .map(|v| v.overrides.clone()),
            Err(e) => {
                tracing::warn!(shift = %shift.id, error = %e, "experiment assignment failed");
                None
            }
        }
    }
}

/// Rank candidates: eligible first, score desc, distance asc, id asc
pub fn rank_candidates(candidates: &mut [MatchCandidate]) {
    candidates.sort_by(|a, b| {
        b.is_eligible
            .cmp(&a.is_eligible)
            .then(b.overall_score.cmp(&a.overall_score))
            .then_with(|| match (a.distance_miles, b.distance_miles) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then(a.caregiver_id.cmp(&b.caregiver_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caregiver::Caregiver;
    use crate::scoring::QualityBand;

    fn candidate(eligible: bool, score: u8, distance: Option<f64>) -> MatchCandidate {
        let caregiver = Caregiver {
            id: CaregiverId::new(),
            organization_id: crate::ids::OrganizationId::new(),
            branch_ids: vec![],
            name: String::new(),
            gender: crate::caregiver::Gender::Unspecified,
            languages: vec![],
            skills: vec![],
            certifications: vec![],
            employment_status: crate::caregiver::EmploymentStatus::Active,
            compliance_status: crate::caregiver::ComplianceStatus::Compliant,
            max_hours_per_week: None,
            hired_on: None,
            latitude: None,
            longitude: None,
            reliability_score: 50.0,
            no_show_rate_30d: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        };
        let ctx = CaregiverContext::degraded(caregiver);
        let config = MatchingConfiguration::example();
        let shift = sample_shift();
        let mut c = score_candidate(&shift, &ctx, &config, Utc::now());
        c.is_eligible = eligible;
        c.overall_score = score;
        c.quality = QualityBand::from_score(eligible, score);
        c.distance_miles = distance;
        c
    }

    fn sample_shift() -> OpenShift {
        OpenShift {
            id: ShiftId::new(),
            visit_id: uuid::Uuid::new_v4(),
            organization_id: crate::ids::OrganizationId::new(),
            branch_id: crate::ids::BranchId::new(),
            client_id: crate::ids::ClientId::new(),
            scheduled_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            start_time: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: chrono::NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            timezone: "America/New_York".to_string(),
            duration_minutes: 120,
            service_type: "personal_care".to_string(),
            required_skills: vec![],
            required_certifications: vec![],
            preferred_caregivers: vec![],
            blocked_caregivers: vec![],
            gender_preference: None,
            language_preference: None,
            location: crate::shift::ShiftLocation {
                address: String::new(),
                latitude: None,
                longitude: None,
            },
            priority: crate::shift::ShiftPriority::Normal,
            urgency: crate::shift::ShiftUrgency::Scheduled,
            fill_by: None,
            status: MatchingStatus::New,
            needs_operator_review: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn eligible_rank_before_ineligible_regardless_of_score() {
        let mut candidates = vec![
            candidate(false, 99, None),
            candidate(true, 40, None),
            candidate(true, 75, None),
        ];
        rank_candidates(&mut candidates);
        assert!(candidates[0].is_eligible && candidates[0].overall_score == 75);
        assert!(candidates[1].is_eligible && candidates[1].overall_score == 40);
        assert!(!candidates[2].is_eligible);
    }

    #[test]
    fn ties_break_by_distance_then_id() {
        let near = candidate(true, 80, Some(1.0));
        let far = candidate(true, 80, Some(9.0));
        let unknown = candidate(true, 80, None);
        let mut candidates = vec![unknown.clone(), far.clone(), near.clone()];
        rank_candidates(&mut candidates);
        assert_eq!(candidates[0].caregiver_id, near.caregiver_id);
        assert_eq!(candidates[1].caregiver_id, far.caregiver_id);
        assert_eq!(candidates[2].caregiver_id, unknown.caregiver_id);
    }
}
