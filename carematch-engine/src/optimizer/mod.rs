//! Bulk optimization
//!
//! Plans coherent assignments across many shifts under a named goal.
//! The greedy baseline always runs; a genetic refinement pass runs
//! when the job asks for one, and the better plan wins. Applying a
//! plan writes pending proposals through the proposal manager; the
//! optimizer never touches shifts directly.

pub mod genetic;
pub mod greedy;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::bulk::{BulkMatchRequest, BulkMatchStatus};
use crate::configuration::{MatchingConfiguration, OptimizationGoal};
use crate::error::EngineResult;
use crate::ids::{CaregiverId, ShiftId};
use crate::manager::ProposalManager;
use crate::matcher::{MatchEvaluator, MatchOptions};
use crate::scoring::MatchCandidate;
use crate::shift::{MatchingStatus, OpenShift};
use crate::store::{Page, ShiftFilter, Store};

/// Upper bound on same-day shifts planned for one caregiver
pub const MAX_CONSECUTIVE_SHIFTS: u32 = 3;

/// Candidates the planner considers per shift
const CANDIDATES_PER_SHIFT: usize = 25;

/// One planned (shift, caregiver) pairing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAssignment {
    pub shift_id: ShiftId,
    pub caregiver_id: CaregiverId,
    pub score: u8,
    pub rationale: String,
}

/// A shift plus its ranked candidates, the planner's working unit
#[derive(Debug, Clone)]
pub struct ShiftPlanInput {
    pub shift: OpenShift,
    pub candidates: Vec<MatchCandidate>,
}

/// Goal-weighted score for one candidate on one shift
pub fn goal_score(goal: OptimizationGoal, candidate: &MatchCandidate) -> f64 {
    let score = candidate.overall_score as f64;
    let dims = &candidate.dimensions;
    match goal {
        OptimizationGoal::BestMatch => score,
        OptimizationGoal::FastestFill => score * 0.7 + candidate.reliability_score * 0.3,
        OptimizationGoal::CostEfficient => score * 0.8 + dims.capacity_match as f64 * 0.2,
        OptimizationGoal::BalancedWorkload => score * 0.6 + dims.capacity_match as f64 * 0.4,
        OptimizationGoal::Continuity => {
            score + (candidate.previous_visits_with_client as f64 * 5.0).min(25.0)
        }
        OptimizationGoal::CaregiverSatisfaction => {
            score * 0.7 + dims.preference_match as f64 * 0.3
        }
    }
}

/// Standard deviation of planned utilization across caregivers
pub fn utilization_stddev(minutes_by_caregiver: &[u32]) -> f64 {
    if minutes_by_caregiver.is_empty() {
        return 0.0;
    }
    let n = minutes_by_caregiver.len() as f64;
    let mean = minutes_by_caregiver.iter().map(|m| *m as f64).sum::<f64>() / n;
    let variance = minutes_by_caregiver
        .iter()
        .map(|m| (*m as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    variance.sqrt()
}

/// Runs bulk jobs end to end
pub struct BulkOptimizer {
    store: Arc<dyn Store>,
    evaluator: Arc<MatchEvaluator>,
    manager: Arc<ProposalManager>,
}

impl BulkOptimizer {
    pub fn new(
        store: Arc<dyn Store>,
        evaluator: Arc<MatchEvaluator>,
        manager: Arc<ProposalManager>,
    ) -> Self {
        Self {
            store,
            evaluator,
            manager,
        }
    }

    /// Execute one job: gather inputs, plan, apply, update counters
    ///
    /// Partial completion is allowed; shift-level failures leave those
    /// shifts unmatched and the job finishes partially completed.
    pub async fn run(
        &self,
        mut request: BulkMatchRequest,
        config: &MatchingConfiguration,
    ) -> EngineResult<BulkMatchRequest> {
        request.status = BulkMatchStatus::Running;
        request.updated_at = Utc::now();
        request = self.store.update_bulk_request(request).await?;

        let inputs = match self.gather_inputs(&request, config).await {
            Ok(inputs) => inputs,
            Err(e) => {
                tracing::error!(job = %request.id, error = %e, "bulk input gathering failed");
                request.status = BulkMatchStatus::Failed;
                request.error = Some(e.to_string());
                request.updated_at = Utc::now();
                return self.store.update_bulk_request(request).await;
            }
        };
        request.total_shifts = inputs.len() as u32;

        let plan = self.plan(&inputs, &request);
        tracing::info!(
            job = %request.id,
            shifts = inputs.len(),
            planned = plan.len(),
            goal = ?request.goal,
            "bulk plan computed"
        );

        for assignment in &plan {
            let candidate = inputs
                .iter()
                .find(|i| i.shift.id == assignment.shift_id)
                .and_then(|i| {
                    i.candidates
                        .iter()
                        .find(|c| c.caregiver_id == assignment.caregiver_id)
                })
                .cloned();
            let Some(candidate) = candidate else { continue };
            match self
                .manager
                .propose(assignment.shift_id, &[candidate], config)
                .await
            {
                Ok(outcome) => {
                    request.matched_shifts += 1;
                    request.proposals_generated += outcome.proposals.len() as u32;
                }
                Err(e) => {
                    tracing::warn!(
                        job = %request.id,
                        shift = %assignment.shift_id,
                        error = %e,
                        "bulk proposal failed, shift stays unmatched"
                    );
                }
            }
        }

        request.unmatched_shifts = request.total_shifts - request.matched_shifts;
        request.status = if request.unmatched_shifts == 0 {
            BulkMatchStatus::Completed
        } else {
            BulkMatchStatus::PartiallyCompleted
        };
        request.updated_at = Utc::now();
        self.store.update_bulk_request(request).await
    }

    /// Compute the plan: greedy baseline, then the genetic pass when
    /// requested; the higher-fitness plan wins
    fn plan(&self, inputs: &[ShiftPlanInput], request: &BulkMatchRequest) -> Vec<PlannedAssignment> {
        let greedy_plan = greedy::plan(inputs, request.goal);
        let Some(params) = request.genetic else {
            return greedy_plan;
        };
        let genetic_plan = genetic::plan(inputs, request.goal, params, &greedy_plan);
        let greedy_fitness = plan_fitness(inputs, request.goal, &greedy_plan);
        let genetic_fitness = plan_fitness(inputs, request.goal, &genetic_plan);
        if genetic_fitness > greedy_fitness {
            tracing::debug!(
                greedy = greedy_fitness,
                genetic = genetic_fitness,
                "genetic pass improved on the greedy baseline"
            );
            genetic_plan
        } else {
            greedy_plan
        }
    }

    async fn gather_inputs(
        &self,
        request: &BulkMatchRequest,
        config: &MatchingConfiguration,
    ) -> EngineResult<Vec<ShiftPlanInput>> {
        let shifts = if request.shift_ids.is_empty() {
            let filter = ShiftFilter {
                organization_id: Some(request.organization_id),
                statuses: vec![
                    MatchingStatus::New,
                    MatchingStatus::Matching,
                    MatchingStatus::Matched,
                    MatchingStatus::NoMatch,
                ],
                scheduled_from: Some(request.date_from),
                scheduled_to: Some(request.date_to),
                ..Default::default()
            };
            let page = Page {
                offset: 0,
                limit: 500,
            };
            self.store.find_open_shifts(&filter, page).await?.items
        } else {
            let mut shifts = Vec::with_capacity(request.shift_ids.len());
            for id in &request.shift_ids {
                shifts.push(self.store.get_shift(*id).await?);
            }
            shifts
        };

        let mut inputs = Vec::with_capacity(shifts.len());
        for shift in shifts {
            let candidates = self
                .evaluator
                .rank_shift(
                    shift.id,
                    config,
                    CANDIDATES_PER_SHIFT,
                    MatchOptions::default(),
                )
                .await?;
            let eligible: Vec<MatchCandidate> =
                candidates.into_iter().filter(|c| c.is_eligible).collect();
            inputs.push(ShiftPlanInput {
                shift,
                candidates: eligible,
            });
        }
        Ok(inputs)
    }
}

/// Total goal-weighted value of a plan; infeasible plans never reach
/// this point because both planners enforce constraints
pub fn plan_fitness(
    inputs: &[ShiftPlanInput],
    goal: OptimizationGoal,
    plan: &[PlannedAssignment],
) -> f64 {
    plan.iter()
        .filter_map(|assignment| {
            inputs
                .iter()
                .find(|i| i.shift.id == assignment.shift_id)?
                .candidates
                .iter()
                .find(|c| c.caregiver_id == assignment.caregiver_id)
                .map(|c| goal_score(goal, c))
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stddev_of_uniform_load_is_zero() {
        assert_eq!(utilization_stddev(&[120, 120, 120]), 0.0);
    }

    #[test]
    fn stddev_grows_with_imbalance() {
        let balanced = utilization_stddev(&[100, 110, 105]);
        let lopsided = utilization_stddev(&[10, 300, 20]);
        assert!(lopsided > balanced);
    }
}
