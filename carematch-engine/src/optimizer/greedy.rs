//! Greedy planner
//!
//! The mandatory baseline: shifts in priority-then-start order, each
//! assigned the feasible caregiver that maximizes the goal-weighted
//! score. Per-caregiver counters preserve weekly-hour caps, overlap
//! freedom, and the consecutive-shift bound as the plan grows.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;

use crate::configuration::OptimizationGoal;
use crate::ids::CaregiverId;
use crate::optimizer::{goal_score, PlannedAssignment, ShiftPlanInput, MAX_CONSECUTIVE_SHIFTS};
use crate::scoring::MatchCandidate;
use crate::shift::OpenShift;

/// Running load for one caregiver as the plan grows
#[derive(Debug, Default, Clone)]
pub(crate) struct CaregiverLoad {
    windows: Vec<(NaiveDateTime, NaiveDateTime)>,
    planned_minutes: u32,
    shifts_by_date: HashMap<NaiveDate, u32>,
}

impl CaregiverLoad {
    /// Whether adding the shift keeps this caregiver feasible
    pub(crate) fn accepts(&self, shift: &OpenShift, candidate: &MatchCandidate) -> bool {
        let start = shift.window_start();
        let end = shift.window_end();
        if self.windows.iter().any(|(s, e)| start < *e && end > *s) {
            return false;
        }
        if let Some(remaining) = candidate.remaining_week_minutes {
            // remaining already accounts for this shift's duration
            if (remaining as i64) < self.planned_minutes as i64 {
                return false;
            }
        }
        let today = self.shifts_by_date.get(&shift.scheduled_date).copied().unwrap_or(0);
        today < MAX_CONSECUTIVE_SHIFTS
    }

    pub(crate) fn add(&mut self, shift: &OpenShift) {
        self.windows.push((shift.window_start(), shift.window_end()));
        self.planned_minutes += shift.duration_minutes;
        *self.shifts_by_date.entry(shift.scheduled_date).or_insert(0) += 1;
    }

    pub(crate) fn planned_minutes(&self) -> u32 {
        self.planned_minutes
    }
}

/// Mild pressure toward spreading work across caregivers; stronger
/// when the goal is balanced workload
fn load_penalty(goal: OptimizationGoal, load: &CaregiverLoad) -> f64 {
    let per_shift = match goal {
        OptimizationGoal::BalancedWorkload => 10.0,
        _ => 3.0,
    };
    load.windows.len() as f64 * per_shift
}

/// Plan assignments greedily
pub fn plan(inputs: &[ShiftPlanInput], goal: OptimizationGoal) -> Vec<PlannedAssignment> {
    let mut ordered: Vec<&ShiftPlanInput> = inputs.iter().collect();
    ordered.sort_by(|a, b| {
        b.shift
            .priority
            .rank()
            .cmp(&a.shift.priority.rank())
            .then(a.shift.window_start().cmp(&b.shift.window_start()))
            .then(a.shift.id.cmp(&b.shift.id))
    });

    let mut loads: HashMap<CaregiverId, CaregiverLoad> = HashMap::new();
    let mut plan = Vec::new();

    for input in ordered {
        let mut best: Option<(&MatchCandidate, f64)> = None;
        for candidate in &input.candidates {
            let load = loads.entry(candidate.caregiver_id).or_default();
            if !load.accepts(&input.shift, candidate) {
                continue;
            }
            let adjusted = goal_score(goal, candidate) - load_penalty(goal, load);
            match best {
                Some((_, current)) if adjusted <= current => {}
                _ => best = Some((candidate, adjusted)),
            }
        }

        if let Some((candidate, adjusted)) = best {
            loads
                .entry(candidate.caregiver_id)
                .or_default()
                .add(&input.shift);
            plan.push(PlannedAssignment {
                shift_id: input.shift.id,
                caregiver_id: candidate.caregiver_id,
                score: candidate.overall_score,
                rationale: format!(
                    "greedy pick for {:?}: goal-weighted score {:.1}",
                    goal, adjusted
                ),
            });
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caregiver::{Caregiver, CaregiverContext};
    use crate::configuration::MatchingConfiguration;
    use crate::ids::{BranchId, ClientId, OrganizationId, ShiftId};
    use crate::scoring::score_candidate;
    use chrono::{NaiveTime, Utc};

    fn caregiver() -> Caregiver {
        Caregiver {
            id: CaregiverId::new(),
            organization_id: OrganizationId::new(),
            branch_ids: vec![BranchId::new()],
            name: "Robin Vance".to_string(),
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
            reliability_score: 75.0,
            no_show_rate_30d: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        }
    }

    fn shift_at(hour: u32, minute: u32) -> OpenShift {
        OpenShift {
            id: ShiftId::new(),
            visit_id: uuid::Uuid::new_v4(),
            organization_id: OrganizationId::new(),
            branch_id: BranchId::new(),
            client_id: ClientId::new(),
            scheduled_date: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            start_time: NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(hour + 2, minute, 0).unwrap(),
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
            status: crate::shift::MatchingStatus::New,
            needs_operator_review: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        }
    }

    fn input_for(shift: OpenShift, caregiver: &Caregiver) -> ShiftPlanInput {
        let ctx = CaregiverContext::degraded(caregiver.clone());
        let config = MatchingConfiguration::example();
        let candidate = score_candidate(&shift, &ctx, &config, Utc::now());
        ShiftPlanInput {
            shift,
            candidates: vec![candidate],
        }
    }

    #[test]
    fn one_caregiver_takes_only_non_overlapping_shifts() {
        let cg = caregiver();
        // 09:00-11:00, 09:30-11:30, and 11:30-13:30: the second overlaps
        // the first, the third is clear of it
        let inputs = vec![
            input_for(shift_at(9, 0), &cg),
            input_for(shift_at(9, 30), &cg),
            input_for(shift_at(11, 30), &cg),
        ];
        let plan = plan(&inputs, OptimizationGoal::BestMatch);
        assert_eq!(plan.len(), 2);
        let planned: Vec<ShiftId> = plan.iter().map(|p| p.shift_id).collect();
        assert!(planned.contains(&inputs[0].shift.id));
        assert!(!planned.contains(&inputs[1].shift.id));
        assert!(planned.contains(&inputs[2].shift.id));
    }

    #[test]
    fn same_day_shift_count_is_bounded() {
        let cg = caregiver();
        let inputs: Vec<ShiftPlanInput> = (0..6)
            .map(|i| input_for(shift_at(6 + i * 3, 0), &cg))
            .collect();
        let plan = plan(&inputs, OptimizationGoal::BestMatch);
        assert_eq!(plan.len(), MAX_CONSECUTIVE_SHIFTS as usize);
    }

    #[test]
    fn higher_priority_shift_wins_the_contested_caregiver() {
        let cg = caregiver();
        let mut low = input_for(shift_at(9, 0), &cg);
        low.shift.priority = crate::shift::ShiftPriority::Low;
        let mut high = input_for(shift_at(9, 30), &cg);
        high.shift.priority = crate::shift::ShiftPriority::Critical;
        let plan = plan(&[low.clone(), high.clone()], OptimizationGoal::BestMatch);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].shift_id, high.shift.id);
    }
}
