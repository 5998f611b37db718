//! Genetic refinement pass
//!
//! Optional second stage over the greedy baseline: a population of
//! assignment vectors evolved with tournament selection, single-point
//! crossover, and per-gene mutation, bounded by the caller-supplied
//! generation and population counts. The greedy plan seeds the
//! population so the pass can only lose to it by chance, and the
//! caller keeps whichever plan scores higher.

use std::collections::HashMap;

use crate::bulk::GeneticParameters;
use crate::configuration::OptimizationGoal;
use crate::ids::CaregiverId;
use crate::optimizer::greedy::CaregiverLoad;
use crate::optimizer::{goal_score, PlannedAssignment, ShiftPlanInput};

/// One individual: a candidate index (or none) per shift
type Genes = Vec<Option<usize>>;

/// Penalty applied per constraint violation during fitness evaluation
const VIOLATION_PENALTY: f64 = 500.0;

/// Evolve an assignment plan
pub fn plan(
    inputs: &[ShiftPlanInput],
    goal: OptimizationGoal,
    params: GeneticParameters,
    seed_plan: &[PlannedAssignment],
) -> Vec<PlannedAssignment> {
    if inputs.is_empty() {
        return Vec::new();
    }
    let population_size = params.population_size.max(2);
    let mut population: Vec<Genes> = Vec::with_capacity(population_size);
    population.push(genes_from_plan(inputs, seed_plan));
    while population.len() < population_size {
        population.push(random_genes(inputs));
    }

    for _ in 0..params.generations {
        let scored: Vec<(f64, &Genes)> = population
            .iter()
            .map(|genes| (fitness(inputs, goal, genes), genes))
            .collect();

        let mut next = Vec::with_capacity(population_size);
        // Elitism: the best individual survives unchanged
        if let Some((_, best)) = scored
            .iter()
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        {
            next.push((*best).clone());
        }
        while next.len() < population_size {
            let parent_a = tournament(&scored, params.tournament_size);
            let parent_b = tournament(&scored, params.tournament_size);
            let mut child = crossover(parent_a, parent_b);
            mutate(inputs, &mut child, params.mutation_percent);
            next.push(child);
        }
        population = next;
    }

    let best = population
        .into_iter()
        .max_by(|a, b| {
            fitness(inputs, goal, a)
                .partial_cmp(&fitness(inputs, goal, b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or_default();
    materialize(inputs, goal, &best)
}

fn genes_from_plan(inputs: &[ShiftPlanInput], plan: &[PlannedAssignment]) -> Genes {
    inputs
        .iter()
        .map(|input| {
            plan.iter()
                .find(|a| a.shift_id == input.shift.id)
                .and_then(|a| {
                    input
                        .candidates
                        .iter()
                        .position(|c| c.caregiver_id == a.caregiver_id)
                })
        })
        .collect()
}

fn random_genes(inputs: &[ShiftPlanInput]) -> Genes {
    inputs
        .iter()
        .map(|input| {
            if input.candidates.is_empty() || fastrand::u8(0..10) == 0 {
                None
            } else {
                Some(fastrand::usize(0..input.candidates.len()))
            }
        })
        .collect()
}

/// Goal-weighted plan value minus heavy penalties for infeasible genes
fn fitness(inputs: &[ShiftPlanInput], goal: OptimizationGoal, genes: &Genes) -> f64 {
    let mut loads: HashMap<CaregiverId, CaregiverLoad> = HashMap::new();
    let mut total = 0.0;
    for (input, gene) in inputs.iter().zip(genes) {
        let Some(index) = gene else { continue };
        let Some(candidate) = input.candidates.get(*index) else {
            total -= VIOLATION_PENALTY;
            continue;
        };
        let load = loads.entry(candidate.caregiver_id).or_default();
        if load.accepts(&input.shift, candidate) {
            total += goal_score(goal, candidate);
            load.add(&input.shift);
        } else {
            total -= VIOLATION_PENALTY;
        }
    }
    total
}

fn tournament<'a>(scored: &[(f64, &'a Genes)], size: usize) -> &'a Genes {
    let size = size.max(1);
    let mut best: Option<(f64, &Genes)> = None;
    for _ in 0..size {
        let pick = scored[fastrand::usize(0..scored.len())];
        match best {
            Some((score, _)) if pick.0 <= score => {}
            _ => best = Some(pick),
        }
    }
    best.map(|(_, genes)| genes).unwrap_or(scored[0].1)
}

fn crossover(a: &Genes, b: &Genes) -> Genes {
    if a.is_empty() {
        return Vec::new();
    }
    let point = fastrand::usize(0..a.len());
    a.iter()
        .take(point)
        .chain(b.iter().skip(point))
        .copied()
        .collect()
}

fn mutate(inputs: &[ShiftPlanInput], genes: &mut Genes, mutation_percent: u8) {
    for (input, gene) in inputs.iter().zip(genes.iter_mut()) {
        if fastrand::u8(0..100) >= mutation_percent {
            continue;
        }
        *gene = if input.candidates.is_empty() || fastrand::u8(0..10) == 0 {
            None
        } else {
            Some(fastrand::usize(0..input.candidates.len()))
        };
    }
}

/// Turn the best individual into a feasible plan, dropping genes that
/// violate constraints in shift order
fn materialize(
    inputs: &[ShiftPlanInput],
    goal: OptimizationGoal,
    genes: &Genes,
) -> Vec<PlannedAssignment> {
    let mut loads: HashMap<CaregiverId, CaregiverLoad> = HashMap::new();
    let mut plan = Vec::new();
    for (input, gene) in inputs.iter().zip(genes) {
        let Some(index) = gene else { continue };
        let Some(candidate) = input.candidates.get(*index) else {
            continue;
        };
        let load = loads.entry(candidate.caregiver_id).or_default();
        if !load.accepts(&input.shift, candidate) {
            continue;
        }
        load.add(&input.shift);
        plan.push(PlannedAssignment {
            shift_id: input.shift.id,
            caregiver_id: candidate.caregiver_id,
            score: candidate.overall_score,
            rationale: format!(
                "genetic pick for {:?}: goal-weighted score {:.1}",
                goal,
                goal_score(goal, candidate)
            ),
        });
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caregiver::{Caregiver, CaregiverContext};
    use crate::configuration::MatchingConfiguration;
    use crate::ids::{BranchId, ClientId, OrganizationId, ShiftId};
    use crate::optimizer::greedy;
    use crate::scoring::score_candidate;
    use chrono::{NaiveDate, NaiveTime, Utc};

    fn caregiver() -> Caregiver {
        Caregiver {
            id: CaregiverId::new(),
            organization_id: OrganizationId::new(),
            branch_ids: vec![BranchId::new()],
            name: "Jo Field".to_string(),
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
            reliability_score: 70.0,
            no_show_rate_30d: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        }
    }

    fn input_at(hour: u32, caregivers: &[Caregiver]) -> ShiftPlanInput {
        let shift = crate::shift::OpenShift {
            id: ShiftId::new(),
            visit_id: uuid::Uuid::new_v4(),
            organization_id: OrganizationId::new(),
            branch_id: BranchId::new(),
            client_id: ClientId::new(),
            scheduled_date: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(hour + 2, 0, 0).unwrap(),
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
        };
        let config = MatchingConfiguration::example();
        let candidates = caregivers
            .iter()
            .map(|cg| {
                let ctx = CaregiverContext::degraded(cg.clone());
                score_candidate(&shift, &ctx, &config, Utc::now())
            })
            .collect();
        ShiftPlanInput { shift, candidates }
    }

    #[test]
    fn evolved_plan_never_double_books_a_caregiver() {
        let cg = caregiver();
        let inputs = vec![
            input_at(9, std::slice::from_ref(&cg)),
            input_at(9, std::slice::from_ref(&cg)),
            input_at(13, std::slice::from_ref(&cg)),
        ];
        let seed = greedy::plan(&inputs, OptimizationGoal::BestMatch);
        let evolved = plan(
            &inputs,
            OptimizationGoal::BestMatch,
            GeneticParameters::default(),
            &seed,
        );
        // The two 09:00 shifts share the one caregiver; at most one wins
        assert!(evolved.len() <= 2);
        let mut windows: Vec<_> = evolved
            .iter()
            .map(|a| {
                inputs
                    .iter()
                    .find(|i| i.shift.id == a.shift_id)
                    .map(|i| (i.shift.window_start(), i.shift.window_end()))
                    .unwrap()
            })
            .collect();
        windows.sort();
        for pair in windows.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "overlapping windows in plan");
        }
    }

    #[test]
    fn seeded_population_matches_or_beats_greedy() {
        let caregivers = vec![caregiver(), caregiver(), caregiver()];
        let inputs = vec![
            input_at(8, &caregivers),
            input_at(10, &caregivers),
            input_at(12, &caregivers),
            input_at(14, &caregivers),
        ];
        let seed = greedy::plan(&inputs, OptimizationGoal::BestMatch);
        let evolved = plan(
            &inputs,
            OptimizationGoal::BestMatch,
            GeneticParameters {
                population_size: 20,
                generations: 30,
                mutation_percent: 10,
                tournament_size: 3,
            },
            &seed,
        );
        let greedy_fitness = crate::optimizer::plan_fitness(&inputs, OptimizationGoal::BestMatch, &seed);
        let evolved_fitness =
            crate::optimizer::plan_fitness(&inputs, OptimizationGoal::BestMatch, &evolved);
        assert!(evolved_fitness >= greedy_fitness - f64::EPSILON);
    }
}
