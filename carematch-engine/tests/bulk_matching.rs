//! Bulk optimization scenarios

mod common;

use chrono::Utc;
use std::sync::Arc;

use carematch_engine::bulk::{BulkMatchRequest, BulkMatchStatus, GeneticParameters};
use carematch_engine::configuration::{MatchingConfiguration, OptimizationGoal};
use carematch_engine::ids::{BranchId, ClientId, OrganizationId};
use carematch_engine::manager::ProposalManager;
use carematch_engine::matcher::MatchEvaluator;
use carematch_engine::notify::LoggingNotifier;
use carematch_engine::optimizer::BulkOptimizer;
use carematch_engine::proposal::ProposalStatus;
use carematch_engine::shift::MatchingStatus;
use carematch_engine::store::{MemoryStore, Store};

use common::*;

fn optimizer_over(store: Arc<dyn Store>) -> BulkOptimizer {
    let evaluator = Arc::new(MatchEvaluator::new(Arc::clone(&store), 8));
    let manager = Arc::new(ProposalManager::new(
        Arc::clone(&store),
        Arc::new(LoggingNotifier),
    ));
    BulkOptimizer::new(store, evaluator, manager)
}

async fn submit_job(
    store: &dyn Store,
    org: OrganizationId,
    goal: OptimizationGoal,
    genetic: Option<GeneticParameters>,
) -> BulkMatchRequest {
    let mut request = BulkMatchRequest::new(
        org,
        week_monday(),
        week_monday() + chrono::Duration::days(6),
        goal,
        Utc::now(),
    );
    request.genetic = genetic;
    store.insert_bulk_request(request.clone()).await.unwrap()
}

mod contested_caregiver {
    use super::*;

    #[tokio::test]
    async fn one_caregiver_covers_exactly_one_of_three_overlapping_shifts() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let client = ClientId::new();

        let caregiver = caregiver_fixture(org, branch);
        store.insert_caregiver(caregiver.clone()).await.unwrap();

        // 09:00, 09:30, and 10:00 starts; every pair overlaps
        let mut shifts = Vec::new();
        for (h, m) in [(9, 0), (9, 30), (10, 0)] {
            let mut shift = shift_fixture(org, branch, client);
            shift.start_time = time(h, m);
            shift.end_time = time(h + 2, m);
            let shift = store.insert_shift(shift).await.unwrap();
            shifts.push(shift);
        }

        let config = MatchingConfiguration::default_for(org, Utc::now());
        let request = submit_job(store.as_ref(), org, OptimizationGoal::BestMatch, None).await;
        let optimizer = optimizer_over(Arc::clone(&store));
        let finished = optimizer.run(request, &config).await.unwrap();

        assert_eq!(finished.total_shifts, 3);
        assert_eq!(finished.matched_shifts, 1);
        assert_eq!(finished.unmatched_shifts, 2);
        assert_eq!(finished.proposals_generated, 1);
        assert_eq!(finished.status, BulkMatchStatus::PartiallyCompleted);

        // Exactly one shift carries a pending proposal; its window must
        // not conflict with any other planned work for the caregiver
        let mut proposed = Vec::new();
        for shift in &shifts {
            let proposals = store.find_proposals_for_shift(shift.id).await.unwrap();
            if !proposals.is_empty() {
                assert_eq!(proposals.len(), 1);
                assert_eq!(proposals[0].status, ProposalStatus::Pending);
                assert_eq!(proposals[0].caregiver_id, caregiver.id);
                proposed.push(shift.id);
            }
        }
        assert_eq!(proposed.len(), 1);

        for shift in &shifts {
            let stored = store.get_shift(shift.id).await.unwrap();
            if proposed.contains(&shift.id) {
                assert_eq!(stored.status, MatchingStatus::Proposed);
            } else {
                assert_eq!(stored.status, MatchingStatus::New);
            }
        }
    }
}

mod disjoint_shifts {
    use super::*;

    #[tokio::test]
    async fn non_overlapping_shifts_all_get_proposals() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let client = ClientId::new();

        let caregiver = caregiver_fixture(org, branch);
        store.insert_caregiver(caregiver).await.unwrap();

        for h in [7, 11, 15] {
            let mut shift = shift_fixture(org, branch, client);
            shift.start_time = time(h, 0);
            shift.end_time = time(h + 2, 0);
            store.insert_shift(shift).await.unwrap();
        }

        let config = MatchingConfiguration::default_for(org, Utc::now());
        let request = submit_job(store.as_ref(), org, OptimizationGoal::BestMatch, None).await;
        let optimizer = optimizer_over(Arc::clone(&store));
        let finished = optimizer.run(request, &config).await.unwrap();

        assert_eq!(finished.matched_shifts, 3);
        assert_eq!(finished.unmatched_shifts, 0);
        assert_eq!(finished.status, BulkMatchStatus::Completed);
    }
}

mod genetic_pass {
    use super::*;

    #[tokio::test]
    async fn genetic_job_completes_with_a_feasible_plan() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let client = ClientId::new();

        for name in ["Ada Voss", "Ben Ito"] {
            let mut caregiver = caregiver_fixture(org, branch);
            caregiver.name = name.to_string();
            store.insert_caregiver(caregiver).await.unwrap();
        }
        for h in [8, 9, 13] {
            let mut shift = shift_fixture(org, branch, client);
            shift.start_time = time(h, 0);
            shift.end_time = time(h + 2, 0);
            store.insert_shift(shift).await.unwrap();
        }

        let config = MatchingConfiguration::default_for(org, Utc::now());
        let request = submit_job(
            store.as_ref(),
            org,
            OptimizationGoal::BalancedWorkload,
            Some(GeneticParameters {
                population_size: 16,
                generations: 25,
                mutation_percent: 8,
                tournament_size: 3,
            }),
        )
        .await;
        let optimizer = optimizer_over(Arc::clone(&store));
        let finished = optimizer.run(request, &config).await.unwrap();

        // Two caregivers, three shifts with one overlapping pair: all
        // three are coverable
        assert_eq!(finished.matched_shifts, 3);
        assert_eq!(finished.status, BulkMatchStatus::Completed);
    }
}

mod empty_window {
    use super::*;

    #[tokio::test]
    async fn job_over_an_empty_window_completes_with_zero_counters() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();

        let config = MatchingConfiguration::default_for(org, Utc::now());
        let request = submit_job(store.as_ref(), org, OptimizationGoal::FastestFill, None).await;
        let optimizer = optimizer_over(Arc::clone(&store));
        let finished = optimizer.run(request, &config).await.unwrap();

        assert_eq!(finished.total_shifts, 0);
        assert_eq!(finished.matched_shifts, 0);
        assert_eq!(finished.status, BulkMatchStatus::Completed);
    }
}
