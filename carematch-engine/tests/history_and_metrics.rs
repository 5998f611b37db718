//! Match history rows and KPI aggregation

mod common;

use chrono::{Duration, Utc};
use std::sync::Arc;

use carematch_engine::engine::MatchShiftOptions;
use carematch_engine::history::MatchOutcome;
use carematch_engine::ids::{BranchId, ClientId, OrganizationId};
use carematch_engine::store::{MemoryStore, Store};

use common::*;

mod history_rows {
    use super::*;

    #[tokio::test]
    async fn every_attempt_and_transition_is_recorded() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);

        let caregiver = caregiver_fixture(org, branch);
        store.insert_caregiver(caregiver.clone()).await.unwrap();

        let shift = shift_fixture(org, branch, ClientId::new());
        let shift = engine.create_shift(&ctx, shift).await.unwrap();
        let run = engine
            .match_shift(&ctx, shift.id, MatchShiftOptions::default())
            .await
            .unwrap();
        let proposal = &run.proposals[0];
        engine
            .respond(&ctx, proposal.id, proposal.version, true, None, None)
            .await
            .unwrap();

        let rows = store.find_history_for_shift(shift.id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].outcome, MatchOutcome::Proposed);
        assert_eq!(rows[0].attempt, 1);
        assert_eq!(rows[1].outcome, MatchOutcome::Accepted);
        assert!(rows[1].response_seconds.is_some());
        // The snapshot pins the configuration that scored the attempt
        assert_eq!(rows[0].config.weights.total(), 100);
        assert_eq!(rows[0].caregiver_id, caregiver.id);
    }

    #[tokio::test]
    async fn attempts_increment_across_match_rounds() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);

        let caregiver = caregiver_fixture(org, branch);
        store.insert_caregiver(caregiver.clone()).await.unwrap();
        let shift = shift_fixture(org, branch, ClientId::new());
        let shift = engine.create_shift(&ctx, shift).await.unwrap();

        // Round one: propose, reject
        let run = engine
            .match_shift(&ctx, shift.id, MatchShiftOptions::default())
            .await
            .unwrap();
        let p1 = &run.proposals[0];
        engine
            .respond(&ctx, p1.id, p1.version, false, None, None)
            .await
            .unwrap();

        // Round two: the operator re-runs the evaluator
        let run = engine
            .match_shift(&ctx, shift.id, MatchShiftOptions::default())
            .await
            .unwrap();
        assert_eq!(run.proposals.len(), 1);

        let rows = store.find_history_for_shift(shift.id).await.unwrap();
        let proposed: Vec<u32> = rows
            .iter()
            .filter(|h| h.outcome == MatchOutcome::Proposed)
            .map(|h| h.attempt)
            .collect();
        assert_eq!(proposed, vec![1, 3]);
    }
}

mod kpis {
    use super::*;

    #[tokio::test]
    async fn kpis_aggregate_fill_and_acceptance() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);

        let caregiver = caregiver_fixture(org, branch);
        store.insert_caregiver(caregiver).await.unwrap();

        // One accepted shift, one left unmatched
        let filled = shift_fixture(org, branch, ClientId::new());
        let filled = engine.create_shift(&ctx, filled).await.unwrap();
        let run = engine
            .match_shift(&ctx, filled.id, MatchShiftOptions::default())
            .await
            .unwrap();
        let proposal = &run.proposals[0];
        engine
            .respond(&ctx, proposal.id, proposal.version, true, None, None)
            .await
            .unwrap();

        let mut unfilled = shift_fixture(org, branch, ClientId::new());
        unfilled.required_certifications = vec!["RN".to_string()];
        let unfilled = engine.create_shift(&ctx, unfilled).await.unwrap();
        engine
            .match_shift(&ctx, unfilled.id, MatchShiftOptions::default())
            .await
            .unwrap();

        let kpis = engine
            .matching_kpis(&ctx, Utc::now() - Duration::hours(1), Utc::now() + Duration::days(14))
            .await
            .unwrap();

        assert_eq!(kpis.total_shifts, 2);
        assert_eq!(kpis.assigned_shifts, 1);
        assert_eq!(kpis.fill_rate, 0.5);
        assert_eq!(kpis.proposals_issued, 1);
        assert_eq!(kpis.proposals_accepted, 1);
        assert_eq!(kpis.acceptance_rate, 1.0);
        assert!(kpis.avg_response_seconds.is_some());
        assert_eq!(kpis.accepted_by_quality.get("Excellent"), Some(&1));
    }
}

mod caregiver_inbox {
    use super::*;

    #[tokio::test]
    async fn browse_lists_only_open_shifts_the_caregiver_qualifies_for() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);

        let caregiver = caregiver_fixture(org, branch);
        store.insert_caregiver(caregiver.clone()).await.unwrap();

        let open = shift_fixture(org, branch, ClientId::new());
        let open = engine.create_shift(&ctx, open).await.unwrap();

        // Requires a credential the caregiver lacks
        let mut out_of_reach = shift_fixture(org, branch, ClientId::new());
        out_of_reach.required_certifications = vec!["RN".to_string()];
        engine.create_shift(&ctx, out_of_reach).await.unwrap();

        // Another branch entirely
        let elsewhere = shift_fixture(org, BranchId::new(), ClientId::new());
        engine.create_shift(&ctx, elsewhere).await.unwrap();

        let eligible = engine
            .eligible_shifts(&ctx, caregiver.id, Some(60))
            .await
            .unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].shift.id, open.id);
        assert!(eligible[0].candidate.overall_score >= 60);
    }
}
