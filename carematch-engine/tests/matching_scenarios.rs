//! End-to-end matching scenarios over the in-memory store

mod common;

use std::sync::Arc;

use carematch_engine::engine::MatchShiftOptions;
use carematch_engine::error::EngineError;
use carematch_engine::ids::{BranchId, ClientId, OrganizationId};
use carematch_engine::proposal::ProposalStatus;
use carematch_engine::scoring::{IssueKind, QualityBand};
use carematch_engine::shift::MatchingStatus;
use carematch_engine::store::{MemoryStore, Store};

use common::*;

mod simple_accept {
    use super::*;

    #[tokio::test]
    async fn single_qualified_caregiver_is_proposed_and_accepted() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let client = ClientId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);

        let caregiver = caregiver_fixture(org, branch);
        store.insert_caregiver(caregiver.clone()).await.unwrap();
        seed_week_minutes(store.as_ref(), caregiver.id, ClientId::new(), 1200).await;

        let shift = shift_fixture(org, branch, client);
        let shift = engine.create_shift(&ctx, shift).await.unwrap();

        let run = engine
            .match_shift(&ctx, shift.id, MatchShiftOptions::default())
            .await
            .unwrap();

        assert_eq!(run.proposals.len(), 1, "exactly one proposal expected");
        let proposal = &run.proposals[0];
        assert_eq!(proposal.status, ProposalStatus::Pending);
        assert!(proposal.score >= 85, "score was {}", proposal.score);
        assert_eq!(proposal.quality, QualityBand::Excellent);
        assert_eq!(run.shift.status, MatchingStatus::Proposed);
        assert!(proposal.expires_at >= proposal.proposed_at);

        let commit = engine
            .respond(&ctx, proposal.id, proposal.version, true, None, None)
            .await
            .unwrap();
        assert_eq!(commit.proposal.status, ProposalStatus::Accepted);
        assert_eq!(commit.shift.status, MatchingStatus::Assigned);
    }
}

mod supersession {
    use super::*;

    #[tokio::test]
    async fn accepting_one_proposal_supersedes_the_sibling() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);

        let strong = caregiver_fixture(org, branch);
        let mut weaker = caregiver_fixture(org, branch);
        weaker.name = "Lee Brook".to_string();
        weaker.reliability_score = 70.0;
        store.insert_caregiver(strong.clone()).await.unwrap();
        store.insert_caregiver(weaker.clone()).await.unwrap();

        let shift = shift_fixture(org, branch, ClientId::new());
        let shift = engine.create_shift(&ctx, shift).await.unwrap();

        let run = engine
            .match_shift(&ctx, shift.id, MatchShiftOptions::default())
            .await
            .unwrap();
        assert_eq!(run.proposals.len(), 2);
        assert!(run
            .proposals
            .iter()
            .all(|p| p.status == ProposalStatus::Pending));

        // Accept the lower-ranked caregiver's proposal
        let target = run
            .proposals
            .iter()
            .find(|p| p.caregiver_id == weaker.id)
            .unwrap();
        let commit = engine
            .respond(&ctx, target.id, target.version, true, None, None)
            .await
            .unwrap();

        assert_eq!(commit.proposal.status, ProposalStatus::Accepted);
        assert_eq!(commit.shift.status, MatchingStatus::Assigned);
        assert_eq!(commit.superseded.len(), 1);
        assert_eq!(commit.superseded[0].caregiver_id, strong.id);
        assert_eq!(commit.superseded[0].status, ProposalStatus::Superseded);

        // Exactly one accepted proposal for the shift
        let all = store.find_proposals_for_shift(shift.id).await.unwrap();
        let accepted = all
            .iter()
            .filter(|p| p.status == ProposalStatus::Accepted)
            .count();
        assert_eq!(accepted, 1);
    }
}

mod blocked_self_select {
    use super::*;

    #[tokio::test]
    async fn blocked_caregiver_gets_eligibility_error_and_no_proposal() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);

        let caregiver = caregiver_fixture(org, branch);
        store.insert_caregiver(caregiver.clone()).await.unwrap();

        let mut shift = shift_fixture(org, branch, ClientId::new());
        shift.blocked_caregivers = vec![caregiver.id];
        let shift = engine.create_shift(&ctx, shift).await.unwrap();

        let err = engine
            .select_shift(&ctx, caregiver.id, shift.id)
            .await
            .unwrap_err();
        match err {
            EngineError::Eligibility { issues } => {
                assert!(issues.iter().any(|i| i.kind == IssueKind::BlockedByClient));
            }
            other => panic!("expected an eligibility error, got {:?}", other),
        }

        let proposals = store.find_proposals_for_shift(shift.id).await.unwrap();
        assert!(proposals.is_empty(), "no proposal may be written");
    }
}

mod weekly_cap {
    use super::*;

    #[tokio::test]
    async fn over_hour_limit_candidate_is_ineligible_but_still_reported() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);

        // 19 hours already booked against a 20-hour cap
        let mut capped = caregiver_fixture(org, branch);
        capped.max_hours_per_week = Some(20);
        store.insert_caregiver(capped.clone()).await.unwrap();
        seed_week_minutes(store.as_ref(), capped.id, ClientId::new(), 1140).await;

        let open = caregiver_fixture(org, branch);
        store.insert_caregiver(open.clone()).await.unwrap();

        let shift = shift_fixture(org, branch, ClientId::new());
        let shift = engine.create_shift(&ctx, shift).await.unwrap();

        let run = engine
            .match_shift(
                &ctx,
                shift.id,
                MatchShiftOptions {
                    auto_propose: false,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(run.candidates.len(), 2);
        // Eligible candidate ranks first regardless of score
        assert_eq!(run.candidates[0].caregiver_id, open.id);
        assert!(run.candidates[0].is_eligible);

        let blocked = &run.candidates[1];
        assert_eq!(blocked.caregiver_id, capped.id);
        assert!(!blocked.is_eligible);
        assert!(blocked
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::OverHourLimit));
        assert_eq!(blocked.quality, QualityBand::Ineligible);
        assert!(blocked.overall_score > 0, "score is still reported");
    }
}

mod auto_assignment {
    use super::*;
    use carematch_engine::caregiver::CaregiverPreferenceProfile;
    use chrono::Utc;

    #[tokio::test]
    async fn opted_in_self_select_above_threshold_assigns_immediately() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);

        let caregiver = caregiver_fixture(org, branch);
        store.insert_caregiver(caregiver.clone()).await.unwrap();
        let mut profile = CaregiverPreferenceProfile::empty(caregiver.id, Utc::now());
        profile.accept_auto_assignment = true;
        store.upsert_preferences(profile).await.unwrap();

        // Preferred caregiver pushes the score over the auto-assign bar
        let mut shift = shift_fixture(org, branch, ClientId::new());
        shift.preferred_caregivers = vec![caregiver.id];
        let shift = engine.create_shift(&ctx, shift).await.unwrap();

        let outcome = engine
            .select_shift(&ctx, caregiver.id, shift.id)
            .await
            .unwrap();
        assert!(outcome.auto_assigned);
        assert_eq!(outcome.proposal.status, ProposalStatus::Accepted);

        let stored = store.get_shift(shift.id).await.unwrap();
        assert_eq!(stored.status, MatchingStatus::Assigned);
    }

    #[tokio::test]
    async fn self_select_without_opt_in_leaves_a_pending_proposal() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);

        let caregiver = caregiver_fixture(org, branch);
        store.insert_caregiver(caregiver.clone()).await.unwrap();

        let shift = shift_fixture(org, branch, ClientId::new());
        let shift = engine.create_shift(&ctx, shift).await.unwrap();

        let outcome = engine
            .select_shift(&ctx, caregiver.id, shift.id)
            .await
            .unwrap();
        assert!(!outcome.auto_assigned);
        assert_eq!(outcome.proposal.status, ProposalStatus::Pending);

        let stored = store.get_shift(shift.id).await.unwrap();
        assert_eq!(stored.status, MatchingStatus::Proposed);
    }
}

mod no_match {
    use super::*;

    #[tokio::test]
    async fn shift_with_no_qualified_candidates_goes_to_no_match() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);

        // Caregiver lacks the required certification
        let mut unqualified = caregiver_fixture(org, branch);
        unqualified.certifications.clear();
        store.insert_caregiver(unqualified).await.unwrap();

        let shift = shift_fixture(org, branch, ClientId::new());
        let shift = engine.create_shift(&ctx, shift).await.unwrap();

        let run = engine
            .match_shift(&ctx, shift.id, MatchShiftOptions::default())
            .await
            .unwrap();
        assert!(run.proposals.is_empty());
        assert_eq!(run.shift.status, MatchingStatus::NoMatch);
    }
}
