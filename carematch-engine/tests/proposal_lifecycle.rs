//! Proposal lifecycle invariants over the manager and store

mod common;

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use carematch_engine::engine::MatchShiftOptions;
use carematch_engine::ids::{BranchId, ClientId, OrganizationId};
use carematch_engine::proposal::{ProposalStatus, RejectionCategory};
use carematch_engine::shift::MatchingStatus;
use carematch_engine::store::{MemoryStore, Store};

use common::*;

/// Three distinct caregivers qualified for the fixture shift
async fn seed_three_caregivers(
    store: &dyn Store,
    org: OrganizationId,
    branch: BranchId,
) -> Vec<carematch_engine::ids::CaregiverId> {
    let mut ids = Vec::new();
    for name in ["Ada Voss", "Ben Ito", "Cal Moro"] {
        let mut caregiver = caregiver_fixture(org, branch);
        caregiver.name = name.to_string();
        ids.push(caregiver.id);
        store.insert_caregiver(caregiver).await.unwrap();
    }
    ids
}

mod single_accept {
    use super::*;

    #[tokio::test]
    async fn at_most_one_proposal_is_ever_accepted() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);
        seed_three_caregivers(store.as_ref(), org, branch).await;

        let shift = shift_fixture(org, branch, ClientId::new());
        let shift = engine.create_shift(&ctx, shift).await.unwrap();
        let run = engine
            .match_shift(&ctx, shift.id, MatchShiftOptions::default())
            .await
            .unwrap();
        assert_eq!(run.proposals.len(), 3);

        let first = &run.proposals[0];
        engine
            .respond(&ctx, first.id, first.version, true, None, None)
            .await
            .unwrap();

        // Responding to a superseded sibling must conflict
        let second = &run.proposals[1];
        let stored = store.get_proposal(second.id).await.unwrap();
        let err = engine
            .respond(&ctx, second.id, stored.version, true, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");

        let all = store.find_proposals_for_shift(shift.id).await.unwrap();
        assert_eq!(
            all.iter()
                .filter(|p| p.status == ProposalStatus::Accepted)
                .count(),
            1
        );
        assert_eq!(
            all.iter()
                .filter(|p| p.status == ProposalStatus::Superseded)
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn stale_version_is_rejected_with_a_conflict() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);
        seed_three_caregivers(store.as_ref(), org, branch).await;

        let shift = shift_fixture(org, branch, ClientId::new());
        let shift = engine.create_shift(&ctx, shift).await.unwrap();
        let run = engine
            .match_shift(&ctx, shift.id, MatchShiftOptions::default())
            .await
            .unwrap();

        let proposal = &run.proposals[0];
        let err = engine
            .respond(&ctx, proposal.id, proposal.version + 7, true, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
        assert!(err.to_string().contains("version"));
    }
}

mod rejection {
    use super::*;

    #[tokio::test]
    async fn rejecting_the_last_live_proposal_reopens_the_shift() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);

        let caregiver = caregiver_fixture(org, branch);
        store.insert_caregiver(caregiver).await.unwrap();

        let shift = shift_fixture(org, branch, ClientId::new());
        let shift = engine.create_shift(&ctx, shift).await.unwrap();
        let run = engine
            .match_shift(&ctx, shift.id, MatchShiftOptions::default())
            .await
            .unwrap();
        assert_eq!(run.proposals.len(), 1);

        let proposal = &run.proposals[0];
        let commit = engine
            .respond(
                &ctx,
                proposal.id,
                proposal.version,
                false,
                Some("schedule clash".to_string()),
                Some(RejectionCategory::Schedule),
            )
            .await
            .unwrap();

        assert_eq!(commit.proposal.status, ProposalStatus::Rejected);
        assert_eq!(
            commit.proposal.rejection_category,
            Some(RejectionCategory::Schedule)
        );
        assert_eq!(commit.shift.status, MatchingStatus::Matching);
    }
}

mod idempotent_acknowledgements {
    use super::*;

    #[tokio::test]
    async fn repeated_sent_and_viewed_marks_converge() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);

        let caregiver = caregiver_fixture(org, branch);
        store.insert_caregiver(caregiver).await.unwrap();

        let shift = shift_fixture(org, branch, ClientId::new());
        let shift = engine.create_shift(&ctx, shift).await.unwrap();
        let run = engine
            .match_shift(&ctx, shift.id, MatchShiftOptions::default())
            .await
            .unwrap();
        let proposal_id = run.proposals[0].id;

        let manager = engine.manager();
        let once = manager.mark_sent(proposal_id).await.unwrap();
        let twice = manager.mark_sent(proposal_id).await.unwrap();
        assert_eq!(once.status, ProposalStatus::Sent);
        assert_eq!(twice.status, ProposalStatus::Sent);
        assert_eq!(once.sent_at, twice.sent_at);

        let viewed_once = manager.mark_viewed(proposal_id).await.unwrap();
        let viewed_twice = manager.mark_viewed(proposal_id).await.unwrap();
        assert_eq!(viewed_once.status, ProposalStatus::Viewed);
        assert_eq!(viewed_twice.status, ProposalStatus::Viewed);
        assert_eq!(viewed_once.viewed_at, viewed_twice.viewed_at);
    }
}

mod expiry_sweep {
    use super::*;
    use carematch_engine::history::MatchOutcome;

    #[tokio::test]
    async fn sweep_expires_every_due_proposal_with_one_history_row_each() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);
        let caregivers = seed_three_caregivers(store.as_ref(), org, branch).await;

        let shift = shift_fixture(org, branch, ClientId::new());
        let shift = engine.create_shift(&ctx, shift).await.unwrap();
        let run = engine
            .match_shift(&ctx, shift.id, MatchShiftOptions::default())
            .await
            .unwrap();
        assert_eq!(run.proposals.len(), 3);

        // Age every proposal past its TTL
        for proposal in &run.proposals {
            let mut stored = store.get_proposal(proposal.id).await.unwrap();
            stored.expires_at = Utc::now() - Duration::seconds(1);
            store.update_proposal(stored).await.unwrap();
        }

        let sweep = engine.manager().expire_stale(Utc::now()).await.unwrap();
        assert_eq!(sweep.expired.len(), 3);
        assert_eq!(sweep.reopened_shifts, vec![shift.id]);

        for proposal in &run.proposals {
            let stored = store.get_proposal(proposal.id).await.unwrap();
            assert_eq!(stored.status, ProposalStatus::Expired);
            assert!(stored.expired_at.is_some());
        }
        let stored_shift = store.get_shift(shift.id).await.unwrap();
        assert_eq!(stored_shift.status, MatchingStatus::Matching);

        let rows = store.find_history_for_shift(shift.id).await.unwrap();
        for caregiver_id in caregivers {
            let expired_rows = rows
                .iter()
                .filter(|h| h.caregiver_id == caregiver_id && h.outcome == MatchOutcome::Expired)
                .count();
            assert_eq!(expired_rows, 1, "exactly one expiry row per proposal");
        }

        // A second sweep is a no-op
        let sweep = engine.manager().expire_stale(Utc::now()).await.unwrap();
        assert!(sweep.expired.is_empty());
    }
}

mod cancellation_cascade {
    use super::*;

    #[tokio::test]
    async fn cancelling_a_shift_withdraws_every_live_proposal() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);
        seed_three_caregivers(store.as_ref(), org, branch).await;

        let shift = shift_fixture(org, branch, ClientId::new());
        let shift = engine.create_shift(&ctx, shift).await.unwrap();
        engine
            .match_shift(&ctx, shift.id, MatchShiftOptions::default())
            .await
            .unwrap();

        let cancelled = engine.cancel_shift(&ctx, shift.id).await.unwrap();
        assert_eq!(cancelled.status, MatchingStatus::Cancelled);

        let proposals = store.find_proposals_for_shift(shift.id).await.unwrap();
        assert_eq!(proposals.len(), 3);
        assert!(proposals
            .iter()
            .all(|p| p.status == ProposalStatus::Withdrawn));

        // No further proposals may be created
        let err = engine
            .create_manual_proposal(&ctx, shift.id, carematch_engine::ids::CaregiverId(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }
}

mod assigned_shift_is_closed {
    use super::*;

    #[tokio::test]
    async fn no_new_proposals_after_assignment() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = OrganizationId::new();
        let branch = BranchId::new();
        let engine = build_engine(Arc::clone(&store));
        let ctx = admin(org);
        let caregivers = seed_three_caregivers(store.as_ref(), org, branch).await;

        let shift = shift_fixture(org, branch, ClientId::new());
        let shift = engine.create_shift(&ctx, shift).await.unwrap();
        let run = engine
            .match_shift(&ctx, shift.id, MatchShiftOptions::default())
            .await
            .unwrap();
        let first = &run.proposals[0];
        engine
            .respond(&ctx, first.id, first.version, true, None, None)
            .await
            .unwrap();

        let err = engine
            .create_manual_proposal(&ctx, shift.id, caregivers[1])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");

        let err = engine
            .match_shift(&ctx, shift.id, MatchShiftOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }
}
