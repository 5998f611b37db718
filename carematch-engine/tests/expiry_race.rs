//! Concurrency: the respond/expiry race resolves to exactly one outcome

mod common;

use chrono::{Duration, Utc};
use std::sync::Arc;

use carematch_engine::engine::MatchShiftOptions;
use carematch_engine::proposal::ProposalStatus;
use carematch_engine::ids::{BranchId, ClientId, OrganizationId};
use carematch_engine::shift::MatchingStatus;
use carematch_engine::store::{MemoryStore, Store};

use common::*;

#[tokio::test]
async fn accept_and_sweep_race_yields_exactly_one_winner() {
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
    let proposal = run.proposals[0].clone();

    // Age the proposal past its TTL so both paths are willing to act
    let mut aged = store.get_proposal(proposal.id).await.unwrap();
    aged.expires_at = Utc::now() - Duration::milliseconds(20);
    let aged = store.update_proposal(aged).await.unwrap();

    let respond = engine.respond(&ctx, proposal.id, aged.version, true, None, None);
    let sweep = engine.manager().expire_stale(Utc::now());
    let (respond_result, sweep_result) = tokio::join!(respond, sweep);
    let sweep_result = sweep_result.unwrap();

    let stored = store.get_proposal(proposal.id).await.unwrap();
    let stored_shift = store.get_shift(shift.id).await.unwrap();

    match respond_result {
        Ok(commit) => {
            // The accept won: the sweep must not have touched it
            assert_eq!(commit.proposal.status, ProposalStatus::Accepted);
            assert_eq!(stored.status, ProposalStatus::Accepted);
            assert_eq!(stored_shift.status, MatchingStatus::Assigned);
            assert!(sweep_result.expired.is_empty());
        }
        Err(err) => {
            // The sweep won: the accept must observe the conflict
            assert_eq!(err.code(), "CONFLICT");
            assert_eq!(stored.status, ProposalStatus::Expired);
            assert_eq!(stored_shift.status, MatchingStatus::Matching);
            assert_eq!(sweep_result.expired.len(), 1);
        }
    }

    // Never both outcomes
    assert_ne!(
        stored.status == ProposalStatus::Accepted,
        stored.status == ProposalStatus::Expired
    );
}

#[tokio::test]
async fn repeated_races_never_produce_two_terminal_outcomes() {
    for _ in 0..10 {
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
        let proposal = run.proposals[0].clone();

        let mut aged = store.get_proposal(proposal.id).await.unwrap();
        aged.expires_at = Utc::now() - Duration::milliseconds(1);
        let aged = store.update_proposal(aged).await.unwrap();

        let engine_clone = Arc::clone(&engine);
        let ctx_clone = ctx.clone();
        let respond_task = tokio::spawn(async move {
            engine_clone
                .respond(&ctx_clone, proposal.id, aged.version, true, None, None)
                .await
        });
        let manager = Arc::clone(engine.manager());
        let sweep_task = tokio::spawn(async move { manager.expire_stale(Utc::now()).await });

        let respond_result = respond_task.await.unwrap();
        sweep_task.await.unwrap().unwrap();

        let stored = store.get_proposal(proposal.id).await.unwrap();
        match stored.status {
            ProposalStatus::Accepted => {
                assert!(respond_result.is_ok());
                assert_eq!(
                    store.get_shift(shift.id).await.unwrap().status,
                    MatchingStatus::Assigned
                );
            }
            ProposalStatus::Expired => {
                assert!(respond_result.is_err());
                assert_eq!(
                    store.get_shift(shift.id).await.unwrap().status,
                    MatchingStatus::Matching
                );
            }
            other => panic!("proposal finished in unexpected state {:?}", other),
        }
    }
}
