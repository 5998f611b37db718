//! Proposal management
//!
//! Owns the proposal state machine and the commit path: creating
//! proposals from ranked candidates, tracking delivery, committing
//! responses atomically, the expiry sweep, caregiver self-selects,
//! and the cancellation cascade.

use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::caregiver::VisitWindow;
use crate::configuration::MatchingConfiguration;
use crate::error::{EngineError, EngineResult};
use crate::history::{MatchHistory, MatchOutcome};
use crate::ids::{CaregiverId, ProposalId, ShiftId};
use crate::ml::VariantOutcome;
use crate::notify::Notifier;
use crate::proposal::{AssignmentProposal, RejectionCategory};
use crate::scoring::{score_candidate, MatchCandidate};
use crate::shift::{MatchingStatus, OpenShift};
use crate::store::{ExpireSweep, Page, ProposalResponse, ResponseCommit, ShiftFilter, Store};

/// Result of a propose run
#[derive(Debug, Clone)]
pub struct ProposeOutcome {
    pub shift: OpenShift,
    pub proposals: Vec<AssignmentProposal>,
}

/// Result of a caregiver self-select
#[derive(Debug, Clone)]
pub struct SelectOutcome {
    pub proposal: AssignmentProposal,
    pub auto_assigned: bool,
}

/// Owns proposal lifecycle and the acceptance commit path
pub struct ProposalManager {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl ProposalManager {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Write one pending proposal per qualifying candidate
    ///
    /// Candidates must be ranked already. Takes up to
    /// `max_proposals_per_shift` eligible candidates at or above the
    /// score floor, skipping caregivers that already hold a live
    /// proposal for the shift. Transitions the shift to proposed, or
    /// no-match when nobody qualifies.
    pub async fn propose(
        &self,
        shift_id: ShiftId,
        candidates: &[MatchCandidate],
        config: &MatchingConfiguration,
    ) -> EngineResult<ProposeOutcome> {
        let now = Utc::now();
        let mut shift = self.store.get_shift(shift_id).await?;
        if shift.status == MatchingStatus::Assigned {
            return Err(EngineError::Conflict(format!(
                "shift {} is already assigned",
                shift_id
            )));
        }
        if shift.status.is_terminal() {
            return Err(EngineError::Conflict(format!(
                "shift {} is {} and cannot receive proposals",
                shift_id, shift.status
            )));
        }

        let live: Vec<CaregiverId> = self
            .store
            .find_nonterminal_proposals(shift_id)
            .await?
            .into_iter()
            .map(|p| p.caregiver_id)
            .collect();

        let chosen: Vec<&MatchCandidate> = candidates
            .iter()
            .filter(|c| {
                c.is_eligible
                    && c.overall_score >= config.thresholds.min_score_for_proposal
                    && !live.contains(&c.caregiver_id)
            })
            .take(config.thresholds.max_proposals_per_shift)
            .collect();

        if chosen.is_empty() {
            // Live proposals keep the shift in proposed; only a shift
            // with nothing outstanding drops to no-match
            if live.is_empty() {
                shift.mark_no_match()?;
                shift.updated_at = now;
                shift = self.store.update_shift(shift).await?;
                counter!("carematch_no_match_total").increment(1);
            }
            return Ok(ProposeOutcome {
                shift,
                proposals: Vec::new(),
            });
        }

        let mut attempts = self.attempt_counters(shift_id).await?;
        let mut proposals = Vec::with_capacity(chosen.len());
        let mut history = Vec::with_capacity(chosen.len());
        for candidate in chosen {
            let proposal = AssignmentProposal::new(shift_id, candidate, config, now);
            let attempt = attempts.entry(candidate.caregiver_id).or_insert(0);
            *attempt += 1;
            history.push(MatchHistory::record(
                shift.organization_id,
                shift_id,
                candidate.caregiver_id,
                *attempt,
                candidate.overall_score,
                MatchOutcome::Proposed,
                proposal.snapshot.config.clone(),
                now,
            ));
            proposals.push(proposal);
        }

        shift.mark_proposed()?;
        shift.updated_at = now;
        let shift = self
            .store
            .persist_proposals(shift, proposals.clone(), history)
            .await?;

        counter!("carematch_proposals_created_total").increment(proposals.len() as u64);
        for proposal in &proposals {
            let channels = match self.store.get_preferences(proposal.caregiver_id).await {
                Ok(Some(profile)) => profile.notification_channels,
                _ => Vec::new(),
            };
            self.notifier.proposal_created(proposal, &channels).await;
        }

        Ok(ProposeOutcome { shift, proposals })
    }

    /// Idempotent delivery acknowledgement
    pub async fn mark_sent(&self, proposal_id: ProposalId) -> EngineResult<AssignmentProposal> {
        let now = Utc::now();
        let mut proposal = self.store.get_proposal(proposal_id).await?;
        let before = proposal.status;
        proposal.mark_sent(now)?;
        if proposal.status == before {
            return Ok(proposal);
        }
        self.store.update_proposal(proposal).await
    }

    /// Idempotent view acknowledgement
    pub async fn mark_viewed(&self, proposal_id: ProposalId) -> EngineResult<AssignmentProposal> {
        let now = Utc::now();
        let mut proposal = self.store.get_proposal(proposal_id).await?;
        let before = proposal.status;
        proposal.mark_viewed(now)?;
        if proposal.status == before {
            return Ok(proposal);
        }
        self.store.update_proposal(proposal).await
    }

    /// Commit a caregiver response
    ///
    /// Accept supersedes all sibling proposals and assigns the shift
    /// atomically; reject reopens the shift for matching once no live
    /// siblings remain. `expected_version` guards against lost updates.
    pub async fn respond(
        &self,
        proposal_id: ProposalId,
        expected_version: u64,
        accept: bool,
        actor: Uuid,
        reason: Option<String>,
        category: Option<RejectionCategory>,
    ) -> EngineResult<ResponseCommit> {
        let now = Utc::now();
        let response = if accept {
            ProposalResponse::Accept { actor }
        } else {
            ProposalResponse::Reject {
                actor,
                reason,
                category,
            }
        };

        let commit = self
            .store
            .commit_response(proposal_id, expected_version, response, now)
            .await?;

        if accept {
            counter!("carematch_proposals_accepted_total").increment(1);
            self.after_accept(&commit).await;
        } else {
            counter!("carematch_proposals_rejected_total").increment(1);
        }

        Ok(commit)
    }

    /// Move every live proposal past its TTL to expired
    ///
    /// Safe to run concurrently with `respond`: the store serializes
    /// the two paths, so a winning accept blocks the sweep for that
    /// proposal and vice versa.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> EngineResult<ExpireSweep> {
        let sweep = self.store.expire_proposals(now).await?;
        if !sweep.expired.is_empty() {
            counter!("carematch_proposals_expired_total").increment(sweep.expired.len() as u64);
            tracing::info!(
                expired = sweep.expired.len(),
                reopened = sweep.reopened_shifts.len(),
                "expired stale proposals"
            );
        }
        Ok(sweep)
    }

    /// Expire open shifts whose fill-by deadline passed, cascading the
    /// withdrawal of their live proposals
    pub async fn expire_overdue_shifts(&self, now: DateTime<Utc>) -> EngineResult<Vec<ShiftId>> {
        let filter = ShiftFilter::default();
        let page = Page {
            offset: 0,
            limit: 500,
        };
        let shifts = self.store.find_open_shifts(&filter, page).await?.items;
        let mut expired = Vec::new();
        for mut shift in shifts {
            let overdue = shift.status.is_open()
                && shift.fill_by.is_some_and(|deadline| deadline <= now);
            if !overdue {
                continue;
            }
            self.withdraw_for_shift(shift.id, now).await?;
            // Withdrawal may have bumped the shift version
            shift = self.store.get_shift(shift.id).await?;
            shift.expire()?;
            shift.updated_at = now;
            self.store.update_shift(shift.clone()).await?;
            expired.push(shift.id);
        }
        if !expired.is_empty() {
            counter!("carematch_shifts_expired_total").increment(expired.len() as u64);
        }
        Ok(expired)
    }

    /// Cancel a shift and withdraw its live proposals
    pub async fn cancel_shift(&self, shift_id: ShiftId) -> EngineResult<OpenShift> {
        let now = Utc::now();
        self.withdraw_for_shift(shift_id, now).await?;
        let mut shift = self.store.get_shift(shift_id).await?;
        shift.cancel()?;
        shift.updated_at = now;
        self.store.update_shift(shift).await
    }

    /// Move every live proposal for a shift to withdrawn
    pub async fn withdraw_for_shift(
        &self,
        shift_id: ShiftId,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<AssignmentProposal>> {
        let shift = self.store.get_shift(shift_id).await?;
        let live = self.store.find_nonterminal_proposals(shift_id).await?;
        let mut attempts = self.attempt_counters(shift_id).await?;
        let mut withdrawn = Vec::with_capacity(live.len());
        let mut history = Vec::new();
        for mut proposal in live {
            proposal.withdraw(now)?;
            let updated = self.store.update_proposal(proposal).await?;
            let attempt = attempts.entry(updated.caregiver_id).or_insert(0);
            *attempt += 1;
            history.push(MatchHistory::record(
                shift.organization_id,
                shift_id,
                updated.caregiver_id,
                *attempt,
                updated.score,
                MatchOutcome::Withdrawn,
                updated.snapshot.config.clone(),
                now,
            ));
            withdrawn.push(updated);
        }
        if !history.is_empty() {
            self.store.append_history(history).await?;
        }
        Ok(withdrawn)
    }

    /// Caregiver self-select path
    ///
    /// Evaluates the caregiver on demand; blocking issues surface as
    /// an eligibility error and nothing is written. When the profile
    /// opts into auto-assignment and the score clears the threshold,
    /// the proposal commits straight to accepted.
    pub async fn caregiver_select_shift(
        &self,
        caregiver_id: CaregiverId,
        shift_id: ShiftId,
        config: &MatchingConfiguration,
    ) -> EngineResult<SelectOutcome> {
        let now = Utc::now();
        let mut shift = self.store.get_shift(shift_id).await?;
        if shift.status == MatchingStatus::Assigned {
            return Err(EngineError::Conflict(format!(
                "shift {} is already assigned",
                shift_id
            )));
        }
        if shift.status.is_terminal() {
            return Err(EngineError::Conflict(format!(
                "shift {} is {} and cannot be selected",
                shift_id, shift.status
            )));
        }
        let already_live = self
            .store
            .find_nonterminal_proposals(shift_id)
            .await?
            .into_iter()
            .any(|p| p.caregiver_id == caregiver_id);
        if already_live {
            return Err(EngineError::Conflict(format!(
                "caregiver {} already has a live proposal for shift {}",
                caregiver_id, shift_id
            )));
        }

        let ctx = self
            .store
            .caregiver_context(caregiver_id, &shift, now)
            .await?;
        let candidate = score_candidate(&shift, &ctx, config, now);
        if !candidate.is_eligible {
            return Err(EngineError::Eligibility {
                issues: candidate.issues,
            });
        }

        let profile = self.store.get_preferences(caregiver_id).await?;
        let auto_assign = profile.as_ref().is_some_and(|p| p.accept_auto_assignment)
            && candidate.overall_score >= config.thresholds.auto_assign_threshold;

        let proposal = AssignmentProposal::new(shift_id, &candidate, config, now);
        let mut attempts = self.attempt_counters(shift_id).await?;
        let attempt = attempts.entry(caregiver_id).or_insert(0);
        *attempt += 1;
        let history = vec![MatchHistory::record(
            shift.organization_id,
            shift_id,
            caregiver_id,
            *attempt,
            candidate.overall_score,
            if auto_assign {
                MatchOutcome::AutoAssigned
            } else {
                MatchOutcome::Proposed
            },
            proposal.snapshot.config.clone(),
            now,
        )];

        shift.mark_proposed()?;
        shift.updated_at = now;
        self.store
            .persist_proposals(shift, vec![proposal.clone()], history)
            .await?;

        if auto_assign {
            let commit = self
                .store
                .commit_response(
                    proposal.id,
                    proposal.version,
                    ProposalResponse::Accept {
                        actor: caregiver_id.0,
                    },
                    now,
                )
                .await?;
            counter!("carematch_auto_assignments_total").increment(1);
            self.after_accept(&commit).await;
            return Ok(SelectOutcome {
                proposal: commit.proposal,
                auto_assigned: true,
            });
        }

        Ok(SelectOutcome {
            proposal,
            auto_assigned: false,
        })
    }

    /// Operator-created proposal for a specific caregiver
    ///
    /// Bypasses the score floor but never the eligibility rules.
    pub async fn propose_manual(
        &self,
        shift_id: ShiftId,
        caregiver_id: CaregiverId,
        config: &MatchingConfiguration,
    ) -> EngineResult<AssignmentProposal> {
        let now = Utc::now();
        let mut shift = self.store.get_shift(shift_id).await?;
        if !shift.status.is_open() {
            return Err(EngineError::Conflict(format!(
                "shift {} is {} and cannot receive proposals",
                shift_id, shift.status
            )));
        }
        let already_live = self
            .store
            .find_nonterminal_proposals(shift_id)
            .await?
            .into_iter()
            .any(|p| p.caregiver_id == caregiver_id);
        if already_live {
            return Err(EngineError::Conflict(format!(
                "caregiver {} already has a live proposal for shift {}",
                caregiver_id, shift_id
            )));
        }

        let ctx = self
            .store
            .caregiver_context(caregiver_id, &shift, now)
            .await?;
        let candidate = score_candidate(&shift, &ctx, config, now);
        if !candidate.is_eligible {
            return Err(EngineError::Eligibility {
                issues: candidate.issues,
            });
        }

        let proposal = AssignmentProposal::new(shift_id, &candidate, config, now);
        let mut attempts = self.attempt_counters(shift_id).await?;
        let attempt = attempts.entry(caregiver_id).or_insert(0);
        *attempt += 1;
        let history = vec![MatchHistory::record(
            shift.organization_id,
            shift_id,
            caregiver_id,
            *attempt,
            candidate.overall_score,
            MatchOutcome::Proposed,
            proposal.snapshot.config.clone(),
            now,
        )];

        shift.mark_proposed()?;
        shift.updated_at = now;
        self.store
            .persist_proposals(shift, vec![proposal.clone()], history)
            .await?;
        counter!("carematch_proposals_created_total").increment(1);

        let channels = match self.store.get_preferences(caregiver_id).await {
            Ok(Some(profile)) => profile.notification_channels,
            _ => Vec::new(),
        };
        self.notifier.proposal_created(&proposal, &channels).await;
        Ok(proposal)
    }

    /// Post-accept bookkeeping: commit the visit onto the caregiver's
    /// calendar, attach the experiment outcome, and notify. All
    /// best-effort; the accept already committed.
    async fn after_accept(&self, commit: &ResponseCommit) {
        let shift = &commit.shift;
        let proposal = &commit.proposal;
        let visit = VisitWindow {
            client_id: shift.client_id,
            date: shift.scheduled_date,
            start_time: shift.start_time,
            end_time: shift.end_time,
        };
        if let Err(e) = self
            .store
            .record_assigned_visit(proposal.caregiver_id, visit)
            .await
        {
            tracing::error!(shift = %shift.id, caregiver = %proposal.caregiver_id, error = %e, "failed to record assigned visit");
        }
        let experiment_outcome = VariantOutcome {
            matched: true,
            accepted: true,
            completed: false,
            match_score: Some(proposal.score),
            satisfaction: None,
        };
        if let Err(e) = self
            .store
            .record_experiment_outcome(shift.id, experiment_outcome)
            .await
        {
            // Expected for shifts outside any experiment
            tracing::debug!(shift = %shift.id, error = %e, "no experiment outcome recorded");
        }
        self.notifier
            .assignment_confirmed(shift, proposal.caregiver_id)
            .await;
    }

    /// Per-caregiver attempt ordinals observed so far for a shift
    async fn attempt_counters(
        &self,
        shift_id: ShiftId,
    ) -> EngineResult<HashMap<CaregiverId, u32>> {
        let rows = self.store.find_history_for_shift(shift_id).await?;
        let mut counters: HashMap<CaregiverId, u32> = HashMap::new();
        for row in rows {
            let entry = counters.entry(row.caregiver_id).or_insert(0);
            *entry = (*entry).max(row.attempt);
        }
        Ok(counters)
    }
}
