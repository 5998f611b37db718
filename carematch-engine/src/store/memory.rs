//! In-memory store
//!
//! DashMap-backed backend used by tests and local runs. A single
//! async mutex serializes every write, which gives the transactional
//! operations the same per-shift serializability the durable backend
//! provides.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::bulk::BulkMatchRequest;
use crate::caregiver::{Caregiver, CaregiverContext, CaregiverPreferenceProfile, EmploymentStatus, VisitWindow};
use crate::configuration::MatchingConfiguration;
use crate::error::{EngineError, EngineResult};
use crate::history::{MatchHistory, MatchOutcome};
use crate::ids::{BranchId, BulkMatchId, CaregiverId, ClientId, ConfigId, ExperimentId, OrganizationId, ProposalId, ShiftId};
use crate::ml::{Experiment, ExperimentAssignment, ModelRegistration, VariantOutcome};
use crate::proposal::AssignmentProposal;
use crate::shift::{MatchingStatus, OpenShift};
use crate::store::{
    assemble_context, sort_shifts, ContextSources, ExpireSweep, Page, PageResult,
    ProposalResponse, ResponseCommit, ShiftFilter, Store, RECENT_WINDOW_DAYS,
};

/// DashMap-backed store
#[derive(Default)]
pub struct MemoryStore {
    shifts: DashMap<ShiftId, OpenShift>,
    caregivers: DashMap<CaregiverId, Caregiver>,
    proposals: DashMap<ProposalId, AssignmentProposal>,
    configurations: DashMap<ConfigId, MatchingConfiguration>,
    preferences: DashMap<CaregiverId, CaregiverPreferenceProfile>,
    bulk_requests: DashMap<BulkMatchId, BulkMatchRequest>,
    visits: DashMap<CaregiverId, Vec<VisitWindow>>,
    ratings: DashMap<(CaregiverId, ClientId), f64>,
    history: RwLock<Vec<MatchHistory>>,
    experiments: DashMap<ExperimentId, Experiment>,
    assignments: DashMap<ShiftId, ExperimentAssignment>,
    models: DashMap<OrganizationId, ModelRegistration>,
    /// Serializes all writes; reads stay lock-free
    write_lock: tokio::sync::Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next attempt ordinal for a (shift, caregiver) pair
    fn next_attempt(&self, shift_id: ShiftId, caregiver_id: CaregiverId) -> u32 {
        let history = self.history.read();
        history
            .iter()
            .filter(|h| h.shift_id == shift_id && h.caregiver_id == caregiver_id)
            .count() as u32
            + 1
    }

    fn respondable_siblings(
        &self,
        shift_id: ShiftId,
        except: ProposalId,
    ) -> Vec<AssignmentProposal> {
        self.proposals
            .iter()
            .filter(|entry| {
                entry.shift_id == shift_id && entry.id != except && entry.status.is_respondable()
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn transition_history_row(
        &self,
        proposal: &AssignmentProposal,
        shift: &OpenShift,
        outcome: MatchOutcome,
        now: DateTime<Utc>,
    ) -> MatchHistory {
        let row = MatchHistory::record(
            shift.organization_id,
            proposal.shift_id,
            proposal.caregiver_id,
            self.next_attempt(proposal.shift_id, proposal.caregiver_id),
            proposal.score,
            outcome,
            proposal.snapshot.config.clone(),
            now,
        );
        match outcome {
            MatchOutcome::Accepted | MatchOutcome::Rejected | MatchOutcome::AutoAssigned => {
                row.with_response_seconds((now - proposal.proposed_at).num_seconds())
            }
            _ => row,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_shift(&self, shift: OpenShift) -> EngineResult<OpenShift> {
        let _guard = self.write_lock.lock().await;
        if self.shifts.contains_key(&shift.id) {
            return Err(EngineError::Conflict(format!(
                "shift {} already exists",
                shift.id
            )));
        }
        self.shifts.insert(shift.id, shift.clone());
        Ok(shift)
    }

    async fn get_shift(&self, id: ShiftId) -> EngineResult<OpenShift> {
        self.shifts
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::not_found("shift", id))
    }

    async fn update_shift(&self, mut shift: OpenShift) -> EngineResult<OpenShift> {
        let _guard = self.write_lock.lock().await;
        let stored_version = self
            .shifts
            .get(&shift.id)
            .map(|entry| entry.version)
            .ok_or_else(|| EngineError::not_found("shift", shift.id))?;
        if stored_version != shift.version {
            return Err(EngineError::stale_version("shift", shift.version, stored_version));
        }
        shift.version += 1;
        self.shifts.insert(shift.id, shift.clone());
        Ok(shift)
    }

    async fn find_open_shifts(
        &self,
        filter: &ShiftFilter,
        page: Page,
    ) -> EngineResult<PageResult<OpenShift>> {
        let mut matching: Vec<OpenShift> = self
            .shifts
            .iter()
            .filter(|entry| filter.matches(entry))
            .map(|entry| entry.value().clone())
            .collect();
        sort_shifts(&mut matching);
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();
        Ok(PageResult {
            items,
            total,
            offset: page.offset,
            limit: page.limit,
        })
    }

    async fn insert_caregiver(&self, caregiver: Caregiver) -> EngineResult<Caregiver> {
        let _guard = self.write_lock.lock().await;
        self.caregivers.insert(caregiver.id, caregiver.clone());
        Ok(caregiver)
    }

    async fn get_caregiver(&self, id: CaregiverId) -> EngineResult<Caregiver> {
        self.caregivers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::not_found("caregiver", id))
    }

    async fn find_candidates_for_shift(&self, shift: &OpenShift) -> EngineResult<Vec<Caregiver>> {
        let mut candidates: Vec<Caregiver> = self
            .caregivers
            .iter()
            .filter(|entry| {
                entry.organization_id == shift.organization_id
                    && entry.employment_status == EmploymentStatus::Active
                    && entry.branch_ids.contains(&shift.branch_id)
            })
            .map(|entry| entry.value().clone())
            .collect();
        candidates.sort_by_key(|c| c.id);
        Ok(candidates)
    }

    async fn caregiver_context(
        &self,
        caregiver_id: CaregiverId,
        shift: &OpenShift,
        now: DateTime<Utc>,
    ) -> EngineResult<CaregiverContext> {
        let caregiver = self.get_caregiver(caregiver_id).await?;
        let visits = self
            .visits
            .get(&caregiver_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        let client_rating = self
            .ratings
            .get(&(caregiver_id, shift.client_id))
            .map(|entry| *entry);
        let client_total_visits = self
            .visits
            .iter()
            .flat_map(|entry| entry.value().clone())
            .filter(|v| v.client_id == shift.client_id)
            .count() as u32;
        let since = now - Duration::days(RECENT_WINDOW_DAYS);
        let recent_history: Vec<MatchHistory> = self
            .history
            .read()
            .iter()
            .filter(|h| h.caregiver_id == caregiver_id && h.recorded_at >= since)
            .cloned()
            .collect();

        Ok(assemble_context(
            ContextSources {
                caregiver,
                visits: &visits,
                client_rating,
                client_total_visits,
                recent_history: &recent_history,
            },
            shift,
        ))
    }

    async fn record_assigned_visit(
        &self,
        caregiver_id: CaregiverId,
        visit: VisitWindow,
    ) -> EngineResult<()> {
        let _guard = self.write_lock.lock().await;
        self.visits.entry(caregiver_id).or_default().push(visit);
        Ok(())
    }

    async fn record_client_rating(
        &self,
        caregiver_id: CaregiverId,
        client_id: ClientId,
        rating: f64,
    ) -> EngineResult<()> {
        let _guard = self.write_lock.lock().await;
        self.ratings.insert((caregiver_id, client_id), rating);
        Ok(())
    }

    async fn get_proposal(&self, id: ProposalId) -> EngineResult<AssignmentProposal> {
        self.proposals
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::not_found("proposal", id))
    }

    async fn update_proposal(
        &self,
        mut proposal: AssignmentProposal,
    ) -> EngineResult<AssignmentProposal> {
        let _guard = self.write_lock.lock().await;
        let stored_version = self
            .proposals
            .get(&proposal.id)
            .map(|entry| entry.version)
            .ok_or_else(|| EngineError::not_found("proposal", proposal.id))?;
        if stored_version != proposal.version {
            return Err(EngineError::stale_version(
                "proposal",
                proposal.version,
                stored_version,
            ));
        }
        proposal.version += 1;
        self.proposals.insert(proposal.id, proposal.clone());
        Ok(proposal)
    }

    async fn find_proposals_for_shift(
        &self,
        shift_id: ShiftId,
    ) -> EngineResult<Vec<AssignmentProposal>> {
        let mut proposals: Vec<AssignmentProposal> = self
            .proposals
            .iter()
            .filter(|entry| entry.shift_id == shift_id)
            .map(|entry| entry.value().clone())
            .collect();
        proposals.sort_by_key(|p| (p.proposed_at, p.id));
        Ok(proposals)
    }

    async fn find_nonterminal_proposals(
        &self,
        shift_id: ShiftId,
    ) -> EngineResult<Vec<AssignmentProposal>> {
        let mut proposals = self.find_proposals_for_shift(shift_id).await?;
        proposals.retain(|p| p.status.is_respondable());
        Ok(proposals)
    }

    async fn find_proposals_for_caregiver(
        &self,
        caregiver_id: CaregiverId,
    ) -> EngineResult<Vec<AssignmentProposal>> {
        let mut proposals: Vec<AssignmentProposal> = self
            .proposals
            .iter()
            .filter(|entry| entry.caregiver_id == caregiver_id)
            .map(|entry| entry.value().clone())
            .collect();
        proposals.sort_by_key(|p| (p.proposed_at, p.id));
        Ok(proposals)
    }

    async fn find_expired_proposals(
        &self,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<AssignmentProposal>> {
        let mut proposals: Vec<AssignmentProposal> = self
            .proposals
            .iter()
            .filter(|entry| entry.status.is_respondable() && entry.expires_at <= now)
            .map(|entry| entry.value().clone())
            .collect();
        proposals.sort_by_key(|p| (p.expires_at, p.id));
        Ok(proposals)
    }

    async fn persist_proposals(
        &self,
        mut shift: OpenShift,
        proposals: Vec<AssignmentProposal>,
        history: Vec<MatchHistory>,
    ) -> EngineResult<OpenShift> {
        let _guard = self.write_lock.lock().await;
        let stored = self
            .shifts
            .get(&shift.id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::not_found("shift", shift.id))?;
        if stored.version != shift.version {
            return Err(EngineError::stale_version("shift", shift.version, stored.version));
        }
        if stored.status == MatchingStatus::Assigned {
            return Err(EngineError::Conflict(format!(
                "shift {} is already assigned",
                shift.id
            )));
        }
        for proposal in &proposals {
            let duplicate = self.proposals.iter().any(|entry| {
                entry.shift_id == shift.id
                    && entry.caregiver_id == proposal.caregiver_id
                    && entry.status.is_respondable()
            });
            if duplicate {
                return Err(EngineError::Conflict(format!(
                    "caregiver {} already has a live proposal for shift {}",
                    proposal.caregiver_id, shift.id
                )));
            }
        }

        shift.version += 1;
        self.shifts.insert(shift.id, shift.clone());
        for proposal in proposals {
            self.proposals.insert(proposal.id, proposal);
        }
        self.history.write().extend(history);
        Ok(shift)
    }

    async fn commit_response(
        &self,
        proposal_id: ProposalId,
        expected_version: u64,
        response: ProposalResponse,
        now: DateTime<Utc>,
    ) -> EngineResult<ResponseCommit> {
        let _guard = self.write_lock.lock().await;
        let mut proposal = self
            .proposals
            .get(&proposal_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::not_found("proposal", proposal_id))?;
        if proposal.version != expected_version {
            return Err(EngineError::stale_version(
                "proposal",
                expected_version,
                proposal.version,
            ));
        }
        if !proposal.status.is_respondable() {
            return Err(EngineError::Conflict(format!(
                "proposal {} is {} and no longer respondable",
                proposal_id, proposal.status
            )));
        }
        let mut shift = self
            .shifts
            .get(&proposal.shift_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::not_found("shift", proposal.shift_id))?;

        let mut history_rows = Vec::new();
        let mut superseded = Vec::new();

        match response {
            ProposalResponse::Accept { actor } => {
                if shift.status == MatchingStatus::Assigned {
                    // A respondable proposal on an assigned shift means a
                    // previous accept failed to supersede its siblings.
                    shift.needs_operator_review = true;
                    shift.version += 1;
                    self.shifts.insert(shift.id, shift.clone());
                    return Err(EngineError::Fatal(format!(
                        "shift {} already assigned but proposal {} was still live",
                        shift.id, proposal_id
                    )));
                }
                proposal.accept(actor, now)?;
                proposal.version += 1;
                history_rows.push(self.transition_history_row(
                    &proposal,
                    &shift,
                    MatchOutcome::Accepted,
                    now,
                ));

                for mut sibling in self.respondable_siblings(shift.id, proposal_id) {
                    sibling.supersede(now)?;
                    sibling.version += 1;
                    history_rows.push(self.transition_history_row(
                        &sibling,
                        &shift,
                        MatchOutcome::Superseded,
                        now,
                    ));
                    self.proposals.insert(sibling.id, sibling.clone());
                    superseded.push(sibling);
                }

                shift.assign()?;
            }
            ProposalResponse::Reject {
                actor,
                reason,
                category,
            } => {
                proposal.reject(actor, reason, category, now)?;
                proposal.version += 1;
                history_rows.push(self.transition_history_row(
                    &proposal,
                    &shift,
                    MatchOutcome::Rejected,
                    now,
                ));

                let siblings_remain = !self.respondable_siblings(shift.id, proposal_id).is_empty();
                if !siblings_remain && shift.status == MatchingStatus::Proposed {
                    shift.reopen_for_matching()?;
                }
            }
        }

        shift.updated_at = now;
        shift.version += 1;
        self.shifts.insert(shift.id, shift.clone());
        self.proposals.insert(proposal.id, proposal.clone());
        self.history.write().extend(history_rows);

        Ok(ResponseCommit {
            proposal,
            superseded,
            shift,
        })
    }

    async fn expire_proposals(&self, now: DateTime<Utc>) -> EngineResult<ExpireSweep> {
        let _guard = self.write_lock.lock().await;
        let due: Vec<AssignmentProposal> = self
            .proposals
            .iter()
            .filter(|entry| entry.status.is_respondable() && entry.expires_at <= now)
            .map(|entry| entry.value().clone())
            .collect();

        let mut sweep = ExpireSweep::default();
        let mut history_rows = Vec::new();
        let mut touched_shifts = std::collections::BTreeSet::new();

        for mut proposal in due {
            let Some(shift) = self.shifts.get(&proposal.shift_id).map(|e| e.value().clone()) else {
                tracing::warn!(proposal = %proposal.id, shift = %proposal.shift_id, "expired proposal references a missing shift");
                continue;
            };
            proposal.expire(now)?;
            proposal.version += 1;
            history_rows.push(self.transition_history_row(
                &proposal,
                &shift,
                MatchOutcome::Expired,
                now,
            ));
            touched_shifts.insert(proposal.shift_id);
            self.proposals.insert(proposal.id, proposal.clone());
            sweep.expired.push(proposal);
        }

        for shift_id in touched_shifts {
            let live_remaining = self
                .proposals
                .iter()
                .any(|entry| entry.shift_id == shift_id && entry.status.is_respondable());
            if live_remaining {
                continue;
            }
            if let Some(mut shift) = self.shifts.get(&shift_id).map(|e| e.value().clone()) {
                if shift.status == MatchingStatus::Proposed {
                    shift.reopen_for_matching()?;
                    shift.updated_at = now;
                    shift.version += 1;
                    self.shifts.insert(shift_id, shift);
                    sweep.reopened_shifts.push(shift_id);
                }
            }
        }

        self.history.write().extend(history_rows);
        Ok(sweep)
    }

    async fn insert_configuration(
        &self,
        config: MatchingConfiguration,
    ) -> EngineResult<MatchingConfiguration> {
        let _guard = self.write_lock.lock().await;
        self.configurations.insert(config.id, config.clone());
        Ok(config)
    }

    async fn update_configuration(
        &self,
        mut config: MatchingConfiguration,
    ) -> EngineResult<MatchingConfiguration> {
        let _guard = self.write_lock.lock().await;
        let stored_version = self
            .configurations
            .get(&config.id)
            .map(|entry| entry.version)
            .ok_or_else(|| EngineError::not_found("configuration", config.id))?;
        if stored_version != config.version {
            return Err(EngineError::stale_version(
                "configuration",
                config.version,
                stored_version,
            ));
        }
        config.version += 1;
        self.configurations.insert(config.id, config.clone());
        Ok(config)
    }

    async fn get_configuration(&self, id: ConfigId) -> EngineResult<MatchingConfiguration> {
        self.configurations
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::not_found("configuration", id))
    }

    async fn resolve_configuration(
        &self,
        organization_id: OrganizationId,
        branch_id: Option<BranchId>,
    ) -> EngineResult<Option<MatchingConfiguration>> {
        if let Some(branch) = branch_id {
            let branch_config = self.configurations.iter().find_map(|entry| {
                (entry.organization_id == organization_id && entry.branch_id == Some(branch))
                    .then(|| entry.value().clone())
            });
            if branch_config.is_some() {
                return Ok(branch_config);
            }
        }
        Ok(self.configurations.iter().find_map(|entry| {
            (entry.organization_id == organization_id && entry.branch_id.is_none())
                .then(|| entry.value().clone())
        }))
    }

    async fn upsert_preferences(
        &self,
        mut profile: CaregiverPreferenceProfile,
    ) -> EngineResult<CaregiverPreferenceProfile> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.preferences.get(&profile.caregiver_id) {
            profile.version = existing.version + 1;
        }
        self.preferences.insert(profile.caregiver_id, profile.clone());
        Ok(profile)
    }

    async fn get_preferences(
        &self,
        caregiver_id: CaregiverId,
    ) -> EngineResult<Option<CaregiverPreferenceProfile>> {
        Ok(self.preferences.get(&caregiver_id).map(|entry| entry.value().clone()))
    }

    async fn insert_bulk_request(
        &self,
        request: BulkMatchRequest,
    ) -> EngineResult<BulkMatchRequest> {
        let _guard = self.write_lock.lock().await;
        self.bulk_requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn update_bulk_request(
        &self,
        mut request: BulkMatchRequest,
    ) -> EngineResult<BulkMatchRequest> {
        let _guard = self.write_lock.lock().await;
        let stored_version = self
            .bulk_requests
            .get(&request.id)
            .map(|entry| entry.version)
            .ok_or_else(|| EngineError::not_found("bulk request", request.id))?;
        if stored_version != request.version {
            return Err(EngineError::stale_version(
                "bulk request",
                request.version,
                stored_version,
            ));
        }
        request.version += 1;
        self.bulk_requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get_bulk_request(&self, id: BulkMatchId) -> EngineResult<BulkMatchRequest> {
        self.bulk_requests
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::not_found("bulk request", id))
    }

    async fn append_history(&self, rows: Vec<MatchHistory>) -> EngineResult<()> {
        let _guard = self.write_lock.lock().await;
        self.history.write().extend(rows);
        Ok(())
    }

    async fn find_history_for_shift(&self, shift_id: ShiftId) -> EngineResult<Vec<MatchHistory>> {
        Ok(self
            .history
            .read()
            .iter()
            .filter(|h| h.shift_id == shift_id)
            .cloned()
            .collect())
    }

    async fn find_history_for_organization(
        &self,
        organization_id: OrganizationId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<Vec<MatchHistory>> {
        Ok(self
            .history
            .read()
            .iter()
            .filter(|h| {
                h.organization_id == organization_id && h.recorded_at >= from && h.recorded_at < to
            })
            .cloned()
            .collect())
    }

    async fn insert_experiment(&self, experiment: Experiment) -> EngineResult<Experiment> {
        let _guard = self.write_lock.lock().await;
        self.experiments.insert(experiment.id, experiment.clone());
        Ok(experiment)
    }

    async fn get_active_experiment(
        &self,
        organization_id: OrganizationId,
    ) -> EngineResult<Option<Experiment>> {
        Ok(self.experiments.iter().find_map(|entry| {
            (entry.organization_id == organization_id && entry.active).then(|| entry.value().clone())
        }))
    }

    async fn get_or_insert_assignment(
        &self,
        assignment: ExperimentAssignment,
    ) -> EngineResult<ExperimentAssignment> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.assignments.get(&assignment.shift_id) {
            return Ok(existing.value().clone());
        }
        self.assignments.insert(assignment.shift_id, assignment.clone());
        Ok(assignment)
    }

    async fn record_experiment_outcome(
        &self,
        shift_id: ShiftId,
        outcome: VariantOutcome,
    ) -> EngineResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut assignment = self
            .assignments
            .get_mut(&shift_id)
            .ok_or_else(|| EngineError::not_found("experiment assignment", shift_id))?;
        assignment.outcome = Some(outcome);
        Ok(())
    }

    async fn list_assignments(
        &self,
        experiment_id: ExperimentId,
    ) -> EngineResult<Vec<ExperimentAssignment>> {
        Ok(self
            .assignments
            .iter()
            .filter(|entry| entry.experiment_id == experiment_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn upsert_model_registration(
        &self,
        registration: ModelRegistration,
    ) -> EngineResult<ModelRegistration> {
        let _guard = self.write_lock.lock().await;
        self.models
            .insert(registration.organization_id, registration.clone());
        Ok(registration)
    }

    async fn get_model_registration(
        &self,
        organization_id: OrganizationId,
    ) -> EngineResult<Option<ModelRegistration>> {
        Ok(self.models.get(&organization_id).map(|entry| entry.value().clone()))
    }
}
