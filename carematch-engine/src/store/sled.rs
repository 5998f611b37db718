//! Sled-backed store
//!
//! One tree per entity with serde_json values, in the manner of the
//! platform's other state stores. A single async mutex serializes all
//! writes; the multi-row operations additionally commit through a sled
//! transaction so a crash cannot leave a partial accept or sweep.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sled::transaction::ConflictableTransactionError;
use sled::{Transactional, Tree};
use std::path::Path;

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

/// Sled-backed durable store
pub struct SledStore {
    shifts: Tree,
    caregivers: Tree,
    proposals: Tree,
    configurations: Tree,
    preferences: Tree,
    bulk_requests: Tree,
    history: Tree,
    visits: Tree,
    ratings: Tree,
    client_visits: Tree,
    experiments: Tree,
    assignments: Tree,
    models: Tree,
    db: sled::Db,
    write_lock: tokio::sync::Mutex<()>,
}

fn map_sled(e: sled::Error) -> EngineError {
    EngineError::Transient(format!("sled error: {}", e))
}

fn to_json<T: serde::Serialize>(value: &T) -> EngineResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| EngineError::Fatal(format!("serialization error: {}", e)))
}

fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> EngineResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| EngineError::Fatal(format!("deserialization error: {}", e)))
}

/// Retry a sled operation on I/O failures with bounded backoff
async fn retry_io<T, F>(op_name: &'static str, mut op: F) -> EngineResult<T>
where
    F: FnMut() -> Result<T, sled::Error>,
{
    let mut delay = std::time::Duration::from_millis(100);
    let mut attempt = 1u32;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < 3 && matches!(e, sled::Error::Io(_)) => {
                tracing::warn!(op = op_name, attempt, error = %e, "sled I/O failure, retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(std::time::Duration::from_secs(1));
                attempt += 1;
            }
            Err(e) => return Err(map_sled(e)),
        }
    }
}

impl SledStore {
    /// Open or create the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let db = sled::open(path).map_err(map_sled)?;
        let tree = |name: &str| db.open_tree(name).map_err(map_sled);
        Ok(Self {
            shifts: tree("shifts")?,
            caregivers: tree("caregivers")?,
            proposals: tree("proposals")?,
            configurations: tree("configurations")?,
            preferences: tree("preferences")?,
            bulk_requests: tree("bulk_requests")?,
            history: tree("history")?,
            visits: tree("visits")?,
            ratings: tree("ratings")?,
            client_visits: tree("client_visits")?,
            experiments: tree("experiments")?,
            assignments: tree("assignments")?,
            models: tree("models")?,
            db,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn load<T: serde::de::DeserializeOwned>(
        &self,
        tree: &Tree,
        key: String,
    ) -> EngineResult<Option<T>> {
        let bytes = retry_io("get", || tree.get(key.as_bytes())).await?;
        bytes.map(|b| from_json(&b)).transpose()
    }

    async fn save<T: serde::Serialize>(
        &self,
        tree: &Tree,
        key: String,
        value: &T,
    ) -> EngineResult<()> {
        let bytes = to_json(value)?;
        retry_io("insert", || tree.insert(key.as_bytes(), bytes.clone())).await?;
        Ok(())
    }

    async fn scan<T: serde::de::DeserializeOwned>(&self, tree: &Tree) -> EngineResult<Vec<T>> {
        let raw: Vec<sled::IVec> = retry_io("scan", || {
            tree.iter()
                .map(|r| r.map(|(_, v)| v))
                .collect::<Result<Vec<_>, _>>()
        })
        .await?;
        raw.iter().map(|b| from_json(b)).collect()
    }

    /// History key layout: `{YYYYMM}:{seq:020}` partitions rows by month
    fn history_key(&self, row: &MatchHistory) -> EngineResult<String> {
        let seq = self.db.generate_id().map_err(map_sled)?;
        Ok(format!(
            "{}:{:020}",
            row.recorded_at.format("%Y%m"),
            seq
        ))
    }

    async fn all_proposals(&self) -> EngineResult<Vec<AssignmentProposal>> {
        self.scan(&self.proposals).await
    }

    async fn proposals_for_shift(&self, shift_id: ShiftId) -> EngineResult<Vec<AssignmentProposal>> {
        let mut proposals = self.all_proposals().await?;
        proposals.retain(|p| p.shift_id == shift_id);
        proposals.sort_by_key(|p| (p.proposed_at, p.id));
        Ok(proposals)
    }

    async fn history_rows(&self) -> EngineResult<Vec<MatchHistory>> {
        self.scan(&self.history).await
    }

    fn next_attempt(rows: &[MatchHistory], shift_id: ShiftId, caregiver_id: CaregiverId) -> u32 {
        rows.iter()
            .filter(|h| h.shift_id == shift_id && h.caregiver_id == caregiver_id)
            .count() as u32
            + 1
    }

    fn transition_history_row(
        rows: &[MatchHistory],
        proposal: &AssignmentProposal,
        shift: &OpenShift,
        outcome: MatchOutcome,
        now: DateTime<Utc>,
    ) -> MatchHistory {
        let row = MatchHistory::record(
            shift.organization_id,
            proposal.shift_id,
            proposal.caregiver_id,
            Self::next_attempt(rows, proposal.shift_id, proposal.caregiver_id),
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

    /// Commit precomputed writes atomically across the three hot trees
    async fn commit_multi(
        &self,
        shift_writes: Vec<(String, Vec<u8>)>,
        proposal_writes: Vec<(String, Vec<u8>)>,
        history_writes: Vec<(String, Vec<u8>)>,
    ) -> EngineResult<()> {
        (&self.shifts, &self.proposals, &self.history)
            .transaction(|(shifts, proposals, history)| {
                for (key, value) in &shift_writes {
                    shifts.insert(key.as_bytes(), value.clone())?;
                }
                for (key, value) in &proposal_writes {
                    proposals.insert(key.as_bytes(), value.clone())?;
                }
                for (key, value) in &history_writes {
                    history.insert(key.as_bytes(), value.clone())?;
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e| EngineError::Transient(format!("sled transaction failed: {:?}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl Store for SledStore {
    async fn insert_shift(&self, shift: OpenShift) -> EngineResult<OpenShift> {
        let _guard = self.write_lock.lock().await;
        if self
            .load::<OpenShift>(&self.shifts, shift.id.to_string())
            .await?
            .is_some()
        {
            return Err(EngineError::Conflict(format!(
                "shift {} already exists",
                shift.id
            )));
        }
        self.save(&self.shifts, shift.id.to_string(), &shift).await?;
        Ok(shift)
    }

    async fn get_shift(&self, id: ShiftId) -> EngineResult<OpenShift> {
        self.load(&self.shifts, id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found("shift", id))
    }

    async fn update_shift(&self, mut shift: OpenShift) -> EngineResult<OpenShift> {
        let _guard = self.write_lock.lock().await;
        let stored: OpenShift = self
            .load(&self.shifts, shift.id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found("shift", shift.id))?;
        if stored.version != shift.version {
            return Err(EngineError::stale_version("shift", shift.version, stored.version));
        }
        shift.version += 1;
        self.save(&self.shifts, shift.id.to_string(), &shift).await?;
        Ok(shift)
    }

    async fn find_open_shifts(
        &self,
        filter: &ShiftFilter,
        page: Page,
    ) -> EngineResult<PageResult<OpenShift>> {
        let mut matching: Vec<OpenShift> = self
            .scan::<OpenShift>(&self.shifts)
            .await?
            .into_iter()
            .filter(|s| filter.matches(s))
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
        self.save(&self.caregivers, caregiver.id.to_string(), &caregiver)
            .await?;
        Ok(caregiver)
    }

    async fn get_caregiver(&self, id: CaregiverId) -> EngineResult<Caregiver> {
        self.load(&self.caregivers, id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found("caregiver", id))
    }

    async fn find_candidates_for_shift(&self, shift: &OpenShift) -> EngineResult<Vec<Caregiver>> {
        let mut candidates: Vec<Caregiver> = self
            .scan::<Caregiver>(&self.caregivers)
            .await?
            .into_iter()
            .filter(|c| {
                c.organization_id == shift.organization_id
                    && c.employment_status == EmploymentStatus::Active
                    && c.branch_ids.contains(&shift.branch_id)
            })
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
        let visits: Vec<VisitWindow> = self
            .load(&self.visits, caregiver_id.to_string())
            .await?
            .unwrap_or_default();
        let client_rating: Option<f64> = self
            .load(
                &self.ratings,
                format!("{}:{}", caregiver_id, shift.client_id),
            )
            .await?;
        let client_total_visits: u32 = self
            .load(&self.client_visits, shift.client_id.to_string())
            .await?
            .unwrap_or(0);
        let since = now - Duration::days(RECENT_WINDOW_DAYS);
        let recent_history: Vec<MatchHistory> = self
            .history_rows()
            .await?
            .into_iter()
            .filter(|h| h.caregiver_id == caregiver_id && h.recorded_at >= since)
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
        let mut visits: Vec<VisitWindow> = self
            .load(&self.visits, caregiver_id.to_string())
            .await?
            .unwrap_or_default();
        let client_id = visit.client_id;
        visits.push(visit);
        self.save(&self.visits, caregiver_id.to_string(), &visits)
            .await?;

        let count: u32 = self
            .load(&self.client_visits, client_id.to_string())
            .await?
            .unwrap_or(0);
        self.save(&self.client_visits, client_id.to_string(), &(count + 1))
            .await?;
        Ok(())
    }

    async fn record_client_rating(
        &self,
        caregiver_id: CaregiverId,
        client_id: ClientId,
        rating: f64,
    ) -> EngineResult<()> {
        let _guard = self.write_lock.lock().await;
        self.save(
            &self.ratings,
            format!("{}:{}", caregiver_id, client_id),
            &rating,
        )
        .await
    }

    async fn get_proposal(&self, id: ProposalId) -> EngineResult<AssignmentProposal> {
        self.load(&self.proposals, id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found("proposal", id))
    }

    async fn update_proposal(
        &self,
        mut proposal: AssignmentProposal,
    ) -> EngineResult<AssignmentProposal> {
        let _guard = self.write_lock.lock().await;
        let stored: AssignmentProposal = self
            .load(&self.proposals, proposal.id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found("proposal", proposal.id))?;
        if stored.version != proposal.version {
            return Err(EngineError::stale_version(
                "proposal",
                proposal.version,
                stored.version,
            ));
        }
        proposal.version += 1;
        self.save(&self.proposals, proposal.id.to_string(), &proposal)
            .await?;
        Ok(proposal)
    }

    async fn find_proposals_for_shift(
        &self,
        shift_id: ShiftId,
    ) -> EngineResult<Vec<AssignmentProposal>> {
        self.proposals_for_shift(shift_id).await
    }

    async fn find_nonterminal_proposals(
        &self,
        shift_id: ShiftId,
    ) -> EngineResult<Vec<AssignmentProposal>> {
        let mut proposals = self.proposals_for_shift(shift_id).await?;
        proposals.retain(|p| p.status.is_respondable());
        Ok(proposals)
    }

    async fn find_proposals_for_caregiver(
        &self,
        caregiver_id: CaregiverId,
    ) -> EngineResult<Vec<AssignmentProposal>> {
        let mut proposals = self.all_proposals().await?;
        proposals.retain(|p| p.caregiver_id == caregiver_id);
        proposals.sort_by_key(|p| (p.proposed_at, p.id));
        Ok(proposals)
    }

    async fn find_expired_proposals(
        &self,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<AssignmentProposal>> {
        let mut proposals = self.all_proposals().await?;
        proposals.retain(|p| p.status.is_respondable() && p.expires_at <= now);
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
        let stored: OpenShift = self
            .load(&self.shifts, shift.id.to_string())
            .await?
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
        let existing = self.proposals_for_shift(shift.id).await?;
        for proposal in &proposals {
            let duplicate = existing
                .iter()
                .any(|p| p.caregiver_id == proposal.caregiver_id && p.status.is_respondable());
            if duplicate {
                return Err(EngineError::Conflict(format!(
                    "caregiver {} already has a live proposal for shift {}",
                    proposal.caregiver_id, shift.id
                )));
            }
        }

        shift.version += 1;
        let shift_writes = vec![(shift.id.to_string(), to_json(&shift)?)];
        let mut proposal_writes = Vec::with_capacity(proposals.len());
        for proposal in &proposals {
            proposal_writes.push((proposal.id.to_string(), to_json(proposal)?));
        }
        let mut history_writes = Vec::with_capacity(history.len());
        for row in &history {
            history_writes.push((self.history_key(row)?, to_json(row)?));
        }
        self.commit_multi(shift_writes, proposal_writes, history_writes)
            .await?;
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
        let mut proposal: AssignmentProposal = self
            .load(&self.proposals, proposal_id.to_string())
            .await?
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
        let mut shift: OpenShift = self
            .load(&self.shifts, proposal.shift_id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found("shift", proposal.shift_id))?;

        let all_rows = self.history_rows().await?;
        let siblings = self
            .proposals_for_shift(shift.id)
            .await?
            .into_iter()
            .filter(|p| p.id != proposal_id && p.status.is_respondable())
            .collect::<Vec<_>>();

        let mut history_rows = Vec::new();
        let mut superseded = Vec::new();

        match response {
            ProposalResponse::Accept { actor } => {
                if shift.status == MatchingStatus::Assigned {
                    shift.needs_operator_review = true;
                    shift.version += 1;
                    self.save(&self.shifts, shift.id.to_string(), &shift).await?;
                    return Err(EngineError::Fatal(format!(
                        "shift {} already assigned but proposal {} was still live",
                        shift.id, proposal_id
                    )));
                }
                proposal.accept(actor, now)?;
                proposal.version += 1;
                history_rows.push(Self::transition_history_row(
                    &all_rows,
                    &proposal,
                    &shift,
                    MatchOutcome::Accepted,
                    now,
                ));
                for mut sibling in siblings {
                    sibling.supersede(now)?;
                    sibling.version += 1;
                    history_rows.push(Self::transition_history_row(
                        &all_rows,
                        &sibling,
                        &shift,
                        MatchOutcome::Superseded,
                        now,
                    ));
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
                history_rows.push(Self::transition_history_row(
                    &all_rows,
                    &proposal,
                    &shift,
                    MatchOutcome::Rejected,
                    now,
                ));
                if siblings.is_empty() && shift.status == MatchingStatus::Proposed {
                    shift.reopen_for_matching()?;
                }
            }
        }

        shift.updated_at = now;
        shift.version += 1;

        let shift_writes = vec![(shift.id.to_string(), to_json(&shift)?)];
        let mut proposal_writes = vec![(proposal.id.to_string(), to_json(&proposal)?)];
        for sibling in &superseded {
            proposal_writes.push((sibling.id.to_string(), to_json(sibling)?));
        }
        let mut history_writes = Vec::with_capacity(history_rows.len());
        for row in &history_rows {
            history_writes.push((self.history_key(row)?, to_json(row)?));
        }
        self.commit_multi(shift_writes, proposal_writes, history_writes)
            .await?;

        Ok(ResponseCommit {
            proposal,
            superseded,
            shift,
        })
    }

    async fn expire_proposals(&self, now: DateTime<Utc>) -> EngineResult<ExpireSweep> {
        let _guard = self.write_lock.lock().await;
        let due: Vec<AssignmentProposal> = self
            .all_proposals()
            .await?
            .into_iter()
            .filter(|p| p.status.is_respondable() && p.expires_at <= now)
            .collect();
        let all_rows = self.history_rows().await?;

        let mut sweep = ExpireSweep::default();
        let mut history_rows = Vec::new();
        let mut proposal_writes = Vec::new();
        let mut shift_writes = Vec::new();
        let mut touched_shifts = std::collections::BTreeSet::new();

        for mut proposal in due {
            let Some(shift) = self
                .load::<OpenShift>(&self.shifts, proposal.shift_id.to_string())
                .await?
            else {
                tracing::warn!(proposal = %proposal.id, shift = %proposal.shift_id, "expired proposal references a missing shift");
                continue;
            };
            proposal.expire(now)?;
            proposal.version += 1;
            history_rows.push(Self::transition_history_row(
                &all_rows,
                &proposal,
                &shift,
                MatchOutcome::Expired,
                now,
            ));
            proposal_writes.push((proposal.id.to_string(), to_json(&proposal)?));
            touched_shifts.insert(proposal.shift_id);
            sweep.expired.push(proposal);
        }

        let expired_ids: std::collections::BTreeSet<ProposalId> =
            sweep.expired.iter().map(|p| p.id).collect();
        for shift_id in touched_shifts {
            let live_remaining = self
                .proposals_for_shift(shift_id)
                .await?
                .iter()
                .any(|p| p.status.is_respondable() && !expired_ids.contains(&p.id));
            if live_remaining {
                continue;
            }
            if let Some(mut shift) = self
                .load::<OpenShift>(&self.shifts, shift_id.to_string())
                .await?
            {
                if shift.status == MatchingStatus::Proposed {
                    shift.reopen_for_matching()?;
                    shift.updated_at = now;
                    shift.version += 1;
                    shift_writes.push((shift_id.to_string(), to_json(&shift)?));
                    sweep.reopened_shifts.push(shift_id);
                }
            }
        }

        let mut history_writes = Vec::with_capacity(history_rows.len());
        for row in &history_rows {
            history_writes.push((self.history_key(row)?, to_json(row)?));
        }
        self.commit_multi(shift_writes, proposal_writes, history_writes)
            .await?;
        Ok(sweep)
    }

    async fn insert_configuration(
        &self,
        config: MatchingConfiguration,
    ) -> EngineResult<MatchingConfiguration> {
        let _guard = self.write_lock.lock().await;
        self.save(&self.configurations, config.id.to_string(), &config)
            .await?;
        Ok(config)
    }

    async fn update_configuration(
        &self,
        mut config: MatchingConfiguration,
    ) -> EngineResult<MatchingConfiguration> {
        let _guard = self.write_lock.lock().await;
        let stored: MatchingConfiguration = self
            .load(&self.configurations, config.id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found("configuration", config.id))?;
        if stored.version != config.version {
            return Err(EngineError::stale_version(
                "configuration",
                config.version,
                stored.version,
            ));
        }
        config.version += 1;
        self.save(&self.configurations, config.id.to_string(), &config)
            .await?;
        Ok(config)
    }

    async fn get_configuration(&self, id: ConfigId) -> EngineResult<MatchingConfiguration> {
        self.load(&self.configurations, id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found("configuration", id))
    }

    async fn resolve_configuration(
        &self,
        organization_id: OrganizationId,
        branch_id: Option<BranchId>,
    ) -> EngineResult<Option<MatchingConfiguration>> {
        let configs = self.scan::<MatchingConfiguration>(&self.configurations).await?;
        if let Some(branch) = branch_id {
            if let Some(config) = configs
                .iter()
                .find(|c| c.organization_id == organization_id && c.branch_id == Some(branch))
            {
                return Ok(Some(config.clone()));
            }
        }
        Ok(configs
            .into_iter()
            .find(|c| c.organization_id == organization_id && c.branch_id.is_none()))
    }

    async fn upsert_preferences(
        &self,
        mut profile: CaregiverPreferenceProfile,
    ) -> EngineResult<CaregiverPreferenceProfile> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self
            .load::<CaregiverPreferenceProfile>(&self.preferences, profile.caregiver_id.to_string())
            .await?
        {
            profile.version = existing.version + 1;
        }
        self.save(&self.preferences, profile.caregiver_id.to_string(), &profile)
            .await?;
        Ok(profile)
    }

    async fn get_preferences(
        &self,
        caregiver_id: CaregiverId,
    ) -> EngineResult<Option<CaregiverPreferenceProfile>> {
        self.load(&self.preferences, caregiver_id.to_string()).await
    }

    async fn insert_bulk_request(
        &self,
        request: BulkMatchRequest,
    ) -> EngineResult<BulkMatchRequest> {
        let _guard = self.write_lock.lock().await;
        self.save(&self.bulk_requests, request.id.to_string(), &request)
            .await?;
        Ok(request)
    }

    async fn update_bulk_request(
        &self,
        mut request: BulkMatchRequest,
    ) -> EngineResult<BulkMatchRequest> {
        let _guard = self.write_lock.lock().await;
        let stored: BulkMatchRequest = self
            .load(&self.bulk_requests, request.id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found("bulk request", request.id))?;
        if stored.version != request.version {
            return Err(EngineError::stale_version(
                "bulk request",
                request.version,
                stored.version,
            ));
        }
        request.version += 1;
        self.save(&self.bulk_requests, request.id.to_string(), &request)
            .await?;
        Ok(request)
    }

    async fn get_bulk_request(&self, id: BulkMatchId) -> EngineResult<BulkMatchRequest> {
        self.load(&self.bulk_requests, id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found("bulk request", id))
    }

    async fn append_history(&self, rows: Vec<MatchHistory>) -> EngineResult<()> {
        let _guard = self.write_lock.lock().await;
        for row in &rows {
            let key = self.history_key(row)?;
            self.save(&self.history, key, row).await?;
        }
        Ok(())
    }

    async fn find_history_for_shift(&self, shift_id: ShiftId) -> EngineResult<Vec<MatchHistory>> {
        let mut rows = self.history_rows().await?;
        rows.retain(|h| h.shift_id == shift_id);
        Ok(rows)
    }

    async fn find_history_for_organization(
        &self,
        organization_id: OrganizationId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<Vec<MatchHistory>> {
        let mut rows = self.history_rows().await?;
        rows.retain(|h| {
            h.organization_id == organization_id && h.recorded_at >= from && h.recorded_at < to
        });
        Ok(rows)
    }

    async fn insert_experiment(&self, experiment: Experiment) -> EngineResult<Experiment> {
        let _guard = self.write_lock.lock().await;
        self.save(&self.experiments, experiment.id.to_string(), &experiment)
            .await?;
        Ok(experiment)
    }

    async fn get_active_experiment(
        &self,
        organization_id: OrganizationId,
    ) -> EngineResult<Option<Experiment>> {
        let experiments = self.scan::<Experiment>(&self.experiments).await?;
        Ok(experiments
            .into_iter()
            .find(|e| e.organization_id == organization_id && e.active))
    }

    async fn get_or_insert_assignment(
        &self,
        assignment: ExperimentAssignment,
    ) -> EngineResult<ExperimentAssignment> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self
            .load::<ExperimentAssignment>(&self.assignments, assignment.shift_id.to_string())
            .await?
        {
            return Ok(existing);
        }
        self.save(&self.assignments, assignment.shift_id.to_string(), &assignment)
            .await?;
        Ok(assignment)
    }

    async fn record_experiment_outcome(
        &self,
        shift_id: ShiftId,
        outcome: VariantOutcome,
    ) -> EngineResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut assignment: ExperimentAssignment = self
            .load(&self.assignments, shift_id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found("experiment assignment", shift_id))?;
        assignment.outcome = Some(outcome);
        self.save(&self.assignments, shift_id.to_string(), &assignment)
            .await
    }

    async fn list_assignments(
        &self,
        experiment_id: ExperimentId,
    ) -> EngineResult<Vec<ExperimentAssignment>> {
        let assignments = self.scan::<ExperimentAssignment>(&self.assignments).await?;
        Ok(assignments
            .into_iter()
            .filter(|a| a.experiment_id == experiment_id)
            .collect())
    }

    async fn upsert_model_registration(
        &self,
        registration: ModelRegistration,
    ) -> EngineResult<ModelRegistration> {
        let _guard = self.write_lock.lock().await;
        self.save(
            &self.models,
            registration.organization_id.to_string(),
            &registration,
        )
        .await?;
        Ok(registration)
    }

    async fn get_model_registration(
        &self,
        organization_id: OrganizationId,
    ) -> EngineResult<Option<ModelRegistration>> {
        self.load(&self.models, organization_id.to_string()).await
    }
}
