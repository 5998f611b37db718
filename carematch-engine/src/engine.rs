//! Engine facade
//!
//! Wires the store, evaluator, proposal manager, optimizer, and
//! blender together and exposes the command surface the API layer
//! calls. Every command runs under the configured deadline; permission
//! checks happen here so no transport can bypass them.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use carematch_config::CarematchConfig;

use crate::api::context::{permissions, UserContext};
use crate::bulk::{BulkMatchRequest, GeneticParameters};
use crate::caregiver::CaregiverPreferenceProfile;
use crate::configuration::{MatchingConfiguration, MatchingThresholds, OptimizationGoal};
use crate::error::{EngineError, EngineResult};
use crate::ids::{BulkMatchId, CaregiverId, ConfigId, OrganizationId, ProposalId, ShiftId};
use crate::kpi::{self, MatchingKpis};
use crate::manager::{ProposalManager, SelectOutcome};
use crate::matcher::{EligibleShift, MatchEvaluator, MatchOptions};
use crate::ml::{BlendSettings, InferenceClient, MlBlender};
use crate::notify::Notifier;
use crate::optimizer::BulkOptimizer;
use crate::proposal::{AssignmentProposal, RejectionCategory};
use crate::scoring::MatchCandidate;
use crate::shift::{MatchingStatus, OpenShift};
use crate::store::{Page, PageResult, ResponseCommit, ShiftFilter, Store};

/// Options for one match command
#[derive(Debug, Clone, Copy)]
pub struct MatchShiftOptions {
    pub max_candidates: usize,
    /// Write proposals for the top candidates after ranking
    pub auto_propose: bool,
    pub use_ml: bool,
    pub include_ineligible: bool,
}

impl Default for MatchShiftOptions {
    fn default() -> Self {
        Self {
            max_candidates: 10,
            auto_propose: true,
            use_ml: false,
            include_ineligible: true,
        }
    }
}

/// Result of one match command
#[derive(Debug, Clone)]
pub struct MatchRun {
    pub shift: OpenShift,
    pub candidates: Vec<MatchCandidate>,
    pub proposals: Vec<AssignmentProposal>,
}

/// Parameters for a bulk submission
#[derive(Debug, Clone)]
pub struct BulkSubmission {
    pub date_from: chrono::NaiveDate,
    pub date_to: chrono::NaiveDate,
    pub shift_ids: Vec<ShiftId>,
    pub goal: OptimizationGoal,
    pub genetic: Option<GeneticParameters>,
}

/// The assembled matching engine
pub struct Engine {
    store: Arc<dyn Store>,
    evaluator: Arc<MatchEvaluator>,
    manager: Arc<ProposalManager>,
    optimizer: Arc<BulkOptimizer>,
    defaults: MatchingThresholds,
    command_deadline: Duration,
    ml_enabled: bool,
}

impl Engine {
    /// Assemble the engine from its parts
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        inference: Option<Arc<dyn InferenceClient>>,
        config: &CarematchConfig,
    ) -> Self {
        let fan_out = config.engine.evaluator_fan_out.min(MatchEvaluator::default_fan_out());
        let mut evaluator = MatchEvaluator::new(Arc::clone(&store), fan_out);
        if let Some(client) = inference {
            let blender = MlBlender::new(client, BlendSettings::from_config(&config.ml));
            evaluator = evaluator.with_blender(Arc::new(blender));
        }
        let evaluator = Arc::new(evaluator);
        let manager = Arc::new(ProposalManager::new(Arc::clone(&store), notifier));
        let optimizer = Arc::new(BulkOptimizer::new(
            Arc::clone(&store),
            Arc::clone(&evaluator),
            Arc::clone(&manager),
        ));
        Self {
            store,
            evaluator,
            manager,
            optimizer,
            defaults: MatchingThresholds {
                auto_assign_threshold: config.engine.auto_assign_threshold,
                min_score_for_proposal: config.engine.min_score_for_proposal,
                max_proposals_per_shift: config.engine.max_proposals_per_shift,
                proposal_ttl_minutes: config.engine.proposal_expiration_minutes,
            },
            command_deadline: Duration::from_secs(config.engine.command_deadline_secs),
            ml_enabled: config.ml.enabled,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn manager(&self) -> &Arc<ProposalManager> {
        &self.manager
    }

    /// Resolve the effective configuration for an organization,
    /// falling back to process defaults when no row is stored
    pub async fn effective_configuration(
        &self,
        organization_id: OrganizationId,
        branch_id: Option<crate::ids::BranchId>,
    ) -> EngineResult<MatchingConfiguration> {
        if let Some(stored) = self
            .store
            .resolve_configuration(organization_id, branch_id)
            .await?
        {
            return Ok(stored);
        }
        let mut config = MatchingConfiguration::default_for(organization_id, Utc::now());
        config.thresholds = self.defaults.clone();
        Ok(config)
    }

    /// Register an open shift
    pub async fn create_shift(&self, ctx: &UserContext, shift: OpenShift) -> EngineResult<OpenShift> {
        ctx.require(permissions::SHIFTS_WRITE)?;
        ctx.require_same_organization(shift.organization_id)?;
        validate_shift(&shift)?;
        self.deadline(self.store.insert_shift(shift)).await
    }

    /// Read one shift with its proposals
    pub async fn get_shift(
        &self,
        ctx: &UserContext,
        shift_id: ShiftId,
    ) -> EngineResult<(OpenShift, Vec<AssignmentProposal>)> {
        let shift = self.deadline(self.store.get_shift(shift_id)).await?;
        ctx.require_same_organization(shift.organization_id)?;
        let proposals = self
            .deadline(self.store.find_proposals_for_shift(shift_id))
            .await?;
        Ok((shift, proposals))
    }

    /// List shifts; the caller's organization is always enforced
    pub async fn list_shifts(
        &self,
        ctx: &UserContext,
        mut filter: ShiftFilter,
        page: Page,
    ) -> EngineResult<PageResult<OpenShift>> {
        filter.organization_id = Some(ctx.organization_id);
        self.deadline(self.store.find_open_shifts(&filter, page))
            .await
    }

    /// Cancel a shift, cascading withdrawal to live proposals
    pub async fn cancel_shift(&self, ctx: &UserContext, shift_id: ShiftId) -> EngineResult<OpenShift> {
        ctx.require(permissions::SHIFTS_WRITE)?;
        let shift = self.store.get_shift(shift_id).await?;
        ctx.require_same_organization(shift.organization_id)?;
        self.deadline(self.manager.cancel_shift(shift_id)).await
    }

    /// Run the evaluator; optionally write proposals for the top ranks
    pub async fn match_shift(
        &self,
        ctx: &UserContext,
        shift_id: ShiftId,
        opts: MatchShiftOptions,
    ) -> EngineResult<MatchRun> {
        ctx.require(permissions::MATCHES_RUN)?;
        let shift = self.store.get_shift(shift_id).await?;
        ctx.require_same_organization(shift.organization_id)?;
        let config = self
            .effective_configuration(shift.organization_id, Some(shift.branch_id))
            .await?;

        let match_opts = MatchOptions {
            include_ineligible: opts.include_ineligible,
            use_ml: opts.use_ml && self.ml_enabled,
        };
        let candidates = self
            .deadline(self.evaluator.rank_shift(
                shift_id,
                &config,
                opts.max_candidates,
                match_opts,
            ))
            .await?;

        let (shift, proposals) = if opts.auto_propose {
            let outcome = self
                .deadline(self.manager.propose(shift_id, &candidates, &config))
                .await?;
            (outcome.shift, outcome.proposals)
        } else {
            let mut shift = self.store.get_shift(shift_id).await?;
            // A shift with live proposals keeps its status on a dry run
            if shift.status != MatchingStatus::Proposed {
                if candidates.iter().any(|c| c.is_eligible) {
                    shift.mark_matched()?;
                } else {
                    shift.mark_no_match()?;
                }
                shift.updated_at = Utc::now();
                shift = self.store.update_shift(shift).await?;
            }
            (shift, Vec::new())
        };

        Ok(MatchRun {
            shift,
            candidates,
            proposals,
        })
    }

    /// List proposals for one shift
    pub async fn list_proposals(
        &self,
        ctx: &UserContext,
        shift_id: ShiftId,
    ) -> EngineResult<Vec<AssignmentProposal>> {
        let shift = self.store.get_shift(shift_id).await?;
        ctx.require_same_organization(shift.organization_id)?;
        self.deadline(self.store.find_proposals_for_shift(shift_id))
            .await
    }

    /// Operator-created proposal
    pub async fn create_manual_proposal(
        &self,
        ctx: &UserContext,
        shift_id: ShiftId,
        caregiver_id: CaregiverId,
    ) -> EngineResult<AssignmentProposal> {
        ctx.require(permissions::SHIFTS_WRITE)?;
        let shift = self.store.get_shift(shift_id).await?;
        ctx.require_same_organization(shift.organization_id)?;
        let config = self
            .effective_configuration(shift.organization_id, Some(shift.branch_id))
            .await?;
        self.deadline(self.manager.propose_manual(shift_id, caregiver_id, &config))
            .await
    }

    /// Commit a caregiver response
    pub async fn respond(
        &self,
        ctx: &UserContext,
        proposal_id: ProposalId,
        expected_version: u64,
        accept: bool,
        reason: Option<String>,
        category: Option<RejectionCategory>,
    ) -> EngineResult<ResponseCommit> {
        ctx.require(permissions::PROPOSALS_RESPOND)?;
        self.deadline(self.manager.respond(
            proposal_id,
            expected_version,
            accept,
            ctx.user_id,
            reason,
            category,
        ))
        .await
    }

    /// Idempotent view acknowledgement
    pub async fn view_proposal(
        &self,
        ctx: &UserContext,
        proposal_id: ProposalId,
    ) -> EngineResult<AssignmentProposal> {
        ctx.require(permissions::PROPOSALS_RESPOND)?;
        self.deadline(self.manager.mark_viewed(proposal_id)).await
    }

    /// Shifts a caregiver may self-select
    pub async fn eligible_shifts(
        &self,
        ctx: &UserContext,
        caregiver_id: CaregiverId,
        min_score: Option<u8>,
    ) -> EngineResult<Vec<EligibleShift>> {
        let caregiver = self.store.get_caregiver(caregiver_id).await?;
        ctx.require_same_organization(caregiver.organization_id)?;
        let config = self
            .effective_configuration(caregiver.organization_id, None)
            .await?;
        let floor = min_score.unwrap_or(config.thresholds.min_score_for_proposal);
        self.deadline(
            self.evaluator
                .eligible_shifts_for_caregiver(caregiver_id, &config, floor),
        )
        .await
    }

    /// Caregiver self-selects a shift
    pub async fn select_shift(
        &self,
        ctx: &UserContext,
        caregiver_id: CaregiverId,
        shift_id: ShiftId,
    ) -> EngineResult<SelectOutcome> {
        ctx.require(permissions::PROPOSALS_RESPOND)?;
        let shift = self.store.get_shift(shift_id).await?;
        ctx.require_same_organization(shift.organization_id)?;
        let config = self
            .effective_configuration(shift.organization_id, Some(shift.branch_id))
            .await?;
        self.deadline(
            self.manager
                .caregiver_select_shift(caregiver_id, shift_id, &config),
        )
        .await
    }

    /// Submit a bulk optimization job; runs in the background
    pub async fn submit_bulk(
        &self,
        ctx: &UserContext,
        submission: BulkSubmission,
    ) -> EngineResult<BulkMatchRequest> {
        ctx.require(permissions::BULK_RUN)?;
        if submission.date_to < submission.date_from {
            return Err(EngineError::Validation(format!(
                "bulk window ends {} before it starts {}",
                submission.date_to, submission.date_from
            )));
        }
        let mut request = BulkMatchRequest::new(
            ctx.organization_id,
            submission.date_from,
            submission.date_to,
            submission.goal,
            Utc::now(),
        );
        request.shift_ids = submission.shift_ids;
        request.genetic = submission.genetic;
        let request = self.store.insert_bulk_request(request).await?;

        let config = self
            .effective_configuration(ctx.organization_id, None)
            .await?;
        let optimizer = Arc::clone(&self.optimizer);
        let job = request.clone();
        tokio::spawn(async move {
            let job_id = job.id;
            if let Err(e) = optimizer.run(job, &config).await {
                tracing::error!(job = %job_id, error = %e, "bulk job failed");
            }
        });

        Ok(request)
    }

    /// Poll a bulk job
    pub async fn get_bulk(
        &self,
        ctx: &UserContext,
        id: BulkMatchId,
    ) -> EngineResult<BulkMatchRequest> {
        let request = self.deadline(self.store.get_bulk_request(id)).await?;
        ctx.require_same_organization(request.organization_id)?;
        Ok(request)
    }

    /// Read a caregiver's preference profile
    pub async fn get_preferences(
        &self,
        ctx: &UserContext,
        caregiver_id: CaregiverId,
    ) -> EngineResult<CaregiverPreferenceProfile> {
        let caregiver = self.store.get_caregiver(caregiver_id).await?;
        ctx.require_same_organization(caregiver.organization_id)?;
        let profile = self
            .deadline(self.store.get_preferences(caregiver_id))
            .await?;
        Ok(profile.unwrap_or_else(|| CaregiverPreferenceProfile::empty(caregiver_id, Utc::now())))
    }

    /// Upsert a caregiver's preference profile
    pub async fn put_preferences(
        &self,
        ctx: &UserContext,
        profile: CaregiverPreferenceProfile,
    ) -> EngineResult<CaregiverPreferenceProfile> {
        ctx.require(permissions::PREFERENCES_WRITE)?;
        let caregiver = self.store.get_caregiver(profile.caregiver_id).await?;
        ctx.require_same_organization(caregiver.organization_id)?;
        self.deadline(self.store.upsert_preferences(profile)).await
    }

    /// Read a matching configuration
    pub async fn get_configuration(
        &self,
        ctx: &UserContext,
        id: ConfigId,
    ) -> EngineResult<MatchingConfiguration> {
        let config = self.deadline(self.store.get_configuration(id)).await?;
        ctx.require_same_organization(config.organization_id)?;
        Ok(config)
    }

    /// Create or update a matching configuration
    pub async fn put_configuration(
        &self,
        ctx: &UserContext,
        config: MatchingConfiguration,
    ) -> EngineResult<MatchingConfiguration> {
        ctx.require(permissions::CONFIG_WRITE)?;
        ctx.require_same_organization(config.organization_id)?;
        config.validate()?;
        let exists = self.store.get_configuration(config.id).await.is_ok();
        if exists {
            self.deadline(self.store.update_configuration(config)).await
        } else {
            self.deadline(self.store.insert_configuration(config)).await
        }
    }

    /// Aggregate matching KPIs for the caller's organization
    pub async fn matching_kpis(
        &self,
        ctx: &UserContext,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<MatchingKpis> {
        ctx.require(permissions::METRICS_READ)?;
        self.deadline(kpi::compute(
            self.store.as_ref(),
            ctx.organization_id,
            from,
            to,
        ))
        .await
    }

    /// Apply the command deadline to a future
    ///
    /// Cancellation discards partial work at await points; the store's
    /// transactional operations apply their effects without suspending,
    /// so a commit either happens entirely or not at all.
    async fn deadline<T>(
        &self,
        fut: impl Future<Output = EngineResult<T>>,
    ) -> EngineResult<T> {
        match tokio::time::timeout(self.command_deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Transient(format!(
                "command deadline of {:?} exceeded",
                self.command_deadline
            ))),
        }
    }
}

fn validate_shift(shift: &OpenShift) -> EngineResult<()> {
    if shift.duration_minutes == 0 {
        return Err(EngineError::Validation(
            "shift duration cannot be zero".to_string(),
        ));
    }
    if shift.service_type.trim().is_empty() {
        return Err(EngineError::Validation(
            "service type cannot be empty".to_string(),
        ));
    }
    if shift
        .blocked_caregivers
        .iter()
        .any(|c| shift.preferred_caregivers.contains(c))
    {
        return Err(EngineError::Validation(
            "a caregiver cannot be both preferred and blocked".to_string(),
        ));
    }
    if let Some(fill_by) = shift.fill_by {
        if fill_by <= shift.created_at {
            return Err(EngineError::Validation(
                "fill-by deadline is already in the past".to_string(),
            ));
        }
    }
    Ok(())
}
