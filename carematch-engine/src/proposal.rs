//! Assignment proposal lifecycle

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::configuration::MatchingConfiguration;
use crate::error::{EngineError, EngineResult};
use crate::history::ConfigSnapshot;
use crate::ids::{CaregiverId, ProposalId, ShiftId};
use crate::scoring::{DimensionScores, MatchCandidate, MatchReason, QualityBand};

/// Version tag for the evaluation snapshot layout
pub const SNAPSHOT_VERSION: u32 = 1;

/// Lifecycle state of an assignment proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Created, not yet delivered
    Pending,
    /// Delivered to the caregiver
    Sent,
    /// Opened by the caregiver
    Viewed,
    /// Accepted; terminal
    Accepted,
    /// Rejected by the caregiver; terminal
    Rejected,
    /// TTL elapsed before a response; terminal
    Expired,
    /// A sibling proposal was accepted first; terminal
    Superseded,
    /// Withdrawn by an operator or a shift cancellation; terminal
    Withdrawn,
}

impl ProposalStatus {
    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Accepted
                | ProposalStatus::Rejected
                | ProposalStatus::Expired
                | ProposalStatus::Superseded
                | ProposalStatus::Withdrawn
        )
    }

    /// States from which accept or reject is legal
    pub fn is_respondable(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Pending | ProposalStatus::Sent | ProposalStatus::Viewed
        )
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Sent => "sent",
            ProposalStatus::Viewed => "viewed",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Expired => "expired",
            ProposalStatus::Superseded => "superseded",
            ProposalStatus::Withdrawn => "withdrawn",
        };
        write!(f, "{}", s)
    }
}

/// Why a caregiver turned a proposal down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCategory {
    Schedule,
    Distance,
    ClientFit,
    Pay,
    Personal,
    Other,
}

/// Immutable snapshot of the evaluation that created a proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSnapshot {
    /// Layout version tag
    pub version: u32,
    pub dimensions: DimensionScores,
    pub reasons: Vec<MatchReason>,
    /// Configuration in force when the evaluation ran
    pub config: ConfigSnapshot,
    pub computed_at: DateTime<Utc>,
}

impl EvaluationSnapshot {
    /// Capture the parts of a candidate evaluation that must survive
    pub fn from_candidate(candidate: &MatchCandidate, config: &MatchingConfiguration) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            dimensions: candidate.dimensions,
            reasons: candidate.reasons.clone(),
            config: ConfigSnapshot::capture(config),
            computed_at: candidate.computed_at,
        }
    }
}

/// A durable offer of one caregiver for one shift
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentProposal {
    pub id: ProposalId,
    pub shift_id: ShiftId,
    pub caregiver_id: CaregiverId,
    /// Overall score at evaluation time
    pub score: u8,
    pub quality: QualityBand,
    pub snapshot: EvaluationSnapshot,
    pub status: ProposalStatus,
    pub proposed_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    /// Set exactly when the proposal transitions to expired
    pub expired_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    /// Actor who accepted or rejected
    pub responded_by: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub rejection_category: Option<RejectionCategory>,
    pub version: u64,
}

impl AssignmentProposal {
    /// Create a pending proposal from a candidate evaluation
    ///
    /// The TTL comes from the configuration that produced the candidate.
    pub fn new(
        shift_id: ShiftId,
        candidate: &MatchCandidate,
        config: &MatchingConfiguration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ProposalId::new(),
            shift_id,
            caregiver_id: candidate.caregiver_id,
            score: candidate.overall_score,
            quality: candidate.quality,
            snapshot: EvaluationSnapshot::from_candidate(candidate, config),
            status: ProposalStatus::Pending,
            proposed_at: now,
            sent_at: None,
            viewed_at: None,
            responded_at: None,
            expired_at: None,
            expires_at: now + Duration::minutes(config.thresholds.proposal_ttl_minutes),
            responded_by: None,
            rejection_reason: None,
            rejection_category: None,
            version: 1,
        }
    }

    /// Mark delivered; idempotent, monotone
    pub fn mark_sent(&mut self, now: DateTime<Utc>) -> EngineResult<()> {
        match self.status {
            ProposalStatus::Pending => {
                self.status = ProposalStatus::Sent;
                self.sent_at = Some(now);
                Ok(())
            }
            // Already at or past sent: no-op
            ProposalStatus::Sent | ProposalStatus::Viewed => Ok(()),
            _ => Err(self.transition_error(ProposalStatus::Sent)),
        }
    }

    /// Mark opened; idempotent, monotone. Viewing implies delivery.
    pub fn mark_viewed(&mut self, now: DateTime<Utc>) -> EngineResult<()> {
        match self.status {
            ProposalStatus::Pending | ProposalStatus::Sent => {
                self.status = ProposalStatus::Viewed;
                self.sent_at.get_or_insert(now);
                self.viewed_at = Some(now);
                Ok(())
            }
            ProposalStatus::Viewed => Ok(()),
            _ => Err(self.transition_error(ProposalStatus::Viewed)),
        }
    }

    /// Accept the proposal
    pub fn accept(&mut self, actor: Uuid, now: DateTime<Utc>) -> EngineResult<()> {
        if !self.status.is_respondable() {
            return Err(self.transition_error(ProposalStatus::Accepted));
        }
        self.status = ProposalStatus::Accepted;
        self.responded_at = Some(now);
        self.responded_by = Some(actor);
        Ok(())
    }

    /// Reject the proposal, capturing the reason
    pub fn reject(
        &mut self,
        actor: Uuid,
        reason: Option<String>,
        category: Option<RejectionCategory>,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        if !self.status.is_respondable() {
            return Err(self.transition_error(ProposalStatus::Rejected));
        }
        self.status = ProposalStatus::Rejected;
        self.responded_at = Some(now);
        self.responded_by = Some(actor);
        self.rejection_reason = reason;
        self.rejection_category = category;
        Ok(())
    }

    /// Expire after the TTL elapsed without a response
    pub fn expire(&mut self, now: DateTime<Utc>) -> EngineResult<()> {
        if !self.status.is_respondable() {
            return Err(self.transition_error(ProposalStatus::Expired));
        }
        self.status = ProposalStatus::Expired;
        self.expired_at = Some(now);
        Ok(())
    }

    /// Supersede because a sibling was accepted
    pub fn supersede(&mut self, now: DateTime<Utc>) -> EngineResult<()> {
        if !self.status.is_respondable() {
            return Err(self.transition_error(ProposalStatus::Superseded));
        }
        self.status = ProposalStatus::Superseded;
        self.responded_at = Some(now);
        Ok(())
    }

    /// Withdraw manually or through a shift cancellation cascade
    pub fn withdraw(&mut self, now: DateTime<Utc>) -> EngineResult<()> {
        if !self.status.is_respondable() {
            return Err(self.transition_error(ProposalStatus::Withdrawn));
        }
        self.status = ProposalStatus::Withdrawn;
        self.responded_at = Some(now);
        Ok(())
    }

    fn transition_error(&self, to: ProposalStatus) -> EngineError {
        EngineError::invalid_transition("proposal", &self.status.to_string(), &to.to_string())
    }
}
