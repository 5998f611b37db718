//! Caregiver notification
//!
//! Best-effort fire-and-forget: the engine calls the trait and moves
//! on. Delivery guarantees, retry queues, and channel transports are
//! owned by the hosting platform's adapter.

use async_trait::async_trait;

use crate::caregiver::NotificationChannel;
use crate::ids::CaregiverId;
use crate::proposal::AssignmentProposal;
use crate::shift::OpenShift;

/// Outbound notification hooks
#[async_trait]
pub trait Notifier: Send + Sync {
    /// A proposal was created for a caregiver
    async fn proposal_created(
        &self,
        proposal: &AssignmentProposal,
        channels: &[NotificationChannel],
    );

    /// A shift was confirmed for a caregiver
    async fn assignment_confirmed(&self, shift: &OpenShift, caregiver_id: CaregiverId);
}

/// Default notifier: structured log lines only
#[derive(Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn proposal_created(
        &self,
        proposal: &AssignmentProposal,
        channels: &[NotificationChannel],
    ) {
        tracing::info!(
            proposal = %proposal.id,
            shift = %proposal.shift_id,
            caregiver = %proposal.caregiver_id,
            score = proposal.score,
            ?channels,
            "proposal created"
        );
    }

    async fn assignment_confirmed(&self, shift: &OpenShift, caregiver_id: CaregiverId) {
        tracing::info!(
            shift = %shift.id,
            caregiver = %caregiver_id,
            date = %shift.scheduled_date,
            "assignment confirmed"
        );
    }
}
