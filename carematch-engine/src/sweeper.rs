//! Background expiry sweep
//!
//! A cooperative periodic task that expires stale proposals and
//! overdue shifts. Shutdown stops new ticks, lets the in-flight sweep
//! drain, and joins the task.

use chrono::Utc;
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::manager::ProposalManager;

/// Handle to a running sweeper
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop ticking, drain the in-flight sweep, and join
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "sweeper task panicked during shutdown");
        }
    }
}

/// Periodic expiry sweep
pub struct Sweeper;

impl Sweeper {
    /// Spawn the sweep loop on the current runtime
    pub fn spawn(manager: Arc<ProposalManager>, interval: Duration) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(interval_secs = interval.as_secs(), "sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::sweep_once(&manager).await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("sweeper stopped");
        });
        SweeperHandle {
            shutdown: shutdown_tx,
            handle,
        }
    }

    async fn sweep_once(manager: &ProposalManager) {
        let started = std::time::Instant::now();
        let now = Utc::now();
        counter!("carematch_sweeps_total").increment(1);

        match manager.expire_stale(now).await {
            Ok(sweep) => {
                tracing::debug!(
                    expired = sweep.expired.len(),
                    reopened = sweep.reopened_shifts.len(),
                    "proposal sweep finished"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "proposal sweep failed");
            }
        }
        match manager.expire_overdue_shifts(now).await {
            Ok(expired) => {
                if !expired.is_empty() {
                    tracing::info!(count = expired.len(), "expired overdue shifts");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "overdue shift sweep failed");
            }
        }

        histogram!("carematch_sweep_duration_seconds").record(started.elapsed().as_secs_f64());
    }
}
