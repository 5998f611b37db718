//! Matching and assignment engine for home-care scheduling
//!
//! This crate provides the scheduling core of the carematch platform:
//! - Scores caregivers against open shifts with a pure, deterministic kernel
//! - Issues time-bounded assignment proposals and tracks responses
//! - Commits the first accepted proposal atomically, superseding siblings
//! - Runs bulk optimization across a date range (greedy or genetic)
//! - Optionally blends the rule-based score with a learned model
//! - Sweeps expired proposals in a cooperative background task

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod api;
pub mod bulk;
pub mod caregiver;
pub mod configuration;
pub mod engine;
pub mod error;
pub mod history;
pub mod ids;
pub mod kpi;
pub mod manager;
pub mod matcher;
pub mod ml;
pub mod notify;
pub mod optimizer;
pub mod proposal;
pub mod scoring;
pub mod shift;
pub mod store;
pub mod sweeper;

pub use caregiver::{Caregiver, CaregiverContext, CaregiverPreferenceProfile};
pub use configuration::MatchingConfiguration;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use ids::{BranchId, BulkMatchId, CaregiverId, ClientId, ConfigId, OrganizationId, ProposalId, ShiftId};
pub use manager::ProposalManager;
pub use matcher::MatchEvaluator;
pub use proposal::{AssignmentProposal, ProposalStatus};
pub use scoring::{MatchCandidate, QualityBand};
pub use shift::{MatchingStatus, OpenShift};
pub use store::Store;
