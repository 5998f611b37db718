//! Service layer
//!
//! Business-logic wrappers over the engine; each transport adapter
//! delegates here so behavior stays identical across transports.

pub mod bulk;
pub mod configurations;
pub mod metrics;
pub mod preferences;
pub mod proposals;
pub mod shifts;

pub use bulk::BulkService;
pub use configurations::ConfigurationService;
pub use metrics::MetricsService;
pub use preferences::PreferenceService;
pub use proposals::ProposalService;
pub use shifts::ShiftService;
