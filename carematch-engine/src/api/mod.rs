//! Engine API module
//!
//! Unified API layer: the service layer holds the business logic and
//! transport adapters convert to and from wire types. The engine
//! itself never imports the HTTP library; the REST surface is a thin
//! adapter behind the `http` feature.

pub mod context;
pub mod models;
#[cfg(feature = "http")]
pub mod rest;
pub mod service;
pub mod transport;

pub use context::UserContext;
pub use service::{
    BulkService, ConfigurationService, MetricsService, PreferenceService, ProposalService,
    ShiftService,
};

#[cfg(feature = "http")]
pub use rest::RestApiServer;
