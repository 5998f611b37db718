//! Unified API models
//!
//! Request, response, and error models shared by all transports.

pub mod errors;
pub mod requests;
pub mod responses;

pub use errors::{ApiError, ApiResult};
