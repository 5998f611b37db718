//! Transport adapters
//!
//! Adapters that convert transport-specific types to unified models.

#[cfg(feature = "http")]
pub mod rest;
