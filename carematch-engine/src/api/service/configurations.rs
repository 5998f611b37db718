//! Configuration service

use chrono::Utc;
use std::sync::Arc;

use crate::api::context::UserContext;
use crate::api::models::{errors::ApiError, requests::PutConfigurationRequest, ApiResult};
use crate::configuration::MatchingConfiguration;
use crate::engine::Engine;
use crate::ids::ConfigId;

/// Matching configuration operations
pub struct ConfigurationService {
    engine: Arc<Engine>,
}

impl ConfigurationService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Read a configuration row
    pub async fn get(&self, ctx: &UserContext, id: ConfigId) -> ApiResult<MatchingConfiguration> {
        self.engine
            .get_configuration(ctx, id)
            .await
            .map_err(ApiError::from)
    }

    /// Create or replace a configuration row
    pub async fn put(
        &self,
        ctx: &UserContext,
        id: ConfigId,
        request: PutConfigurationRequest,
    ) -> ApiResult<MatchingConfiguration> {
        let now = Utc::now();
        let config = MatchingConfiguration {
            id,
            organization_id: ctx.organization_id,
            branch_id: request.branch_id,
            name: request.name,
            weights: request.weights,
            constraints: request.constraints,
            thresholds: request.thresholds,
            optimization: request.optimization,
            created_at: now,
            updated_at: now,
            version: request.expected_version.unwrap_or(1),
        };
        self.engine
            .put_configuration(ctx, config)
            .await
            .map_err(ApiError::from)
    }
}
