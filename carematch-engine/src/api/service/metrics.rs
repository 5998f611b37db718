//! Metrics service

use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::api::context::UserContext;
use crate::api::models::{errors::ApiError, requests::MetricsRequest, responses::MetricsResponse, ApiResult};
use crate::engine::Engine;

/// Default reporting window when the caller gives none
const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Matching KPI operations
pub struct MetricsService {
    engine: Arc<Engine>,
}

impl MetricsService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Aggregate matching KPIs over the requested window
    pub async fn matching(
        &self,
        ctx: &UserContext,
        request: MetricsRequest,
    ) -> ApiResult<MetricsResponse> {
        let to = request.to.unwrap_or_else(Utc::now);
        let from = request
            .from
            .unwrap_or_else(|| to - Duration::days(DEFAULT_WINDOW_DAYS));
        if from >= to {
            return Err(ApiError::new(
                "VALIDATION_ERROR",
                "metrics window must start before it ends",
            ));
        }
        let kpis = self
            .engine
            .matching_kpis(ctx, from, to)
            .await
            .map_err(ApiError::from)?;
        Ok(MetricsResponse { kpis })
    }
}
