//! Preference service

use chrono::Utc;
use std::sync::Arc;

use crate::api::context::UserContext;
use crate::api::models::{errors::ApiError, requests::PutPreferencesRequest, ApiResult};
use crate::caregiver::CaregiverPreferenceProfile;
use crate::engine::Engine;
use crate::ids::CaregiverId;

/// Caregiver preference operations
pub struct PreferenceService {
    engine: Arc<Engine>,
}

impl PreferenceService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Read a profile; an empty default when none is stored
    pub async fn get(
        &self,
        ctx: &UserContext,
        caregiver_id: CaregiverId,
    ) -> ApiResult<CaregiverPreferenceProfile> {
        self.engine
            .get_preferences(ctx, caregiver_id)
            .await
            .map_err(ApiError::from)
    }

    /// Upsert a profile
    pub async fn put(
        &self,
        ctx: &UserContext,
        caregiver_id: CaregiverId,
        request: PutPreferencesRequest,
    ) -> ApiResult<CaregiverPreferenceProfile> {
        let profile = CaregiverPreferenceProfile {
            caregiver_id,
            preferred_days: request.preferred_days,
            preferred_time_ranges: request.preferred_time_ranges,
            max_shifts_per_week: request.max_shifts_per_week,
            max_hours_per_week: request.max_hours_per_week,
            max_travel_miles: request.max_travel_miles,
            willing_urgent: request.willing_urgent,
            willing_weekends: request.willing_weekends,
            willing_holidays: request.willing_holidays,
            accept_auto_assignment: request.accept_auto_assignment,
            notification_channels: request.notification_channels,
            quiet_hours: request.quiet_hours,
            updated_at: Utc::now(),
            version: 1,
        };
        self.engine
            .put_preferences(ctx, profile)
            .await
            .map_err(ApiError::from)
    }
}
