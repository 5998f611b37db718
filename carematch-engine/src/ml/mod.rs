//! Learned-scoring blend
//!
//! Enriches the rule-based score with an opaque model prediction,
//! gated by configuration and A/B variant overrides. The blender
//! never makes an ineligible candidate eligible and falls back to the
//! rule-based result when confidence is low or the model is down.

pub mod experiment;
pub mod features;
pub mod inference;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::ids::OrganizationId;
use crate::scoring::{MatchCandidate, MatchReason, QualityBand, ReasonImpact};

pub use experiment::{
    is_significant, two_proportion_z, variant_stats, AssignmentStrategy, Experiment,
    ExperimentAssignment, ExperimentVariant, VariantOutcome, VariantOverrides, VariantStats,
};
pub use features::{extract, FeatureVector, FEATURE_VECTOR_VERSION};
pub use inference::{InferenceClient, Prediction, StaticInferenceClient};

#[cfg(feature = "inference")]
pub use inference::HttpInferenceClient;

/// Registry row naming the active model for an organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRegistration {
    pub organization_id: OrganizationId,
    pub model_id: String,
    pub model_version: String,
    pub endpoint: String,
    pub activated_at: DateTime<Utc>,
}

/// Effective blend settings after variant overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendSettings {
    pub enabled: bool,
    /// Weight of the predicted score in the final blend
    pub weight: f64,
    /// Predictions below this confidence are discarded
    pub min_confidence: f64,
    /// Swallow inference failures and keep the rule-based score
    pub fallback_to_rule_based: bool,
}

impl BlendSettings {
    /// Settings from process configuration
    pub fn from_config(ml: &carematch_config::MlSection) -> Self {
        Self {
            enabled: ml.enabled,
            weight: ml.weight,
            min_confidence: ml.min_confidence,
            fallback_to_rule_based: ml.fallback_to_rule_based,
        }
    }

    /// Apply variant overrides on top of these settings
    pub fn with_overrides(&self, overrides: &VariantOverrides) -> Self {
        Self {
            enabled: overrides.ml_enabled.unwrap_or(self.enabled),
            weight: overrides.ml_weight.unwrap_or(self.weight),
            min_confidence: overrides.min_ml_confidence.unwrap_or(self.min_confidence),
            fallback_to_rule_based: self.fallback_to_rule_based,
        }
    }
}

/// Blends rule-based candidates with model predictions
pub struct MlBlender {
    client: Arc<dyn InferenceClient>,
    settings: BlendSettings,
}

impl MlBlender {
    pub fn new(client: Arc<dyn InferenceClient>, settings: BlendSettings) -> Self {
        Self { client, settings }
    }

    /// Base settings without variant overrides
    pub fn settings(&self) -> &BlendSettings {
        &self.settings
    }

    /// Blend one candidate
    ///
    /// Returns the candidate unchanged when the blend is disabled, the
    /// candidate is ineligible, or confidence is below the floor.
    pub async fn blend(
        &self,
        candidate: MatchCandidate,
        features: &FeatureVector,
        overrides: Option<&VariantOverrides>,
    ) -> EngineResult<MatchCandidate> {
        let settings = match overrides {
            Some(o) => self.settings.with_overrides(o),
            None => self.settings.clone(),
        };

        if !settings.enabled || !candidate.is_eligible {
            return Ok(candidate);
        }

        let prediction =
            match crate::error::with_retries("predict", || self.client.predict(features)).await {
                Ok(p) => p,
                Err(e) if settings.fallback_to_rule_based => {
                    tracing::warn!(error = %e, "inference failed, keeping rule-based score");
                    return Ok(candidate);
                }
                Err(e) => return Err(e),
            };

        if prediction.confidence < settings.min_confidence {
            tracing::debug!(
                confidence = prediction.confidence,
                floor = settings.min_confidence,
                "prediction below confidence floor, keeping rule-based score"
            );
            return Ok(candidate);
        }

        Ok(apply_blend(candidate, &prediction, settings.weight))
    }
}

/// final = rule * (1 - w) + predicted * 100 * w
fn apply_blend(mut candidate: MatchCandidate, prediction: &Prediction, weight: f64) -> MatchCandidate {
    let rule_based = candidate.overall_score as f64;
    let blended = rule_based * (1.0 - weight) + prediction.predicted_score * 100.0 * weight;
    let blended = blended.round().clamp(0.0, 100.0) as u8;

    if blended != candidate.overall_score {
        candidate.reasons.push(MatchReason {
            category: "ml_adjustment".to_string(),
            description: format!(
                "model prediction {:.2} (confidence {:.2}) moved the score from {} to {}",
                prediction.predicted_score, prediction.confidence, candidate.overall_score, blended
            ),
            impact: if blended > candidate.overall_score {
                ReasonImpact::Positive
            } else {
                ReasonImpact::Negative
            },
            weight: (weight * 100.0).round() as u8,
        });
    }

    candidate.overall_score = blended;
    candidate.quality = QualityBand::from_score(candidate.is_eligible, blended);
    candidate
}

/// Resolve the model endpoint for an organization, preferring the
/// registry row over process configuration
pub fn resolve_endpoint(
    registration: Option<&ModelRegistration>,
    configured: Option<&str>,
) -> EngineResult<String> {
    registration
        .map(|r| r.endpoint.clone())
        .or_else(|| configured.map(str::to_string))
        .ok_or_else(|| {
            EngineError::Validation("no inference endpoint registered or configured".to_string())
        })
}
