//! Inference client
//!
//! The model is an opaque RPC: artifacts, runtimes, and deployment are
//! owned by the offline training pipeline. The engine only knows the
//! `predict` contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::ml::features::FeatureVector;

/// Output of one model prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted match quality in [0, 1]
    pub predicted_score: f64,
    /// Model confidence in [0, 1]
    pub confidence: f64,
    /// Optional per-feature attribution
    pub feature_importance: Option<HashMap<String, f64>>,
}

/// Opaque prediction RPC
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Run one prediction; transient failures map to
    /// [`EngineError::Transient`]
    async fn predict(&self, features: &FeatureVector) -> EngineResult<Prediction>;
}

/// HTTP inference client for a remote model server
#[cfg(feature = "inference")]
pub struct HttpInferenceClient {
    client: reqwest::Client,
    endpoint: String,
}

#[cfg(feature = "inference")]
impl HttpInferenceClient {
    /// Build a client with a per-request deadline
    pub fn new(endpoint: impl Into<String>, timeout_ms: u64) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| EngineError::Transient(format!("inference client build failed: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[cfg(feature = "inference")]
#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn predict(&self, features: &FeatureVector) -> EngineResult<Prediction> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(features)
            .send()
            .await
            .map_err(|e| EngineError::Transient(format!("inference call failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(EngineError::Transient(format!(
                "inference server returned {}",
                response.status()
            )));
        }

        let prediction: Prediction = response
            .json()
            .await
            .map_err(|e| EngineError::Transient(format!("inference response malformed: {}", e)))?;

        if !(0.0..=1.0).contains(&prediction.predicted_score)
            || !(0.0..=1.0).contains(&prediction.confidence)
        {
            return Err(EngineError::Transient(format!(
                "inference response out of range: score {} confidence {}",
                prediction.predicted_score, prediction.confidence
            )));
        }

        Ok(prediction)
    }
}

/// Fixed-answer client for tests and local runs
pub struct StaticInferenceClient {
    prediction: Prediction,
}

impl StaticInferenceClient {
    /// Always answer with the given prediction
    pub fn new(predicted_score: f64, confidence: f64) -> Self {
        Self {
            prediction: Prediction {
                predicted_score,
                confidence,
                feature_importance: None,
            },
        }
    }
}

#[async_trait]
impl InferenceClient for StaticInferenceClient {
    async fn predict(&self, _features: &FeatureVector) -> EngineResult<Prediction> {
        Ok(self.prediction.clone())
    }
}

/// Client that fails every call; exercises fallback paths in tests
pub struct FailingInferenceClient;

#[async_trait]
impl InferenceClient for FailingInferenceClient {
    async fn predict(&self, _features: &FeatureVector) -> EngineResult<Prediction> {
        Err(EngineError::Transient(
            "inference service unavailable".to_string(),
        ))
    }
}
