// Configuration schema and types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level carematch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarematchConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub ml: MlSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub storage: StorageSection,
}

/// Engine defaults applied when an organization has no stored
/// matching configuration override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// TTL for new proposals, in minutes
    #[serde(default = "default_proposal_expiration_minutes")]
    pub proposal_expiration_minutes: i64,
    /// Score floor below which no proposal is written
    #[serde(default = "default_min_score_for_proposal")]
    pub min_score_for_proposal: u8,
    #[serde(default = "default_max_proposals_per_shift")]
    pub max_proposals_per_shift: usize,
    /// Self-select auto-assignment score floor
    #[serde(default = "default_auto_assign_threshold")]
    pub auto_assign_threshold: u8,
    /// Expiry sweep period, in seconds
    #[serde(default = "default_expiry_sweep_interval_secs")]
    pub expiry_sweep_interval_secs: u64,
    /// Upper bound on concurrent per-candidate context fetches
    #[serde(default = "default_evaluator_fan_out")]
    pub evaluator_fan_out: usize,
    /// Deadline applied to every API command, in seconds
    #[serde(default = "default_command_deadline_secs")]
    pub command_deadline_secs: u64,
}

fn default_proposal_expiration_minutes() -> i64 {
    120
}

fn default_min_score_for_proposal() -> u8 {
    60
}

fn default_max_proposals_per_shift() -> usize {
    5
}

fn default_auto_assign_threshold() -> u8 {
    90
}

fn default_expiry_sweep_interval_secs() -> u64 {
    60
}

fn default_evaluator_fan_out() -> usize {
    64
}

fn default_command_deadline_secs() -> u64 {
    30
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            proposal_expiration_minutes: default_proposal_expiration_minutes(),
            min_score_for_proposal: default_min_score_for_proposal(),
            max_proposals_per_shift: default_max_proposals_per_shift(),
            auto_assign_threshold: default_auto_assign_threshold(),
            expiry_sweep_interval_secs: default_expiry_sweep_interval_secs(),
            evaluator_fan_out: default_evaluator_fan_out(),
            command_deadline_secs: default_command_deadline_secs(),
        }
    }
}

/// Learned-scoring section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlSection {
    #[serde(default)]
    pub enabled: bool,
    /// Blend weight for the predicted score
    #[serde(default = "default_ml_weight")]
    pub weight: f64,
    /// Predictions below this confidence fall back to the rule-based score
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_fallback_to_rule_based")]
    pub fallback_to_rule_based: bool,
    /// Inference service endpoint
    #[serde(default)]
    pub inference_url: Option<String>,
    /// Per-prediction deadline, in milliseconds
    #[serde(default = "default_inference_timeout_ms")]
    pub inference_timeout_ms: u64,
}

fn default_ml_weight() -> f64 {
    0.3
}

fn default_min_confidence() -> f64 {
    0.5
}

fn default_fallback_to_rule_based() -> bool {
    true
}

fn default_inference_timeout_ms() -> u64 {
    2000
}

impl Default for MlSection {
    fn default() -> Self {
        Self {
            enabled: false,
            weight: default_ml_weight(),
            min_confidence: default_min_confidence(),
            fallback_to_rule_based: default_fallback_to_rule_based(),
            inference_url: None,
            inference_timeout_ms: default_inference_timeout_ms(),
        }
    }
}

/// HTTP adapter section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSection {
    #[serde(default = "default_http_addr")]
    pub addr: String,
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            addr: default_http_addr(),
        }
    }
}

/// Durable storage section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "./carematch_db".to_string()
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Configuration loading and validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Configuration file not found")]
    FileNotFound,
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("IO error: {0}")]
    IoError(String),
}
