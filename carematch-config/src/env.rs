// Environment variable parsing and override support

use crate::schema::CarematchConfig;
use std::collections::BTreeMap;
use std::env;

/// Load configuration overrides from environment variables
///
/// Format: CAREMATCH_<SECTION>_<KEY>
/// Examples:
///   CAREMATCH_ENGINE_MIN_SCORE_FOR_PROPOSAL=70
///   CAREMATCH_ML_ENABLED=true
///   CAREMATCH_HTTP_ADDR=127.0.0.1:9090
pub fn load_env_config() -> BTreeMap<String, String> {
    let mut env_config = BTreeMap::new();

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix("CAREMATCH_") {
            env_config.insert(stripped.to_lowercase(), value);
        }
    }

    env_config
}

/// Merge environment variables into config
///
/// Environment variables override config file values. Unparseable
/// values are ignored so a stray variable cannot take the engine down.
pub fn apply_env_overrides(config: &mut CarematchConfig, env_vars: &BTreeMap<String, String>) {
    for (key, value) in env_vars {
        match key.as_str() {
            "engine_proposal_expiration_minutes" => {
                if let Ok(v) = value.parse() {
                    config.engine.proposal_expiration_minutes = v;
                }
            }
            "engine_min_score_for_proposal" => {
                if let Ok(v) = value.parse() {
                    config.engine.min_score_for_proposal = v;
                }
            }
            "engine_max_proposals_per_shift" => {
                if let Ok(v) = value.parse() {
                    config.engine.max_proposals_per_shift = v;
                }
            }
            "engine_auto_assign_threshold" => {
                if let Ok(v) = value.parse() {
                    config.engine.auto_assign_threshold = v;
                }
            }
            "engine_expiry_sweep_interval_secs" => {
                if let Ok(v) = value.parse() {
                    config.engine.expiry_sweep_interval_secs = v;
                }
            }
            "engine_evaluator_fan_out" => {
                if let Ok(v) = value.parse() {
                    config.engine.evaluator_fan_out = v;
                }
            }
            "engine_command_deadline_secs" => {
                if let Ok(v) = value.parse() {
                    config.engine.command_deadline_secs = v;
                }
            }
            "ml_enabled" => {
                if let Ok(v) = value.parse() {
                    config.ml.enabled = v;
                }
            }
            "ml_weight" => {
                if let Ok(v) = value.parse() {
                    config.ml.weight = v;
                }
            }
            "ml_min_confidence" => {
                if let Ok(v) = value.parse() {
                    config.ml.min_confidence = v;
                }
            }
            "ml_fallback_to_rule_based" => {
                if let Ok(v) = value.parse() {
                    config.ml.fallback_to_rule_based = v;
                }
            }
            "ml_inference_url" => {
                config.ml.inference_url = Some(value.clone());
            }
            "ml_inference_timeout_ms" => {
                if let Ok(v) = value.parse() {
                    config.ml.inference_timeout_ms = v;
                }
            }
            "http_addr" => {
                config.http.addr = value.clone();
            }
            "storage_data_dir" => {
                config.storage.data_dir = value.clone();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_engine_fields() {
        let mut config = CarematchConfig::default();
        let mut vars = BTreeMap::new();
        vars.insert(
            "engine_min_score_for_proposal".to_string(),
            "75".to_string(),
        );
        vars.insert("ml_enabled".to_string(), "true".to_string());
        vars.insert(
            "ml_inference_url".to_string(),
            "http://inference.local:9000".to_string(),
        );

        apply_env_overrides(&mut config, &vars);
        assert_eq!(config.engine.min_score_for_proposal, 75);
        assert!(config.ml.enabled);
        assert_eq!(
            config.ml.inference_url.as_deref(),
            Some("http://inference.local:9000")
        );
    }

    #[test]
    fn ignores_unparseable_values() {
        let mut config = CarematchConfig::default();
        let mut vars = BTreeMap::new();
        vars.insert(
            "engine_max_proposals_per_shift".to_string(),
            "not-a-number".to_string(),
        );

        apply_env_overrides(&mut config, &vars);
        assert_eq!(config.engine.max_proposals_per_shift, 5);
    }
}
