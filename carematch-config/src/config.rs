// Configuration loading and management

use crate::env::{apply_env_overrides, load_env_config};
use crate::schema::{CarematchConfig, ConfigError};
use std::path::{Path, PathBuf};

/// Load configuration from file and environment variables
///
/// Loading hierarchy: env > file > defaults
pub fn load_config() -> Result<CarematchConfig, ConfigError> {
    let config_file = config_file_path();

    let mut config = if config_file.exists() {
        load_from_file(&config_file)?
    } else {
        CarematchConfig::default()
    };

    let env_vars = load_env_config();
    apply_env_overrides(&mut config, &env_vars);

    validate_config(&config)?;

    Ok(config)
}

/// Load configuration from a file path
pub fn load_from_file(path: &Path) -> Result<CarematchConfig, ConfigError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Configuration file path: `CAREMATCH_CONFIG` when set, else `./carematch.toml`
pub fn config_file_path() -> PathBuf {
    match std::env::var("CAREMATCH_CONFIG") {
        Ok(path) => PathBuf::from(path),
        Err(_) => PathBuf::from("carematch.toml"),
    }
}

/// Validate configuration
pub fn validate_config(config: &CarematchConfig) -> Result<(), ConfigError> {
    if config.engine.proposal_expiration_minutes <= 0 {
        return Err(ConfigError::ValidationError(format!(
            "proposal_expiration_minutes {} must be positive",
            config.engine.proposal_expiration_minutes
        )));
    }

    if config.engine.min_score_for_proposal > 100 {
        return Err(ConfigError::ValidationError(format!(
            "min_score_for_proposal {} exceeds 100",
            config.engine.min_score_for_proposal
        )));
    }

    if config.engine.auto_assign_threshold > 100 {
        return Err(ConfigError::ValidationError(format!(
            "auto_assign_threshold {} exceeds 100",
            config.engine.auto_assign_threshold
        )));
    }

    if config.engine.max_proposals_per_shift == 0 {
        return Err(ConfigError::ValidationError(
            "max_proposals_per_shift cannot be zero".to_string(),
        ));
    }

    if config.engine.evaluator_fan_out == 0 {
        return Err(ConfigError::ValidationError(
            "evaluator_fan_out cannot be zero".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&config.ml.weight) {
        return Err(ConfigError::ValidationError(format!(
            "ml weight {} must be within [0, 1]",
            config.ml.weight
        )));
    }

    if !(0.0..=1.0).contains(&config.ml.min_confidence) {
        return Err(ConfigError::ValidationError(format!(
            "ml min_confidence {} must be within [0, 1]",
            config.ml.min_confidence
        )));
    }

    if config.ml.enabled && config.ml.inference_url.is_none() {
        return Err(ConfigError::ValidationError(
            "ml.enabled requires ml.inference_url".to_string(),
        ));
    }

    if config.http.addr.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::ValidationError(format!(
            "http addr {} is not a valid socket address",
            config.http.addr
        )));
    }

    Ok(())
}
