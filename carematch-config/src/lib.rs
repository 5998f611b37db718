//! carematch-config - Configuration Management
//! TOML-based configuration with environment variable overrides

pub mod config;
pub mod env;
pub mod schema;

pub use config::{load_config, load_from_file, validate_config};
pub use env::{apply_env_overrides, load_env_config};
pub use schema::{
    CarematchConfig, ConfigError, EngineSection, HttpSection, MlSection, StorageSection,
};
