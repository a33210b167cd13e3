//! Configuration for the trash bin operator

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{capture::NamingStrategy, error::ConfigError};

/// Prefix of the environment variables overriding the configuration
pub const ENV_PREFIX: &str = "TRASHED";

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Configuration for the trash bin operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// ConfigMap holding the watched kinds and retention settings
    pub config_map_name: String,
    /// Namespace of that ConfigMap
    pub config_map_namespace: String,
    /// Namespace for records of cluster-scoped objects
    pub fallback_namespace: String,
    /// How record names are chosen
    pub naming: NamingStrategy,
    /// Seconds between two reads of the settings ConfigMap
    pub settings_refresh_secs: u64,
    /// Seconds between two expired-record sweeps, 0 disables sweeping
    pub expiry_sweep_secs: u64,
    pub log_format: LogFormat,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            config_map_name: "trashedresources-config".to_string(),
            config_map_namespace: "system".to_string(),
            fallback_namespace: "system".to_string(),
            naming: NamingStrategy::default(),
            settings_refresh_secs: 60,
            expiry_sweep_secs: 300,
            log_format: LogFormat::default(),
        }
    }
}

impl OperatorConfig {
    /// Load the configuration from an optional file, overlaid with
    /// `TRASHED_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let config: OperatorConfig = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.config_map_name.trim().is_empty() {
            return Err(ConfigError::Invalid("config_map_name is empty".to_string()));
        }
        if self.config_map_namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("config_map_namespace is empty".to_string()));
        }
        if self.fallback_namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("fallback_namespace is empty".to_string()));
        }
        if self.settings_refresh_secs == 0 {
            return Err(ConfigError::Invalid(
                "settings_refresh_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
