//! Configuration management for the logging system
//!
//! Loads logging configuration from TOML files and validates level names.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::features::LogFeature;

/// Main logging configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// General logging settings
    pub general: GeneralConfig,
    /// Feature-specific log levels keyed by feature name
    #[serde(default)]
    pub features: HashMap<String, String>,
}

/// General logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default log level for all modules
    pub default_level: String,
    /// Include timestamps in console output
    #[serde(default = "default_true")]
    pub include_timestamp: bool,
    /// Include the log target (feature) in console output
    #[serde(default = "default_true")]
    pub include_target: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            features: Self::default_features(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_level: "INFO".to_string(),
            include_timestamp: true,
            include_target: true,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid log level '{level}' for {scope}")]
    InvalidLevel { scope: String, level: String },
    #[error("Unknown logging feature: {0}")]
    UnknownFeature(String),
}

impl LogConfig {
    fn default_features() -> HashMap<String, String> {
        LogFeature::all()
            .iter()
            .map(|feature| (feature.name().to_string(), "INFO".to_string()))
            .collect()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, super::LoggingError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, super::LoggingError> {
        let config: LogConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate level names and feature names
    pub fn validate(&self) -> Result<(), ConfigError> {
        if parse_level(&self.general.default_level).is_none() {
            return Err(ConfigError::InvalidLevel {
                scope: "general.default_level".to_string(),
                level: self.general.default_level.clone(),
            });
        }
        for (feature, level) in &self.features {
            if LogFeature::from_name(feature).is_none() {
                return Err(ConfigError::UnknownFeature(feature.clone()));
            }
            if parse_level(level).is_none() {
                return Err(ConfigError::InvalidLevel {
                    scope: feature.clone(),
                    level: level.clone(),
                });
            }
        }
        Ok(())
    }

    /// Effective level filter for the default scope
    pub fn default_filter(&self) -> log::LevelFilter {
        parse_level(&self.general.default_level).unwrap_or(log::LevelFilter::Info)
    }

    /// Effective level filter per feature target
    pub fn feature_filters(&self) -> Vec<(&'static str, log::LevelFilter)> {
        self.features
            .iter()
            .filter_map(|(name, level)| {
                let feature = LogFeature::from_name(name)?;
                Some((feature.target(), parse_level(level)?))
            })
            .collect()
    }
}

/// Parse an upper- or lower-case level name
pub fn parse_level(level: &str) -> Option<log::LevelFilter> {
    match level.to_ascii_uppercase().as_str() {
        "TRACE" => Some(log::LevelFilter::Trace),
        "DEBUG" => Some(log::LevelFilter::Debug),
        "INFO" => Some(log::LevelFilter::Info),
        "WARN" => Some(log::LevelFilter::Warn),
        "ERROR" => Some(log::LevelFilter::Error),
        "OFF" => Some(log::LevelFilter::Off),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_covers_every_feature() {
        let config = LogConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.features.len(), LogFeature::all().len());
        assert_eq!(config.default_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn toml_overrides_feature_levels() {
        let config = LogConfig::from_toml_str(
            r#"
            [general]
            default_level = "WARN"

            [features]
            staging = "DEBUG"
            gateway = "error"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_filter(), log::LevelFilter::Warn);
        let filters = config.feature_filters();
        assert!(filters.contains(&("droplet_stager::staging", log::LevelFilter::Debug)));
        assert!(filters.contains(&("droplet_stager::gateway", log::LevelFilter::Error)));
    }

    #[test]
    fn unknown_level_is_rejected() {
        let result = LogConfig::from_toml_str(
            r#"
            [general]
            default_level = "LOUD"
            "#,
        );
        assert!(result.is_err());
    }
}
