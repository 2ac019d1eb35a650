//! # Logging System
//!
//! Wraps `env_logger` with a TOML-driven configuration and per-feature
//! targets. The active configuration is kept globally so levels can be
//! changed at runtime.

pub mod config;
pub mod features;

pub use config::LogConfig;
pub use features::LogFeature;
use once_cell::sync::OnceCell;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Global logging configuration instance
static LOGGING_CONFIG: OnceCell<Arc<RwLock<LogConfig>>> = OnceCell::new();

/// Logging system backed by `env_logger`
pub struct LoggingSystem;

impl LoggingSystem {
    /// Initialize the logging system with default configuration
    pub fn init_default() -> Result<(), LoggingError> {
        Self::init_with_config(LogConfig::default())
    }

    /// Initialize the logging system with a custom configuration
    pub fn init_with_config(config: LogConfig) -> Result<(), LoggingError> {
        config.validate()?;

        let mut builder = env_logger::Builder::new();
        builder.filter_level(config.default_filter());
        for (target, level) in config.feature_filters() {
            builder.filter_module(target, level);
        }

        let include_timestamp = config.general.include_timestamp;
        let include_target = config.general.include_target;
        builder.format(move |buf, record| {
            let mut line = String::new();
            if include_timestamp {
                line.push_str(&chrono::Utc::now().to_rfc3339());
                line.push(' ');
            }
            line.push_str(record.level().as_str());
            if include_target {
                line.push_str(" [");
                line.push_str(record.target());
                line.push(']');
            }
            writeln!(buf, "{} {}", line, record.args())
        });

        builder
            .try_init()
            .map_err(|_| LoggingError::AlreadyInitialized)?;

        LOGGING_CONFIG
            .set(Arc::new(RwLock::new(config)))
            .map_err(|_| LoggingError::AlreadyInitialized)?;

        Ok(())
    }

    /// Get the global logging configuration
    pub async fn get_config() -> Option<LogConfig> {
        match LOGGING_CONFIG.get() {
            Some(config_arc) => Some(config_arc.read().await.clone()),
            None => None,
        }
    }

    /// Update feature-specific log level
    pub async fn update_feature_level(feature: &str, level: &str) -> Result<(), LoggingError> {
        let level_filter = config::parse_level(level)
            .ok_or_else(|| LoggingError::Config(format!("Invalid log level: {}", level)))?;
        if features::LogFeature::from_name(feature).is_none() {
            return Err(LoggingError::Config(format!("Unknown feature: {}", feature)));
        }

        let config_arc = LOGGING_CONFIG
            .get()
            .ok_or_else(|| LoggingError::Config("Logging system not initialized".to_string()))?;
        let mut config_guard = config_arc.write().await;
        config_guard
            .features
            .insert(feature.to_string(), level.to_string());

        // env_logger filters are fixed at init; the global max level is the
        // only knob left, so raise it when a feature asks for more detail.
        if level_filter > log::max_level() {
            log::set_max_level(level_filter);
        }
        Ok(())
    }

    /// Reload configuration from file
    pub async fn reload_config_from_file(path: &str) -> Result<(), LoggingError> {
        let new_config = LogConfig::from_file(path)?;

        let config_arc = LOGGING_CONFIG
            .get()
            .ok_or_else(|| LoggingError::Config("Logging system not initialized".to_string()))?;
        log::set_max_level(new_config.default_filter());
        *config_arc.write().await = new_config;
        Ok(())
    }
}

/// Logging system errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Logging system already initialized")]
    AlreadyInitialized,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("Config error: {0}")]
    ConfigError(#[from] config::ConfigError),
}

/// Initialize logging with defaults, ignoring a logger installed earlier
pub fn init() {
    if let Err(e) = LoggingSystem::init_default() {
        log::debug!("Logging already initialized: {}", e);
    }
}
