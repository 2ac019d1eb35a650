use crate::error::{StagerError, StagerResult};
use crate::store::models::StagingBackend;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a staging node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagerConfig {
    /// Path where the node stores apps, droplets, packages and jobs
    pub storage_path: PathBuf,
    /// Address the completion callback server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Staging backend owned by this orchestrator
    #[serde(default)]
    pub backend: StagingBackend,
    /// Credentials and URL workers use to report completions over HTTP
    #[serde(default)]
    pub internal_api: InternalApiConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Requirements used when staging a package into a droplet
    #[serde(default)]
    pub package_defaults: PackageStagingDefaults,
    #[serde(default)]
    pub blobstore: BlobstoreConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

fn default_bind_address() -> String {
    "127.0.0.1:9022".to_string()
}

/// Shared secret for the internal completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalApiConfig {
    pub user: String,
    pub password: String,
    /// Externally reachable URL of `POST /internal/staging/completed`
    pub callback_url: String,
}

impl Default for InternalApiConfig {
    fn default() -> Self {
        Self {
            user: "internal_user".to_string(),
            password: "internal_password".to_string(),
            callback_url: "http://127.0.0.1:9022/internal/staging/completed".to_string(),
        }
    }
}

/// What happens to the runtime after a successful app staging when the worker
/// already started one instance as a side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Start the app telling the runner one instance is already running
    #[default]
    OffsetStarted,
    /// Skip the explicit start and leave scaling to the runtime's own state
    SuppressStart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Deadline for a single staging attempt
    pub timeout_secs: u64,
    /// Subject workers publish heartbeats on
    pub advertise_subject: String,
    /// Prefix of the per-attempt bus reply subject
    pub reply_subject_prefix: String,
    /// Prefix of the worker-addressed request subject
    pub request_subject_prefix: String,
    pub start_policy: StartPolicy,
    /// Refuse apps whose buildpack is a custom URL
    pub disable_custom_buildpacks: bool,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 900,
            advertise_subject: "staging.advertise".to_string(),
            reply_subject_prefix: "staging.reply".to_string(),
            request_subject_prefix: "staging".to_string(),
            start_policy: StartPolicy::default(),
            disable_custom_buildpacks: false,
        }
    }
}

impl StagingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_subject(&self, worker_id: &str) -> String {
        format!("{}.{}.start", self.request_subject_prefix, worker_id)
    }

    pub fn reply_subject(&self, correlation_id: &str) -> String {
        format!("{}.{}", self.reply_subject_prefix, correlation_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Advertisements older than this are ignored and evicted
    pub advertisement_ttl_secs: u64,
    /// How often the eviction sweeper runs
    pub sweep_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            advertisement_ttl_secs: 10,
            sweep_interval_secs: 5,
        }
    }
}

/// Values a package staging request uses in place of an app's own limits.
///
/// TODO: derive these from the owning space's quota once space quotas are
/// exposed to the staging core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageStagingDefaults {
    pub stack: String,
    pub memory_mb: u64,
    /// 0 means no minimum disk requirement
    pub disk_mb: u64,
    pub file_descriptors: u64,
    pub health_check_timeout_secs: u64,
}

impl Default for PackageStagingDefaults {
    fn default() -> Self {
        Self {
            stack: "lucid64".to_string(),
            memory_mb: 1024,
            disk_mb: 0,
            file_descriptors: 1024,
            health_check_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobstoreConfig {
    pub base_url: String,
}

impl Default for BlobstoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9022/staging".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Queue for blob cleanup jobs
    pub generic_queue: String,
    /// Queue for byte-transfer jobs that must run next to the uploaded file
    pub local_queue: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            generic_queue: "cc-generic".to_string(),
            local_queue: "cc-local".to_string(),
        }
    }
}

impl Default for StagerConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("data"),
            bind_address: default_bind_address(),
            backend: StagingBackend::default(),
            internal_api: InternalApiConfig::default(),
            staging: StagingConfig::default(),
            registry: RegistryConfig::default(),
            package_defaults: PackageStagingDefaults::default(),
            blobstore: BlobstoreConfig::default(),
            jobs: JobsConfig::default(),
        }
    }
}

impl StagerConfig {
    /// Create a new configuration with the specified storage path
    pub fn new(storage_path: PathBuf) -> Self {
        Self {
            storage_path,
            ..Default::default()
        }
    }

    /// Set the staging backend
    pub fn with_backend(mut self, backend: StagingBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the staging deadline
    pub fn with_staging_timeout(mut self, timeout_secs: u64) -> Self {
        self.staging.timeout_secs = timeout_secs;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> StagerResult<()> {
        if self.internal_api.user.is_empty() || self.internal_api.password.is_empty() {
            return Err(StagerError::Config(
                "internal_api credentials must not be empty".to_string(),
            ));
        }
        if self.staging.timeout_secs == 0 {
            return Err(StagerError::Config(
                "staging.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.registry.advertisement_ttl_secs == 0 {
            return Err(StagerError::Config(
                "registry.advertisement_ttl_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load a stager configuration from the given path or from the `STAGER_CONFIG`
/// environment variable.
///
/// If the file does not exist, a default [`StagerConfig`] is returned.
pub fn load_stager_config(path: Option<&str>) -> StagerResult<StagerConfig> {
    use std::fs;

    let config_path = path
        .map(|p| p.to_string())
        .or_else(|| std::env::var("STAGER_CONFIG").ok())
        .unwrap_or_else(|| "config/stager_config.json".to_string());

    let config = match fs::read_to_string(&config_path) {
        Ok(config_str) => serde_json::from_str::<StagerConfig>(&config_str).map_err(|e| {
            log::error!("Failed to parse stager configuration: {}", e);
            StagerError::Config(format!("{}: {}", config_path, e))
        })?,
        Err(_) => {
            log::info!(
                "No stager configuration at {}, using defaults",
                config_path
            );
            StagerConfig::default()
        }
    };

    config.validate()?;
    Ok(config)
}
