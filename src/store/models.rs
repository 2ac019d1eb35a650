//! Persistent records owned by the staging core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Staging state of an app or droplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum StagingStatus {
    #[default]
    Pending,
    Staging,
    Staged,
    Failed,
}

/// Execution backend responsible for staging a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StagingBackend {
    #[default]
    Dea,
    Diego,
}

impl std::fmt::Display for StagingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StagingBackend::Dea => write!(f, "dea"),
            StagingBackend::Diego => write!(f, "diego"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppState {
    #[default]
    Stopped,
    Started,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Bits,
    Docker,
}

impl PackageType {
    pub const ALL: [&'static str; 2] = ["bits", "docker"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bits" => Some(PackageType::Bits),
            "docker" => Some(PackageType::Docker),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PackageState {
    Created,
    Pending,
    Ready,
}

/// Error recorded on a failed staging attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingFailure {
    pub error_code: String,
    pub error_description: String,
}

impl StagingFailure {
    pub fn new(error_code: impl Into<String>, error_description: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            error_description: error_description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceRecord {
    pub guid: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    pub guid: String,
    pub name: String,
    pub space_guid: String,
    pub state: AppState,
    pub instances: u32,
    pub memory_mb: u64,
    pub disk_mb: u64,
    pub file_descriptors: u64,
    pub stack: String,
    /// Admin buildpack name or a custom git URL; `None` means auto-detect
    pub buildpack: Option<String>,
    pub command: Option<String>,
    pub staging_backend: StagingBackend,
    /// Hash of the uploaded bits
    pub package_hash: Option<String>,
    pub droplet_hash: Option<String>,
    pub staging_status: StagingStatus,
    /// Correlation id of the current staging attempt
    pub staging_task_id: Option<String>,
    pub detected_buildpack: Option<String>,
    pub detected_buildpack_key: Option<String>,
    pub detected_start_command: String,
    pub staging_failure: Option<StagingFailure>,
    pub routes: Vec<String>,
    /// Bumped whenever the runnable configuration changes
    pub version: String,
}

impl AppRecord {
    pub fn new(guid: &str, name: &str, space_guid: &str) -> Self {
        Self {
            guid: guid.to_string(),
            name: name.to_string(),
            space_guid: space_guid.to_string(),
            state: AppState::Stopped,
            instances: 1,
            memory_mb: 1024,
            disk_mb: 1024,
            file_descriptors: 16384,
            stack: "lucid64".to_string(),
            buildpack: None,
            command: None,
            staging_backend: StagingBackend::default(),
            package_hash: None,
            droplet_hash: None,
            staging_status: StagingStatus::Pending,
            staging_task_id: None,
            detected_buildpack: None,
            detected_buildpack_key: None,
            detected_start_command: String::new(),
            staging_failure: None,
            routes: Vec::new(),
            version: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.state == AppState::Started
    }

    pub fn staging_failed(&self) -> bool {
        self.staging_status == StagingStatus::Failed
    }

    /// Staging is needed when bits exist but no current droplet does.
    pub fn needs_staging(&self) -> bool {
        self.package_hash.is_some()
            && (self.droplet_hash.is_none() || self.staging_status == StagingStatus::Pending)
    }

    /// Whether the configured buildpack is a custom URL rather than an admin
    /// buildpack name.
    pub fn has_custom_buildpack(&self) -> bool {
        self.buildpack
            .as_deref()
            .map(|bp| bp.contains("://") || bp.starts_with("git@"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropletRecord {
    pub guid: String,
    pub package_guid: String,
    pub space_guid: String,
    pub state: StagingStatus,
    pub staging_backend: StagingBackend,
    pub buildpack: Option<String>,
    pub staging_task_id: Option<String>,
    pub detected_buildpack: Option<String>,
    pub buildpack_key: Option<String>,
    pub detected_start_command: String,
    pub droplet_hash: Option<String>,
    pub failure: Option<StagingFailure>,
}

impl DropletRecord {
    pub fn new(guid: &str, package_guid: &str, space_guid: &str) -> Self {
        Self {
            guid: guid.to_string(),
            package_guid: package_guid.to_string(),
            space_guid: space_guid.to_string(),
            state: StagingStatus::Pending,
            staging_backend: StagingBackend::default(),
            buildpack: None,
            staging_task_id: None,
            detected_buildpack: None,
            buildpack_key: None,
            detected_start_command: String::new(),
            droplet_hash: None,
            failure: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub guid: String,
    pub space_guid: String,
    pub package_type: PackageType,
    pub url: Option<String>,
    pub state: PackageState,
    /// Local path of uploaded bits waiting for the transfer job
    pub bits_path: Option<String>,
    pub package_hash: Option<String>,
}

/// What kind of record a staging attempt writes its result into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    App,
    Droplet,
}

/// Durable mapping from a correlation id to the target it stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingTaskRecord {
    pub correlation_id: String,
    pub target_guid: String,
    pub kind: TargetKind,
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
