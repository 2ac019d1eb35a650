//! Wire messages exchanged with staging workers

use crate::error::{StagerError, StagerResult};
use crate::store::StagingFailure;
use serde::{Deserialize, Serialize};

/// Buildpack selection sent with a staging request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BuildpackSpec {
    AutoDetect,
    /// Admin buildpack name or custom URL
    Named(String),
}

impl BuildpackSpec {
    pub fn from_option(buildpack: Option<&str>) -> Self {
        match buildpack {
            Some(name) if !name.is_empty() => BuildpackSpec::Named(name.to_string()),
            _ => BuildpackSpec::AutoDetect,
        }
    }
}

/// Where and how a worker reports completion over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackInfo {
    pub url: String,
    pub user: String,
    pub password: String,
}

/// Request published to a single worker. Never modified after publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingRequest {
    pub correlation_id: String,
    pub app_id: String,
    pub stack: String,
    pub memory_mb: u64,
    pub disk_mb: u64,
    pub file_descriptors: u64,
    pub buildpack: BuildpackSpec,
    pub download_uri: String,
    pub upload_uri: String,
    pub buildpack_cache_download_uri: String,
    pub buildpack_cache_upload_uri: String,
    /// Bus subject for the reply
    pub reply_to: String,
    pub callback: CallbackInfo,
    /// Ask the worker to also start one instance from the new droplet
    pub start_instance: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

/// Completion envelope a worker sends on the bus or to the HTTP callback.
///
/// Only `app_id` is required. A reply carrying `error` or `error_info` is a
/// failure; anything else is a success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_buildpack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buildpack_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_start_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub droplet_sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_info: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_streaming_log_url: Option<String>,
}

impl StagingReply {
    /// Decode a reply from raw bytes.
    pub fn from_slice(raw: &[u8]) -> StagerResult<Self> {
        serde_json::from_slice(raw).map_err(|e| StagerError::Parse(e.to_string()))
    }

    /// Successful reply with the given detection results.
    pub fn success(app_id: &str, task_id: Option<&str>) -> Self {
        Self {
            task_id: task_id.map(str::to_string),
            app_id: app_id.to_string(),
            detected_buildpack: None,
            buildpack_key: None,
            detected_start_command: None,
            droplet_sha1: None,
            error: None,
            error_info: None,
            task_log: None,
            task_streaming_log_url: None,
        }
    }

    /// Failed reply carrying `error_info`.
    pub fn failure(app_id: &str, task_id: Option<&str>, error_type: &str, message: &str) -> Self {
        Self {
            error_info: Some(ErrorInfo {
                error_type: error_type.to_string(),
                message: message.to_string(),
            }),
            ..Self::success(app_id, task_id)
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.error_info.is_some()
    }

    pub fn into_result(self, correlation_id: &str) -> StagingResult {
        let outcome = if self.is_failure() {
            let failure = match (self.error_info, self.error) {
                (Some(info), _) => StagingFailure::new(info.error_type, info.message),
                (None, Some(error)) => StagingFailure::new("StagingError", error),
                (None, None) => StagingFailure::new("StagingError", "staging failed"),
            };
            StagingOutcome::Failure(failure)
        } else {
            StagingOutcome::Success(StagingSuccess {
                detected_buildpack: self.detected_buildpack,
                buildpack_key: self.buildpack_key,
                detected_start_command: self.detected_start_command,
                droplet_sha1: self.droplet_sha1,
            })
        };
        StagingResult {
            correlation_id: correlation_id.to_string(),
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingSuccess {
    pub detected_buildpack: Option<String>,
    pub buildpack_key: Option<String>,
    pub detected_start_command: Option<String>,
    /// Content hash of the droplet, present only if the worker produced one
    pub droplet_sha1: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StagingOutcome {
    Success(StagingSuccess),
    Failure(StagingFailure),
}

/// Outcome of one staging attempt, keyed by its correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingResult {
    pub correlation_id: String,
    pub outcome: StagingOutcome,
}

impl StagingResult {
    pub fn failure(correlation_id: &str, failure: StagingFailure) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            outcome: StagingOutcome::Failure(failure),
        }
    }

    /// Failure synthesized from an error raised inside this process.
    pub fn from_error(correlation_id: &str, error: &StagerError) -> Self {
        Self::failure(
            correlation_id,
            StagingFailure::new(error.staging_error_code(), error.to_string()),
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, StagingOutcome::Success(_))
    }
}
