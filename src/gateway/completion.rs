//! Inbound boundary for worker-reported staging results

use super::credentials::BasicCredentials;
use crate::config::StagerConfig;
use crate::error::{StagerError, StagerResult};
use crate::staging::{resolve_target, ApplyOutcome, CompletionSource, StagingReply, StagingTasks};
use crate::store::StagingDb;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub const STAGING_FAILURE_MSG: &str = "failed to stage application: staging had already been marked as failed, this could mean that staging took too long";

/// Authenticates, decodes and routes HTTP completion callbacks.
pub struct CompletionGateway {
    db: StagingDb,
    tasks: Arc<StagingTasks>,
    config: Arc<StagerConfig>,
}

impl CompletionGateway {
    pub fn new(db: StagingDb, tasks: Arc<StagingTasks>, config: Arc<StagerConfig>) -> Self {
        Self { db, tasks, config }
    }

    pub fn tasks(&self) -> &Arc<StagingTasks> {
        &self.tasks
    }

    /// Handle one callback. `Ok` means the result was accepted, including when
    /// it turned out to be a duplicate of one already applied.
    pub async fn receive(
        &self,
        raw_payload: &[u8],
        credentials: Option<&BasicCredentials>,
    ) -> StagerResult<ApplyOutcome> {
        match credentials {
            Some(credentials) if credentials.matches(&self.config.internal_api) => {}
            _ => {
                crate::log_gateway_warn!("Rejected staging completion with bad credentials");
                return Err(StagerError::Authentication);
            }
        }

        let reply = StagingReply::from_slice(raw_payload).map_err(|e| {
            let payload = String::from_utf8_lossy(raw_payload).to_string();
            crate::log_gateway_error!(
                "Staging completion parse error: {} payload={}",
                e,
                payload
            );
            StagerError::Parse(payload)
        })?;

        let target = resolve_target(&self.db, &reply.app_id, &self.config)
            .map_err(|e| self.boundary_error(&reply.app_id, e))?
            .ok_or_else(|| StagerError::NotFound(format!("App {}", reply.app_id)))?;
        if target.staging_backend() != self.config.backend {
            return Err(StagerError::BackendMismatch(format!(
                "{} stages with {}",
                reply.app_id,
                target.staging_backend()
            )));
        }
        if target.staging_failed() {
            return Err(StagerError::StagingFailed(STAGING_FAILURE_MSG.to_string()));
        }

        let correlation_id = match reply.task_id.clone() {
            Some(id) => id,
            None => {
                crate::log_gateway_warn!(
                    "Rejected staging completion for {} without task_id (current attempt {:?})",
                    reply.app_id,
                    target.staging_task_id()
                );
                return Err(StagerError::NotFound(format!(
                    "Staging task for {}",
                    reply.app_id
                )));
            }
        };

        let app_id = reply.app_id.clone();
        let result = reply.into_result(&correlation_id);
        let handoff = self
            .tasks
            .complete(&correlation_id, result, CompletionSource::HttpCallback);

        match AssertUnwindSafe(handoff).catch_unwind().await {
            Ok(Ok(outcome)) => {
                crate::log_gateway_info!(
                    "Accepted staging completion correlation_id={} app_id={}: {:?}",
                    correlation_id,
                    app_id,
                    outcome
                );
                Ok(outcome)
            }
            Ok(Err(e)) => Err(self.boundary_error(&app_id, e)),
            Err(_) => {
                crate::log_gateway_error!(
                    "Staging completion handler panicked correlation_id={} app_id={}",
                    correlation_id,
                    app_id
                );
                Err(StagerError::Server("staging completion failed".to_string()))
            }
        }
    }

    fn boundary_error(&self, app_id: &str, error: StagerError) -> StagerError {
        if error.is_api_error() {
            return error;
        }
        crate::log_gateway_error!("Staging completion for app_id={} failed: {}", app_id, error);
        StagerError::Server("staging completion failed".to_string())
    }
}
