//! Staging attempts: dispatch, deadline and exactly-once completion.

use super::message::{CallbackInfo, StagingRequest, StagingResult};
use super::stageable::{resolve_target, ApplyOutcome, Stageable};
use super::tracker::{Claim, StagingTracker};
use crate::blobstore::BlobUrlGenerator;
use crate::bus::{AsyncRecvError, Event, MessageBus};
use crate::config::StagerConfig;
use crate::error::{StagerError, StagerResult};
use crate::registry::WorkerRegistry;
use crate::store::{StagingDb, StagingTaskRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

const TIMEOUT_APPLY_ATTEMPTS: u32 = 5;
const TIMEOUT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Receives the result of an attempt after it was applied to its target.
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    async fn staging_completed(&self, target: &dyn Stageable, result: &StagingResult) -> StagerResult<()>;
}

/// Path a result arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSource {
    BusReply,
    HttpCallback,
    Timeout,
    /// Synthesized locally when dispatch failed
    Internal,
}

impl CompletionSource {
    /// Sources delivered by the attempt's own waiter task
    fn is_waiter(self) -> bool {
        matches!(self, CompletionSource::BusReply | CompletionSource::Timeout)
    }
}

/// Acknowledgement returned once an attempt has been dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingHandle {
    pub correlation_id: String,
    pub worker_id: String,
}

/// Runs staging attempts against the worker pool.
pub struct StagingTasks {
    db: StagingDb,
    registry: Arc<WorkerRegistry>,
    bus: Arc<dyn MessageBus>,
    urls: Arc<dyn BlobUrlGenerator>,
    config: Arc<StagerConfig>,
    tracker: StagingTracker,
}

impl StagingTasks {
    pub fn new(
        db: StagingDb,
        registry: Arc<WorkerRegistry>,
        bus: Arc<dyn MessageBus>,
        urls: Arc<dyn BlobUrlGenerator>,
        config: Arc<StagerConfig>,
    ) -> Self {
        Self {
            db,
            registry,
            bus,
            urls,
            config,
            tracker: StagingTracker::new(),
        }
    }

    pub fn tracker(&self) -> &StagingTracker {
        &self.tracker
    }

    pub fn config(&self) -> &StagerConfig {
        &self.config
    }

    /// Start a staging attempt for `target`.
    ///
    /// Returns as soon as the request is published. The result is applied
    /// later through [`StagingTasks::complete`], whichever of the bus reply,
    /// the HTTP callback or the deadline gets there first.
    pub async fn start(
        self: &Arc<Self>,
        target: Arc<dyn Stageable>,
        handler: Arc<dyn CompletionHandler>,
    ) -> StagerResult<StagingHandle> {
        if target.staging_backend() != self.config.backend {
            return Err(StagerError::BackendMismatch(format!(
                "{} stages with {}, this orchestrator runs {}",
                target.guid(),
                target.staging_backend(),
                self.config.backend
            )));
        }
        if target.staging_failed() {
            return Err(StagerError::StagingFailed(format!(
                "{} previously failed to stage and must be restaged explicitly",
                target.guid()
            )));
        }

        let correlation_id = Uuid::new_v4().to_string();
        let superseded = self.tracker.register(&correlation_id, target.clone(), handler, || {
            self.db.store_staging_task(&StagingTaskRecord {
                correlation_id: correlation_id.clone(),
                target_guid: target.guid().to_string(),
                kind: target.kind(),
                worker_id: None,
                created_at: Utc::now(),
            })?;
            if let Err(e) = target.mark_staging(&self.db, &correlation_id) {
                self.db.delete_staging_task(&correlation_id)?;
                return Err(e);
            }
            Ok(())
        })?;
        if let Some(superseded) = superseded {
            crate::log_staging_info!(
                "Staging {} for {} supersedes {}",
                correlation_id,
                target.guid(),
                superseded
            );
            self.db.delete_staging_task(&superseded)?;
        }

        let requirements = target.requirements();
        let worker_id = match self.registry.select_worker(&requirements) {
            Ok(Some(worker_id)) => worker_id,
            Ok(None) => {
                let error = StagerError::Capacity(format!(
                    "no worker for stack {} with {} MB memory, {} MB disk",
                    requirements.stack, requirements.memory_mb, requirements.disk_mb
                ));
                return Err(self.fail_dispatch(&correlation_id, target.guid(), error).await);
            }
            Err(e) => {
                crate::log_staging_error!(
                    "Worker selection failed for {} (correlation_id={}): {}",
                    target.guid(),
                    correlation_id,
                    e
                );
                let error = StagerError::Server("worker selection failed".to_string());
                return Err(self.fail_dispatch(&correlation_id, target.guid(), error).await);
            }
        };

        let reply_subject = self.config.staging.reply_subject(&correlation_id);
        let consumer = self.bus.subscribe(&reply_subject).await;
        let waiter = {
            let tasks = Arc::clone(self);
            let correlation_id = correlation_id.clone();
            let deadline = Instant::now() + self.config.staging.timeout();
            tokio::spawn(async move {
                tasks.await_reply(correlation_id, consumer, deadline).await;
            })
        };
        self.tracker.attach_waiter(&correlation_id, waiter)?;

        let request = self.build_request(target.as_ref(), &correlation_id, &reply_subject);
        let request_subject = self.config.staging.request_subject(&worker_id);
        if let Err(e) = self
            .bus
            .publish(&request_subject, Event::StagingRequested(request))
            .await
        {
            crate::log_staging_error!(
                "Failed to publish staging request {} for {}: {}",
                correlation_id,
                target.guid(),
                e
            );
            return Err(self.fail_dispatch(&correlation_id, target.guid(), e.into()).await);
        }

        self.registry.reserve(&worker_id, &requirements)?;
        let worker = worker_id.clone();
        self.db
            .modify(&self.db.staging_tasks_tree, &correlation_id, |record: &mut StagingTaskRecord| {
                record.worker_id = Some(worker.clone());
                Ok(())
            })?;

        crate::log_staging_info!(
            "Dispatched staging correlation_id={} app_id={} to worker {}",
            correlation_id,
            target.guid(),
            worker_id
        );
        Ok(StagingHandle {
            correlation_id,
            worker_id,
        })
    }

    /// Apply `result` to the attempt identified by `correlation_id`.
    ///
    /// Only the first delivery for an id is applied. Later deliveries, and
    /// deliveries for superseded ids, change nothing.
    pub async fn complete(
        &self,
        correlation_id: &str,
        result: StagingResult,
        source: CompletionSource,
    ) -> StagerResult<ApplyOutcome> {
        match self.tracker.claim(correlation_id)? {
            Claim::Fresh(pending) => {
                let target_guid = pending.target.guid().to_string();
                let applied = self.apply(correlation_id, pending.target.as_ref(), &result);
                let outcome = match applied {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        self.tracker.release(correlation_id, pending)?;
                        return Err(e);
                    }
                };
                self.tracker.settle(correlation_id, &target_guid)?;
                if !source.is_waiter() {
                    if let Some(waiter) = &pending.waiter {
                        waiter.abort();
                    }
                }
                if outcome == ApplyOutcome::Applied {
                    if let Err(e) = pending
                        .handler
                        .staging_completed(pending.target.as_ref(), &result)
                        .await
                    {
                        crate::log_staging_error!(
                            "Post-staging action failed for {} (correlation_id={}): {}",
                            target_guid,
                            correlation_id,
                            e
                        );
                    }
                }
                crate::log_staging_info!(
                    "Staging correlation_id={} app_id={} completed via {:?}: {:?}",
                    correlation_id,
                    target_guid,
                    source,
                    outcome
                );
                Ok(outcome)
            }
            Claim::InProgress => {
                crate::log_staging_debug!(
                    "Ignoring {:?} result for correlation_id={} while another delivery applies it",
                    source,
                    correlation_id
                );
                Ok(ApplyOutcome::Duplicate)
            }
            Claim::AlreadyApplied => {
                crate::log_staging_debug!(
                    "Ignoring duplicate {:?} result for correlation_id={}",
                    source,
                    correlation_id
                );
                Ok(ApplyOutcome::Duplicate)
            }
            Claim::Superseded => {
                crate::log_staging_info!(
                    "Discarding {:?} result for superseded correlation_id={}",
                    source,
                    correlation_id
                );
                Ok(ApplyOutcome::Superseded)
            }
            Claim::Unknown => self.complete_untracked(correlation_id, &result, source),
        }
    }

    /// Abandon the attempt in flight for `target_guid`.
    pub fn cancel(&self, target_guid: &str) -> StagerResult<Option<String>> {
        let cancelled = self.tracker.cancel_target(target_guid)?;
        if let Some(correlation_id) = &cancelled {
            self.db.delete_staging_task(correlation_id)?;
            crate::log_staging_info!(
                "Cancelled staging correlation_id={} for {}",
                correlation_id,
                target_guid
            );
        }
        Ok(cancelled)
    }

    /// Result for an id this process is not tracking, e.g. after a restart.
    ///
    /// The persisted mapping still routes it to its target and the row guard
    /// keeps it exactly-once, but no post-staging handler runs.
    fn complete_untracked(
        &self,
        correlation_id: &str,
        result: &StagingResult,
        source: CompletionSource,
    ) -> StagerResult<ApplyOutcome> {
        let record = match self.db.get_staging_task(correlation_id)? {
            Some(record) => record,
            None => {
                crate::log_staging_warn!(
                    "Discarding {:?} result for unknown correlation_id={}",
                    source,
                    correlation_id
                );
                return Ok(ApplyOutcome::Missing);
            }
        };
        match resolve_target(&self.db, &record.target_guid, &self.config)? {
            Some(target) => self.apply(correlation_id, target.as_ref(), result),
            None => {
                self.db.delete_staging_task(correlation_id)?;
                Ok(ApplyOutcome::Missing)
            }
        }
    }

    fn apply(
        &self,
        correlation_id: &str,
        target: &dyn Stageable,
        result: &StagingResult,
    ) -> StagerResult<ApplyOutcome> {
        let outcome = target.apply(&self.db, result).map_err(|e| {
            crate::log_staging_error!(
                "Failed to apply staging result correlation_id={} app_id={}: {}",
                correlation_id,
                target.guid(),
                e
            );
            if e.is_api_error() {
                e
            } else {
                StagerError::Server("failed to apply staging result".to_string())
            }
        })?;
        self.db.delete_staging_task(correlation_id)?;
        Ok(outcome)
    }

    /// Wait for the bus reply or the deadline and complete the attempt.
    ///
    /// If applying a bus reply fails the waiter keeps listening until the
    /// deadline. A failed timeout is retried a few times.
    async fn await_reply(
        self: Arc<Self>,
        correlation_id: String,
        mut consumer: crate::bus::AsyncConsumer,
        deadline: Instant,
    ) {
        let mut timeout_attempts = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let (result, source) = match consumer.recv_timeout(remaining).await {
                Ok(Event::StagingReplied(reply)) => {
                    (reply.into_result(&correlation_id), CompletionSource::BusReply)
                }
                Ok(other) => {
                    crate::log_staging_debug!(
                        "Ignoring {} on reply subject {}",
                        other.event_type(),
                        consumer.subject()
                    );
                    continue;
                }
                Err(AsyncRecvError::Timeout) => {
                    crate::log_staging_warn!(
                        "Staging correlation_id={} timed out after {}s",
                        correlation_id,
                        self.config.staging.timeout_secs
                    );
                    let error = StagerError::Timeout(self.config.staging.timeout_secs);
                    (
                        StagingResult::from_error(&correlation_id, &error),
                        CompletionSource::Timeout,
                    )
                }
                Err(AsyncRecvError::Disconnected) => return,
            };

            match self.complete(&correlation_id, result, source).await {
                Ok(_) => return,
                Err(e) => {
                    crate::log_staging_error!(
                        "Completing correlation_id={} from {:?} failed: {}",
                        correlation_id,
                        source,
                        e
                    );
                    if source == CompletionSource::Timeout {
                        timeout_attempts += 1;
                        if timeout_attempts >= TIMEOUT_APPLY_ATTEMPTS {
                            return;
                        }
                        tokio::time::sleep(TIMEOUT_RETRY_DELAY).await;
                    }
                }
            }
        }
    }

    /// Record `error` as the outcome of an attempt that never reached a worker.
    async fn fail_dispatch(&self, correlation_id: &str, target_guid: &str, error: StagerError) -> StagerError {
        crate::log_staging_warn!(
            "Staging correlation_id={} app_id={} failed before dispatch: {}",
            correlation_id,
            target_guid,
            error
        );
        let result = StagingResult::from_error(correlation_id, &error);
        if let Err(e) = self
            .complete(correlation_id, result, CompletionSource::Internal)
            .await
        {
            crate::log_staging_error!(
                "Recording dispatch failure for correlation_id={} failed: {}",
                correlation_id,
                e
            );
        }
        error
    }

    fn build_request(
        &self,
        target: &dyn Stageable,
        correlation_id: &str,
        reply_subject: &str,
    ) -> StagingRequest {
        let requirements = target.requirements();
        StagingRequest {
            correlation_id: correlation_id.to_string(),
            app_id: target.guid().to_string(),
            stack: requirements.stack,
            memory_mb: requirements.memory_mb,
            disk_mb: requirements.disk_mb,
            file_descriptors: requirements.file_descriptors,
            buildpack: target.buildpack(),
            download_uri: self.urls.package_download_url(target.package_key()),
            upload_uri: self.urls.droplet_upload_url(target.guid()),
            buildpack_cache_download_uri: self.urls.buildpack_cache_download_url(target.cache_key()),
            buildpack_cache_upload_uri: self.urls.buildpack_cache_upload_url(target.cache_key()),
            reply_to: reply_subject.to_string(),
            callback: CallbackInfo {
                url: self.config.internal_api.callback_url.clone(),
                user: self.config.internal_api.user.clone(),
                password: self.config.internal_api.password.clone(),
            },
            start_instance: target.starts_instance(),
        }
    }
}
