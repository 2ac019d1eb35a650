//! Per-app staging policy and post-staging effects

use super::message::{StagingOutcome, StagingResult};
use super::stageable::{AppTarget, PackageTarget, Stageable};
use super::task::{CompletionHandler, StagingHandle, StagingTasks};
use crate::config::{StagerConfig, StartPolicy};
use crate::error::{StagerError, StagerResult};
use crate::runtime::Runner;
use crate::store::{AppRecord, DropletRecord, PackageRecord, StagingDb, StagingStatus, TargetKind};
use async_trait::async_trait;
use std::sync::Arc;

/// Decides when and how targets are staged and drives the runtime once an
/// app has a new droplet.
pub struct Stager {
    db: StagingDb,
    tasks: Arc<StagingTasks>,
    runner: Arc<dyn Runner>,
    config: Arc<StagerConfig>,
}

impl Stager {
    pub fn new(
        db: StagingDb,
        tasks: Arc<StagingTasks>,
        runner: Arc<dyn Runner>,
        config: Arc<StagerConfig>,
    ) -> Self {
        Self {
            db,
            tasks,
            runner,
            config,
        }
    }

    pub fn tasks(&self) -> &Arc<StagingTasks> {
        &self.tasks
    }

    /// Check that `app` can be handed to a worker.
    pub fn validate_app(&self, app: &AppRecord) -> StagerResult<()> {
        if app.package_hash.is_none() {
            return Err(StagerError::Validation(
                "The app package is invalid: bits have not been uploaded".to_string(),
            ));
        }
        if self.config.staging.disable_custom_buildpacks && app.has_custom_buildpack() {
            return Err(StagerError::Validation(
                "Custom buildpacks are disabled".to_string(),
            ));
        }
        if app.stack.trim().is_empty() {
            return Err(StagerError::Validation("The stack field is required".to_string()));
        }
        Ok(())
    }

    /// Validate and stage the app, superseding any attempt already in flight.
    pub async fn stage_app(self: &Arc<Self>, app_guid: &str) -> StagerResult<StagingHandle> {
        let app = self
            .db
            .get_app(app_guid)?
            .ok_or_else(|| StagerError::NotFound(format!("App {}", app_guid)))?;
        self.validate_app(&app)?;

        crate::log_staging_info!("Staging app {} on stack {}", app.guid, app.stack);
        let handler: Arc<dyn CompletionHandler> = self.clone();
        self.tasks
            .start(Arc::new(AppTarget::new(app)), handler)
            .await
    }

    /// Clear a previous outcome, including a hard failure, and stage again.
    pub async fn restage_app(self: &Arc<Self>, app_guid: &str) -> StagerResult<StagingHandle> {
        self.db
            .modify_app(app_guid, |app| {
                app.staging_status = StagingStatus::Pending;
                app.staging_failure = None;
                app.droplet_hash = None;
                Ok(())
            })?
            .ok_or_else(|| StagerError::NotFound(format!("App {}", app_guid)))?;

        crate::log_staging_info!("Restaging app {}", app_guid);
        self.stage_app(app_guid).await
    }

    /// Stage `package` into `droplet`.
    pub async fn stage_package(
        self: &Arc<Self>,
        package: PackageRecord,
        droplet: DropletRecord,
    ) -> StagerResult<StagingHandle> {
        crate::log_staging_info!(
            "Staging package {} into droplet {}",
            package.guid,
            droplet.guid
        );
        let target = PackageTarget::new(package, droplet, self.config.package_defaults.clone());
        let handler: Arc<dyn CompletionHandler> = self.clone();
        self.tasks.start(Arc::new(target), handler).await
    }

    /// Whether the worker brought up one instance of the new droplet itself.
    fn started_by_worker(target: &dyn Stageable, result: &StagingResult) -> bool {
        match &result.outcome {
            StagingOutcome::Success(success) => {
                target.starts_instance() && success.droplet_sha1.is_some()
            }
            StagingOutcome::Failure(_) => false,
        }
    }
}

#[async_trait]
impl CompletionHandler for Stager {
    async fn staging_completed(&self, target: &dyn Stageable, result: &StagingResult) -> StagerResult<()> {
        if let StagingOutcome::Failure(failure) = &result.outcome {
            crate::log_staging_warn!(
                "Staging of {} failed ({}): {}",
                target.guid(),
                failure.error_code,
                failure.error_description
            );
            return Ok(());
        }
        if target.kind() != TargetKind::App {
            return Ok(());
        }

        // The runner needs the stored droplet and the current instance count.
        let app = match self.db.get_app(target.guid())? {
            Some(app) => app,
            None => return Ok(()),
        };
        if !app.is_started() {
            return Ok(());
        }

        let started_by_worker = Self::started_by_worker(target, result);
        match (self.config.staging.start_policy, started_by_worker) {
            (StartPolicy::SuppressStart, true) => {
                crate::log_staging_info!(
                    "Worker already started {}; leaving scaling to the runtime",
                    app.guid
                );
                Ok(())
            }
            (StartPolicy::OffsetStarted, true) => self.runner.start(&app, 1).await,
            (_, false) => self.runner.start(&app, 0).await,
        }
    }
}
