//! Reacts to app lifecycle events with staging, runtime and cleanup actions

use crate::config::StagerConfig;
use crate::error::{StagerError, StagerResult};
use crate::runtime::Runner;
use crate::staging::{Stager, StagingHandle};
use crate::store::{AppRecord, BlobstoreKind, Job, JobQueue, StagingDb};
use std::sync::Arc;

/// Which fields an app update touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppChanges {
    pub state: bool,
    pub instances: bool,
}

impl AppChanges {
    pub fn state() -> Self {
        Self {
            state: true,
            ..Self::default()
        }
    }

    pub fn instances() -> Self {
        Self {
            instances: true,
            ..Self::default()
        }
    }
}

/// What an update event led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateAction {
    None,
    Stopped,
    Staging(StagingHandle),
    Started,
    Scaled,
}

pub struct AppObserver {
    db: StagingDb,
    stager: Arc<Stager>,
    runner: Arc<dyn Runner>,
    jobs: Arc<dyn JobQueue>,
    config: Arc<StagerConfig>,
}

impl AppObserver {
    pub fn new(
        db: StagingDb,
        stager: Arc<Stager>,
        runner: Arc<dyn Runner>,
        jobs: Arc<dyn JobQueue>,
        config: Arc<StagerConfig>,
    ) -> Self {
        Self {
            db,
            stager,
            runner,
            jobs,
            config,
        }
    }

    /// Stop a deleted app, drop its in-flight staging and schedule cleanup of
    /// its buildpack cache and, if bits were ever uploaded, its package.
    pub async fn deleted(&self, app: &AppRecord) -> StagerResult<()> {
        self.runner.stop(app).await?;
        self.stager.tasks().cancel(&app.guid)?;

        let queue = &self.config.jobs.generic_queue;
        self.jobs.enqueue(
            queue,
            Job::BlobstoreDelete {
                key: app.guid.clone(),
                blobstore: BlobstoreKind::BuildpackCache,
            },
        )?;
        if app.package_hash.is_some() {
            self.jobs.enqueue(
                queue,
                Job::BlobstoreDelete {
                    key: app.guid.clone(),
                    blobstore: BlobstoreKind::Package,
                },
            )?;
        }
        crate::log_observer_info!("Cleaned up after deleted app {}", app.guid);
        Ok(())
    }

    /// React to an update. A state change takes precedence over an instance
    /// count change.
    pub async fn updated(&self, app_guid: &str, changes: AppChanges) -> StagerResult<UpdateAction> {
        let app = self.app(app_guid)?;

        if changes.state {
            if !app.is_started() {
                self.runner.stop(&app).await?;
                return Ok(UpdateAction::Stopped);
            }
            if app.needs_staging() {
                crate::log_observer_info!("App {} started and needs staging", app.guid);
                let handle = self.stager.stage_app(&app.guid).await?;
                return Ok(UpdateAction::Staging(handle));
            }
            self.runner.start(&app, 0).await?;
            return Ok(UpdateAction::Started);
        }

        if changes.instances && app.is_started() {
            self.runner.scale(&app).await?;
            return Ok(UpdateAction::Scaled);
        }
        Ok(UpdateAction::None)
    }

    /// Push the app's current routes to the runtime while it is running.
    pub async fn routes_changed(&self, app_guid: &str) -> StagerResult<()> {
        let app = self.app(app_guid)?;
        if app.is_started() {
            self.runner.update_routes(&app).await?;
        }
        Ok(())
    }

    fn app(&self, guid: &str) -> StagerResult<AppRecord> {
        self.db
            .get_app(guid)?
            .ok_or_else(|| StagerError::NotFound(format!("App {}", guid)))
    }
}
