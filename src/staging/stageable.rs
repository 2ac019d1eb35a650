//! Things that can be staged into a droplet.
//!
//! An app stages into itself. A package stages into a separate droplet record,
//! so its identity is the droplet's guid. Both write only the staging-owned
//! fields of their row when a result arrives.

use super::message::{BuildpackSpec, StagingOutcome, StagingResult, StagingSuccess};
use crate::config::{PackageStagingDefaults, StagerConfig};
use crate::error::{StagerError, StagerResult};
use crate::registry::StagingRequirements;
use crate::store::{
    AppRecord, DropletRecord, PackageRecord, StagingBackend, StagingDb, StagingStatus, TargetKind,
};
use std::sync::Arc;

/// Result of applying a staging result to the persisted target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The result changed the record
    Applied,
    /// This attempt's result was already applied
    Duplicate,
    /// A newer attempt owns the record now
    Superseded,
    /// The target no longer exists
    Missing,
}

pub trait Stageable: Send + Sync {
    /// Guid of the record the result is written into
    fn guid(&self) -> &str;
    fn kind(&self) -> TargetKind;
    fn requirements(&self) -> StagingRequirements;
    fn buildpack(&self) -> BuildpackSpec;
    /// Blobstore key of the bits to stage
    fn package_key(&self) -> &str;
    /// Key of the buildpack cache shared between attempts
    fn cache_key(&self) -> &str;
    fn staging_backend(&self) -> StagingBackend;
    fn staging_failed(&self) -> bool;
    /// Correlation id of the attempt that currently owns the target
    fn staging_task_id(&self) -> Option<&str>;
    /// Whether the worker should start an instance from the new droplet
    fn starts_instance(&self) -> bool;

    /// Record `correlation_id` as the attempt that owns the target.
    fn mark_staging(&self, db: &StagingDb, correlation_id: &str) -> StagerResult<()>;

    /// Write `result` into the target if `result` belongs to its current attempt.
    fn apply(&self, db: &StagingDb, result: &StagingResult) -> StagerResult<ApplyOutcome>;
}

/// Decide whether the result for `correlation_id` may still be applied to a
/// row whose current attempt and status are given.
fn guard(
    current_task: Option<&str>,
    status: StagingStatus,
    correlation_id: &str,
) -> Option<ApplyOutcome> {
    if current_task != Some(correlation_id) {
        Some(ApplyOutcome::Superseded)
    } else if status != StagingStatus::Staging {
        Some(ApplyOutcome::Duplicate)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct AppTarget {
    app: AppRecord,
}

impl AppTarget {
    pub fn new(app: AppRecord) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &AppRecord {
        &self.app
    }

    fn apply_success(app: &mut AppRecord, success: &StagingSuccess) {
        app.staging_status = StagingStatus::Staged;
        app.staging_failure = None;
        app.detected_buildpack = success.detected_buildpack.clone();
        app.detected_buildpack_key = success.buildpack_key.clone();
        if let Some(droplet_hash) = &success.droplet_sha1 {
            app.droplet_hash = Some(droplet_hash.clone());
            if let Some(command) = &success.detected_start_command {
                app.detected_start_command = command.clone();
            }
        }
    }
}

impl Stageable for AppTarget {
    fn guid(&self) -> &str {
        &self.app.guid
    }

    fn kind(&self) -> TargetKind {
        TargetKind::App
    }

    fn requirements(&self) -> StagingRequirements {
        StagingRequirements {
            stack: self.app.stack.clone(),
            memory_mb: self.app.memory_mb,
            disk_mb: self.app.disk_mb,
            file_descriptors: self.app.file_descriptors,
        }
    }

    fn buildpack(&self) -> BuildpackSpec {
        BuildpackSpec::from_option(self.app.buildpack.as_deref())
    }

    fn package_key(&self) -> &str {
        &self.app.guid
    }

    fn cache_key(&self) -> &str {
        &self.app.guid
    }

    fn staging_backend(&self) -> StagingBackend {
        self.app.staging_backend
    }

    fn staging_failed(&self) -> bool {
        self.app.staging_failed()
    }

    fn staging_task_id(&self) -> Option<&str> {
        self.app.staging_task_id.as_deref()
    }

    fn starts_instance(&self) -> bool {
        self.app.is_started()
    }

    fn mark_staging(&self, db: &StagingDb, correlation_id: &str) -> StagerResult<()> {
        let cid = correlation_id.to_string();
        db.modify_app(&self.app.guid, |app| {
            app.staging_status = StagingStatus::Staging;
            app.staging_task_id = Some(cid.clone());
            app.staging_failure = None;
            Ok(())
        })?
        .ok_or_else(|| StagerError::NotFound(format!("App {}", self.app.guid)))
    }

    fn apply(&self, db: &StagingDb, result: &StagingResult) -> StagerResult<ApplyOutcome> {
        let outcome = db.modify_app(&self.app.guid, |app| {
            if let Some(skip) = guard(
                app.staging_task_id.as_deref(),
                app.staging_status,
                &result.correlation_id,
            ) {
                return Ok(skip);
            }
            match &result.outcome {
                StagingOutcome::Success(success) => Self::apply_success(app, success),
                StagingOutcome::Failure(failure) => {
                    app.staging_status = StagingStatus::Failed;
                    app.staging_failure = Some(failure.clone());
                }
            }
            Ok(ApplyOutcome::Applied)
        })?;
        Ok(outcome.unwrap_or(ApplyOutcome::Missing))
    }
}

/// A package staged into a droplet, with the placeholders a package lacks
/// supplied by configuration.
#[derive(Debug, Clone)]
pub struct PackageTarget {
    package: PackageRecord,
    droplet: DropletRecord,
    defaults: PackageStagingDefaults,
}

impl PackageTarget {
    pub fn new(package: PackageRecord, droplet: DropletRecord, defaults: PackageStagingDefaults) -> Self {
        Self {
            package,
            droplet,
            defaults,
        }
    }

    pub fn droplet(&self) -> &DropletRecord {
        &self.droplet
    }

    fn apply_success(droplet: &mut DropletRecord, success: &StagingSuccess) {
        droplet.state = StagingStatus::Staged;
        droplet.failure = None;
        droplet.detected_buildpack = success.detected_buildpack.clone();
        droplet.buildpack_key = success.buildpack_key.clone();
        if let Some(droplet_hash) = &success.droplet_sha1 {
            droplet.droplet_hash = Some(droplet_hash.clone());
            if let Some(command) = &success.detected_start_command {
                droplet.detected_start_command = command.clone();
            }
        }
    }
}

impl Stageable for PackageTarget {
    fn guid(&self) -> &str {
        &self.droplet.guid
    }

    fn kind(&self) -> TargetKind {
        TargetKind::Droplet
    }

    fn requirements(&self) -> StagingRequirements {
        StagingRequirements {
            stack: self.defaults.stack.clone(),
            memory_mb: self.defaults.memory_mb,
            disk_mb: self.defaults.disk_mb,
            file_descriptors: self.defaults.file_descriptors,
        }
    }

    fn buildpack(&self) -> BuildpackSpec {
        BuildpackSpec::from_option(self.droplet.buildpack.as_deref())
    }

    fn package_key(&self) -> &str {
        &self.package.guid
    }

    fn cache_key(&self) -> &str {
        &self.package.guid
    }

    fn staging_backend(&self) -> StagingBackend {
        self.droplet.staging_backend
    }

    fn staging_failed(&self) -> bool {
        self.droplet.state == StagingStatus::Failed
    }

    fn staging_task_id(&self) -> Option<&str> {
        self.droplet.staging_task_id.as_deref()
    }

    fn starts_instance(&self) -> bool {
        false
    }

    fn mark_staging(&self, db: &StagingDb, correlation_id: &str) -> StagerResult<()> {
        let cid = correlation_id.to_string();
        db.modify_droplet(&self.droplet.guid, |droplet| {
            droplet.state = StagingStatus::Staging;
            droplet.staging_task_id = Some(cid.clone());
            droplet.failure = None;
            Ok(())
        })?
        .ok_or_else(|| StagerError::NotFound(format!("Droplet {}", self.droplet.guid)))
    }

    fn apply(&self, db: &StagingDb, result: &StagingResult) -> StagerResult<ApplyOutcome> {
        let outcome = db.modify_droplet(&self.droplet.guid, |droplet| {
            if let Some(skip) = guard(
                droplet.staging_task_id.as_deref(),
                droplet.state,
                &result.correlation_id,
            ) {
                return Ok(skip);
            }
            match &result.outcome {
                StagingOutcome::Success(success) => Self::apply_success(droplet, success),
                StagingOutcome::Failure(failure) => {
                    droplet.state = StagingStatus::Failed;
                    droplet.failure = Some(failure.clone());
                }
            }
            Ok(ApplyOutcome::Applied)
        })?;
        Ok(outcome.unwrap_or(ApplyOutcome::Missing))
    }
}

/// Load the stageable identified by `guid`, looking at apps first and then at
/// droplets.
pub fn resolve_target(
    db: &StagingDb,
    guid: &str,
    config: &StagerConfig,
) -> StagerResult<Option<Arc<dyn Stageable>>> {
    if let Some(app) = db.get_app(guid)? {
        return Ok(Some(Arc::new(AppTarget::new(app))));
    }
    if let Some(droplet) = db.get_droplet(guid)? {
        let package = db
            .get_package(&droplet.package_guid)?
            .ok_or_else(|| StagerError::NotFound(format!("Package {}", droplet.package_guid)))?;
        return Ok(Some(Arc::new(PackageTarget::new(
            package,
            droplet,
            config.package_defaults.clone(),
        ))));
    }
    Ok(None)
}
