//! # Persistent store
//!
//! Apps, droplets, packages, spaces and the correlation-id mapping of staging
//! attempts, plus the job queue used for byte transfer and blob cleanup.

pub mod db;
pub mod jobs;
pub mod models;

pub use db::StagingDb;
pub use jobs::{BlobstoreKind, EnqueuedJob, Job, JobQueue, SledJobQueue};
pub use models::{
    AppRecord, AppState, DropletRecord, PackageRecord, PackageState, PackageType, SpaceRecord,
    StagingBackend, StagingFailure, StagingStatus, StagingTaskRecord, TargetKind,
};
