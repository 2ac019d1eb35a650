//! Background jobs that move or delete bytes

use super::db::StagingDb;
use crate::error::StagerResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobstoreKind {
    Package,
    BuildpackCache,
    Droplet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum Job {
    /// Move uploaded bits from a local path into the package blobstore
    PackageBits { package_guid: String, bits_path: String },
    /// Remove a blob by key
    BlobstoreDelete { key: String, blobstore: BlobstoreKind },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueuedJob {
    pub id: String,
    pub queue: String,
    pub job: Job,
    pub enqueued_at: DateTime<Utc>,
}

/// Queueing collaborator for byte-transfer and cleanup jobs.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, queue: &str, job: Job) -> StagerResult<EnqueuedJob>;
}

/// Durable queue persisted in the `jobs` tree; workers elsewhere drain it.
#[derive(Clone)]
pub struct SledJobQueue {
    db: StagingDb,
}

impl SledJobQueue {
    pub fn new(db: StagingDb) -> Self {
        Self { db }
    }

    /// Jobs waiting on `queue`, oldest first
    pub fn list(&self, queue: &str) -> StagerResult<Vec<EnqueuedJob>> {
        let prefix = format!("{}:", queue);
        let mut jobs = Vec::new();
        for entry in self.db.jobs_tree.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = entry?;
            jobs.push(serde_json::from_slice::<EnqueuedJob>(&bytes)?);
        }
        jobs.sort_by_key(|job| job.enqueued_at);
        Ok(jobs)
    }
}

impl JobQueue for SledJobQueue {
    fn enqueue(&self, queue: &str, job: Job) -> StagerResult<EnqueuedJob> {
        let enqueued = EnqueuedJob {
            id: Uuid::new_v4().to_string(),
            queue: queue.to_string(),
            job,
            enqueued_at: Utc::now(),
        };
        let key = format!("{}:{}", queue, enqueued.id);
        self.db.store_in_tree(&self.db.jobs_tree, &key, &enqueued)?;
        log::debug!("Enqueued {:?} on {}", enqueued.job, queue);
        Ok(enqueued)
    }
}
