use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Heartbeat message a worker publishes on the advertisement subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerHeartbeat {
    pub worker_id: String,
    pub stacks: Vec<String>,
    pub available_memory_mb: u64,
    pub available_disk_mb: u64,
    pub available_file_descriptors: u64,
}

/// A worker's self-reported capacity, stamped with the time it was received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerAdvertisement {
    pub worker_id: String,
    pub stacks: BTreeSet<String>,
    pub available_memory_mb: u64,
    pub available_disk_mb: u64,
    pub available_file_descriptors: u64,
    pub last_seen: DateTime<Utc>,
}

impl WorkerAdvertisement {
    /// Build an advertisement from a heartbeat received at `now`.
    ///
    /// Worker clocks are not trusted; recency is always the receipt time.
    pub fn from_heartbeat(heartbeat: WorkerHeartbeat, now: DateTime<Utc>) -> Self {
        Self {
            worker_id: heartbeat.worker_id,
            stacks: heartbeat.stacks.into_iter().collect(),
            available_memory_mb: heartbeat.available_memory_mb,
            available_disk_mb: heartbeat.available_disk_mb,
            available_file_descriptors: heartbeat.available_file_descriptors,
            last_seen: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.last_seen > ttl
    }

    pub fn satisfies(&self, requirements: &StagingRequirements) -> bool {
        self.stacks.contains(&requirements.stack)
            && self.available_memory_mb >= requirements.memory_mb
            && self.available_disk_mb >= requirements.disk_mb
            && self.available_file_descriptors >= requirements.file_descriptors
    }
}

/// Stack and resources a staging attempt needs from a worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StagingRequirements {
    pub stack: String,
    pub memory_mb: u64,
    pub disk_mb: u64,
    pub file_descriptors: u64,
}
