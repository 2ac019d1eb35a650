use super::advertisement::{StagingRequirements, WorkerAdvertisement};
use crate::error::{StagerError, StagerResult};
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::RwLock;

/// Live set of staging-capable workers.
///
/// Heartbeat refreshes, eviction sweeps and selection all go through the same
/// lock, so selection never observes a half-written advertisement.
pub struct WorkerRegistry {
    advertisements: RwLock<HashMap<String, WorkerAdvertisement>>,
    ttl: chrono::Duration,
}

impl WorkerRegistry {
    pub fn new(ttl: std::time::Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(10));
        Self {
            advertisements: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Insert a new advertisement or replace the worker's previous one.
    pub fn register_or_refresh(&self, advertisement: WorkerAdvertisement) -> StagerResult<()> {
        let mut ads = self.write()?;
        match ads.get_mut(&advertisement.worker_id) {
            Some(existing) => *existing = advertisement,
            None => {
                crate::log_registry_info!(
                    "Registered worker {} with stacks {:?}",
                    advertisement.worker_id,
                    advertisement.stacks
                );
                ads.insert(advertisement.worker_id.clone(), advertisement);
            }
        }
        Ok(())
    }

    /// Remove every advertisement not refreshed within the TTL.
    ///
    /// Returns the evicted worker ids.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> StagerResult<Vec<String>> {
        let mut ads = self.write()?;
        let expired: Vec<String> = ads
            .values()
            .filter(|ad| ad.is_expired(now, self.ttl))
            .map(|ad| ad.worker_id.clone())
            .collect();
        for worker_id in &expired {
            ads.remove(worker_id);
            crate::log_registry_warn!("Evicted worker {} after missed heartbeats", worker_id);
        }
        Ok(expired)
    }

    /// Pick a worker for `requirements` using the current time.
    pub fn select_worker(&self, requirements: &StagingRequirements) -> StagerResult<Option<String>> {
        self.select_worker_at(requirements, Utc::now())
    }

    /// Pick the best-fit worker at `now`.
    ///
    /// Candidates must advertise the stack and meet every resource minimum and
    /// must not be past their TTL even if the sweeper has not run yet. Among
    /// them the one with the most free memory wins, then the freshest
    /// heartbeat, then the lowest worker id.
    pub fn select_worker_at(
        &self,
        requirements: &StagingRequirements,
        now: DateTime<Utc>,
    ) -> StagerResult<Option<String>> {
        let ads = self.read()?;
        let chosen = ads
            .values()
            .filter(|ad| !ad.is_expired(now, self.ttl) && ad.satisfies(requirements))
            .min_by_key(|ad| {
                (
                    Reverse(ad.available_memory_mb),
                    Reverse(ad.last_seen),
                    ad.worker_id.clone(),
                )
            })
            .map(|ad| ad.worker_id.clone());

        match &chosen {
            Some(worker_id) => crate::log_registry_debug!(
                "Selected worker {} for stack {} ({} MB)",
                worker_id,
                requirements.stack,
                requirements.memory_mb
            ),
            None => crate::log_registry_warn!(
                "No worker satisfies stack {} memory {} MB disk {} MB fds {}",
                requirements.stack,
                requirements.memory_mb,
                requirements.disk_mb,
                requirements.file_descriptors
            ),
        }
        Ok(chosen)
    }

    /// Deduct a dispatched request from the worker's advertised capacity until
    /// its next heartbeat replaces the numbers.
    pub fn reserve(&self, worker_id: &str, requirements: &StagingRequirements) -> StagerResult<()> {
        let mut ads = self.write()?;
        if let Some(ad) = ads.get_mut(worker_id) {
            ad.available_memory_mb = ad.available_memory_mb.saturating_sub(requirements.memory_mb);
            ad.available_disk_mb = ad.available_disk_mb.saturating_sub(requirements.disk_mb);
        }
        Ok(())
    }

    pub fn get(&self, worker_id: &str) -> StagerResult<Option<WorkerAdvertisement>> {
        Ok(self.read()?.get(worker_id).cloned())
    }

    pub fn len(&self) -> usize {
        self.read().map(|ads| ads.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(
        &self,
    ) -> StagerResult<std::sync::RwLockReadGuard<'_, HashMap<String, WorkerAdvertisement>>> {
        self.advertisements
            .read()
            .map_err(|_| StagerError::Server("worker registry lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> StagerResult<std::sync::RwLockWriteGuard<'_, HashMap<String, WorkerAdvertisement>>> {
        self.advertisements
            .write()
            .map_err(|_| StagerError::Server("worker registry lock poisoned".to_string()))
    }
}
