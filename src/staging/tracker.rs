//! In-memory bookkeeping of in-flight staging attempts.
//!
//! Every attempt is registered under its correlation id. The first delivery
//! to claim an id gets the attempt. The claim is settled once the result is
//! applied, or released back to pending if applying failed, so a retry or the
//! deadline can still finish the attempt. Registering a new attempt for a
//! target that still has one in flight supersedes the old id.

use super::stageable::Stageable;
use super::task::CompletionHandler;
use crate::error::{StagerError, StagerResult};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

const FINISHED_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finished {
    Claimed,
    Applied,
    Superseded,
}

struct PendingEntry {
    target: Arc<dyn Stageable>,
    handler: Arc<dyn CompletionHandler>,
    waiter: Option<JoinHandle<()>>,
}

/// An attempt handed to whoever claimed its correlation id.
pub struct PendingCompletion {
    pub target: Arc<dyn Stageable>,
    pub handler: Arc<dyn CompletionHandler>,
    pub waiter: Option<JoinHandle<()>>,
}

pub enum Claim {
    Fresh(PendingCompletion),
    /// Another delivery holds the claim and is applying its result
    InProgress,
    AlreadyApplied,
    Superseded,
    /// Never seen by this process, or forgotten
    Unknown,
}

struct TrackerState {
    pending: HashMap<String, PendingEntry>,
    by_target: HashMap<String, String>,
    finished: LruCache<String, Finished>,
}

pub struct StagingTracker {
    state: Mutex<TrackerState>,
}

impl StagingTracker {
    pub fn new() -> Self {
        let capacity = NonZeroUsize::new(FINISHED_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(TrackerState {
                pending: HashMap::new(),
                by_target: HashMap::new(),
                finished: LruCache::new(capacity),
            }),
        }
    }

    /// Register a new attempt and return the id it superseded, if any.
    ///
    /// `persist` writes the attempt into the target's row. It runs under the
    /// tracker lock, so the row and the tracker always name the same live
    /// attempt. Nothing is registered if it fails.
    pub fn register<F>(
        &self,
        correlation_id: &str,
        target: Arc<dyn Stageable>,
        handler: Arc<dyn CompletionHandler>,
        persist: F,
    ) -> StagerResult<Option<String>>
    where
        F: FnOnce() -> StagerResult<()>,
    {
        let mut state = self.lock()?;
        persist()?;

        let target_guid = target.guid().to_string();
        let superseded = state
            .by_target
            .insert(target_guid, correlation_id.to_string());

        if let Some(old_id) = &superseded {
            if let Some(old) = state.pending.remove(old_id) {
                if let Some(waiter) = old.waiter {
                    waiter.abort();
                }
            }
            state.finished.put(old_id.clone(), Finished::Superseded);
        }

        state.pending.insert(
            correlation_id.to_string(),
            PendingEntry {
                target,
                handler,
                waiter: None,
            },
        );
        Ok(superseded)
    }

    /// Attach the task that waits for the bus reply or the deadline.
    ///
    /// If the attempt was already claimed the handle is dropped, which
    /// detaches the task without cancelling it.
    pub fn attach_waiter(&self, correlation_id: &str, waiter: JoinHandle<()>) -> StagerResult<()> {
        let mut state = self.lock()?;
        if let Some(entry) = state.pending.get_mut(correlation_id) {
            entry.waiter = Some(waiter);
        }
        Ok(())
    }

    /// Take ownership of the attempt for `correlation_id`.
    ///
    /// A fresh claim must be followed by [`StagingTracker::settle`] or
    /// [`StagingTracker::release`].
    pub fn claim(&self, correlation_id: &str) -> StagerResult<Claim> {
        let mut state = self.lock()?;
        if let Some(entry) = state.pending.remove(correlation_id) {
            state
                .finished
                .put(correlation_id.to_string(), Finished::Claimed);
            return Ok(Claim::Fresh(PendingCompletion {
                target: entry.target,
                handler: entry.handler,
                waiter: entry.waiter,
            }));
        }

        Ok(match state.finished.get(correlation_id) {
            Some(Finished::Claimed) => Claim::InProgress,
            Some(Finished::Applied) => Claim::AlreadyApplied,
            Some(Finished::Superseded) => Claim::Superseded,
            None => Claim::Unknown,
        })
    }

    /// The claimed result was applied; the attempt is finished.
    pub fn settle(&self, correlation_id: &str, target_guid: &str) -> StagerResult<()> {
        let mut state = self.lock()?;
        if state.by_target.get(target_guid).map(String::as_str) == Some(correlation_id) {
            state.by_target.remove(target_guid);
        }
        if state.finished.peek(correlation_id) == Some(&Finished::Claimed) {
            state
                .finished
                .put(correlation_id.to_string(), Finished::Applied);
        }
        Ok(())
    }

    /// Applying the claimed result failed; make the attempt pending again.
    ///
    /// If the attempt was superseded or cancelled in the meantime it is
    /// dropped instead and its waiter aborted.
    pub fn release(&self, correlation_id: &str, claimed: PendingCompletion) -> StagerResult<()> {
        let mut state = self.lock()?;
        let target_guid = claimed.target.guid().to_string();
        let still_live =
            state.by_target.get(&target_guid).map(String::as_str) == Some(correlation_id);

        if !still_live {
            if let Some(waiter) = claimed.waiter {
                waiter.abort();
            }
            state
                .finished
                .put(correlation_id.to_string(), Finished::Superseded);
            return Ok(());
        }

        state.finished.pop(correlation_id);
        state.pending.insert(
            correlation_id.to_string(),
            PendingEntry {
                target: claimed.target,
                handler: claimed.handler,
                waiter: claimed.waiter,
            },
        );
        Ok(())
    }

    /// Drop the in-flight attempt for `target_guid` so its result is discarded.
    pub fn cancel_target(&self, target_guid: &str) -> StagerResult<Option<String>> {
        let mut state = self.lock()?;
        let cancelled = state.by_target.remove(target_guid);
        if let Some(correlation_id) = &cancelled {
            if let Some(entry) = state.pending.remove(correlation_id) {
                if let Some(waiter) = entry.waiter {
                    waiter.abort();
                }
            }
            state
                .finished
                .put(correlation_id.clone(), Finished::Superseded);
        }
        Ok(cancelled)
    }

    /// Correlation id of the attempt in flight for `target_guid`.
    pub fn in_flight(&self, target_guid: &str) -> StagerResult<Option<String>> {
        Ok(self.lock()?.by_target.get(target_guid).cloned())
    }

    pub fn pending_count(&self) -> usize {
        self.lock().map(|state| state.pending.len()).unwrap_or(0)
    }

    fn lock(&self) -> StagerResult<MutexGuard<'_, TrackerState>> {
        self.state
            .lock()
            .map_err(|_| StagerError::Server("staging tracker lock poisoned".to_string()))
    }
}

impl Default for StagingTracker {
    fn default() -> Self {
        Self::new()
    }
}
