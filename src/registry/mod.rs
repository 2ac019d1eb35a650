//! # Worker Registry
//!
//! Tracks staging-capable workers from their periodic heartbeats and picks the
//! best-fit worker for a staging request. Advertisements that are not
//! refreshed within the TTL are never selected and are swept out in the
//! background.

pub mod advertisement;
pub mod listener;
pub mod worker_registry;

pub use advertisement::{StagingRequirements, WorkerAdvertisement, WorkerHeartbeat};
pub use listener::{spawn_eviction_sweeper, spawn_heartbeat_listener};
pub use worker_registry::WorkerRegistry;
