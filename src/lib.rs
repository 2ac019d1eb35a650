//! # droplet_stager
//!
//! Staging orchestration core for a platform-as-a-service control plane.
//!
//! Uploaded application bits are turned into runnable droplets by remote
//! workers. This crate selects a worker from the advertised pool, publishes a
//! staging request on the message bus, accepts the result from either the bus
//! reply or the HTTP completion callback, applies it exactly once and then
//! tells the runtime layer what to start.
//!
//! The main entry point is [`StagingNode`], which builds and wires:
//!
//! * [`registry::WorkerRegistry`] for worker advertisements and selection
//! * [`staging::StagingTasks`] and [`staging::Stager`] for staging attempts
//! * [`gateway::CompletionGateway`] for HTTP completion callbacks
//! * [`packages::PackagesHandler`] for the package upload and staging surface
//! * [`observer::AppObserver`] for app lifecycle events

pub mod blobstore;
pub mod bus;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod node;
pub mod observer;
pub mod packages;
pub mod registry;
pub mod runtime;
pub mod staging;
pub mod store;

pub use config::{load_stager_config, StagerConfig, StartPolicy};
pub use error::{StagerError, StagerResult};
pub use node::StagingNode;
