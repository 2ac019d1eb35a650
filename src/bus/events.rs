//! Messages exchanged with workers and the runtime layer
use serde::{Deserialize, Serialize};

use crate::registry::WorkerHeartbeat;
use crate::runtime::RuntimeCommand;
use crate::staging::message::{StagingReply, StagingRequest};

/// Unified event enumeration carried on every bus subject
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// A staging request addressed to one worker
    StagingRequested(StagingRequest),
    /// A worker's reply on the per-attempt reply subject
    StagingReplied(StagingReply),
    /// A worker heartbeat with its current capacity
    WorkerAdvertised(WorkerHeartbeat),
    /// An instruction for the runtime layer
    Runtime(RuntimeCommand),
}

impl Event {
    /// Get the event type as a string identifier
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::StagingRequested(_) => "StagingRequested",
            Event::StagingReplied(_) => "StagingReplied",
            Event::WorkerAdvertised(_) => "WorkerAdvertised",
            Event::Runtime(_) => "Runtime",
        }
    }
}
