//! Runtime layer collaborator: starting, stopping and scaling app instances

use crate::bus::{Event, MessageBus};
use crate::error::StagerResult;
use crate::store::AppRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const RUNTIME_SUBJECT: &str = "runtime";

/// Instruction for the runtime layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RuntimeCommand {
    Start {
        app_guid: String,
        /// Instances the runtime still has to start
        instances_to_start: u32,
        droplet_hash: Option<String>,
        version: String,
    },
    Stop {
        app_guid: String,
    },
    Scale {
        app_guid: String,
        instances: u32,
    },
    UpdateRoutes {
        app_guid: String,
        routes: Vec<String>,
    },
}

#[async_trait]
pub trait Runner: Send + Sync {
    /// Start `app`; `started_instances` were already brought up elsewhere
    async fn start(&self, app: &AppRecord, started_instances: u32) -> StagerResult<()>;
    async fn stop(&self, app: &AppRecord) -> StagerResult<()>;
    async fn scale(&self, app: &AppRecord) -> StagerResult<()>;
    async fn update_routes(&self, app: &AppRecord) -> StagerResult<()>;
}

/// Runner that publishes [`RuntimeCommand`]s on the bus.
pub struct BusRunner {
    bus: Arc<dyn MessageBus>,
    subject: String,
}

impl BusRunner {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            bus,
            subject: RUNTIME_SUBJECT.to_string(),
        }
    }

    async fn send(&self, command: RuntimeCommand) -> StagerResult<()> {
        self.bus.publish(&self.subject, Event::Runtime(command)).await?;
        Ok(())
    }
}

#[async_trait]
impl Runner for BusRunner {
    async fn start(&self, app: &AppRecord, started_instances: u32) -> StagerResult<()> {
        self.send(RuntimeCommand::Start {
            app_guid: app.guid.clone(),
            instances_to_start: app.instances.saturating_sub(started_instances),
            droplet_hash: app.droplet_hash.clone(),
            version: app.version.clone(),
        })
        .await
    }

    async fn stop(&self, app: &AppRecord) -> StagerResult<()> {
        self.send(RuntimeCommand::Stop {
            app_guid: app.guid.clone(),
        })
        .await
    }

    async fn scale(&self, app: &AppRecord) -> StagerResult<()> {
        self.send(RuntimeCommand::Scale {
            app_guid: app.guid.clone(),
            instances: app.instances,
        })
        .await
    }

    async fn update_routes(&self, app: &AppRecord) -> StagerResult<()> {
        self.send(RuntimeCommand::UpdateRoutes {
            app_guid: app.guid.clone(),
            routes: app.routes.clone(),
        })
        .await
    }
}
