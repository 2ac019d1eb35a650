//! Construction and wiring of a staging node

use crate::blobstore::{BlobUrlGenerator, StaticUrlGenerator};
use crate::bus::{AsyncMessageBus, MessageBus};
use crate::config::StagerConfig;
use crate::error::StagerResult;
use crate::gateway::{CompletionGateway, GatewayState};
use crate::observer::AppObserver;
use crate::packages::PackagesHandler;
use crate::registry::{spawn_eviction_sweeper, spawn_heartbeat_listener, WorkerRegistry};
use crate::runtime::{BusRunner, Runner};
use crate::staging::{Stager, StagingTasks};
use crate::store::{JobQueue, SledJobQueue, StagingDb};
use log::info;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Every component of the staging core, built once and shared by reference.
pub struct StagingNode {
    config: Arc<StagerConfig>,
    db: StagingDb,
    bus: Arc<dyn MessageBus>,
    registry: Arc<WorkerRegistry>,
    jobs: Arc<SledJobQueue>,
    tasks: Arc<StagingTasks>,
    stager: Arc<Stager>,
    packages: Arc<PackagesHandler>,
    observer: Arc<AppObserver>,
    gateway: Arc<CompletionGateway>,
}

impl StagingNode {
    /// Wire the node from explicit collaborators.
    pub fn new(
        config: StagerConfig,
        db: StagingDb,
        bus: Arc<dyn MessageBus>,
        runner: Arc<dyn Runner>,
    ) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(WorkerRegistry::new(Duration::from_secs(
            config.registry.advertisement_ttl_secs,
        )));
        let urls: Arc<dyn BlobUrlGenerator> =
            Arc::new(StaticUrlGenerator::new(&config.blobstore.base_url));
        let jobs = Arc::new(SledJobQueue::new(db.clone()));
        let job_queue: Arc<dyn JobQueue> = jobs.clone();

        let tasks = Arc::new(StagingTasks::new(
            db.clone(),
            registry.clone(),
            bus.clone(),
            urls,
            config.clone(),
        ));
        let stager = Arc::new(Stager::new(
            db.clone(),
            tasks.clone(),
            runner.clone(),
            config.clone(),
        ));
        let packages = Arc::new(PackagesHandler::new(
            db.clone(),
            job_queue.clone(),
            stager.clone(),
            config.clone(),
        ));
        let observer = Arc::new(AppObserver::new(
            db.clone(),
            stager.clone(),
            runner,
            job_queue,
            config.clone(),
        ));
        let gateway = Arc::new(CompletionGateway::new(db.clone(), tasks.clone(), config.clone()));

        Self {
            config,
            db,
            bus,
            registry,
            jobs,
            tasks,
            stager,
            packages,
            observer,
            gateway,
        }
    }

    /// Open storage at the configured path and use the in-process bus and the
    /// bus-publishing runner.
    pub fn load(config: StagerConfig) -> StagerResult<Self> {
        config.validate()?;
        info!("Opening staging store at {}", config.storage_path.display());
        let db = StagingDb::open(&config.storage_path)?;
        let bus: Arc<dyn MessageBus> = Arc::new(AsyncMessageBus::new());
        let runner: Arc<dyn Runner> = Arc::new(BusRunner::new(bus.clone()));
        Ok(Self::new(config, db, bus, runner))
    }

    /// Start the heartbeat listener and the eviction sweeper.
    pub async fn start_background(&self) -> Vec<JoinHandle<()>> {
        let listener = spawn_heartbeat_listener(
            self.registry.clone(),
            self.bus.clone(),
            &self.config.staging.advertise_subject,
        )
        .await;
        let sweeper = spawn_eviction_sweeper(
            self.registry.clone(),
            Duration::from_secs(self.config.registry.sweep_interval_secs.max(1)),
        );
        info!(
            "Listening for worker heartbeats on {}",
            self.config.staging.advertise_subject
        );
        vec![listener, sweeper]
    }

    pub fn gateway_state(&self) -> GatewayState {
        GatewayState {
            gateway: self.gateway.clone(),
            registry: self.registry.clone(),
        }
    }

    pub fn config(&self) -> &StagerConfig {
        &self.config
    }

    pub fn db(&self) -> &StagingDb {
        &self.db
    }

    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn jobs(&self) -> &Arc<SledJobQueue> {
        &self.jobs
    }

    pub fn tasks(&self) -> &Arc<StagingTasks> {
        &self.tasks
    }

    pub fn stager(&self) -> &Arc<Stager> {
        &self.stager
    }

    pub fn packages(&self) -> &Arc<PackagesHandler> {
        &self.packages
    }

    pub fn observer(&self) -> &Arc<AppObserver> {
        &self.observer
    }

    pub fn gateway(&self) -> &Arc<CompletionGateway> {
        &self.gateway
    }
}
