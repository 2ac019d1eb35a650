//! Shared fixture for staging integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use droplet_stager::bus::{AsyncConsumer, AsyncMessageBus, Event, MessageBus};
use droplet_stager::config::StagerConfig;
use droplet_stager::gateway::BasicCredentials;
use droplet_stager::registry::{StagingRequirements, WorkerAdvertisement, WorkerHeartbeat};
use droplet_stager::runtime::Runner;
use droplet_stager::staging::{
    AppTarget, ApplyOutcome, BuildpackSpec, Stageable, StagingReply, StagingRequest, StagingResult,
};
use droplet_stager::store::{
    AppRecord, AppState, SpaceRecord, StagingBackend, StagingDb, TargetKind,
};
use droplet_stager::{StagerError, StagerResult, StagingNode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// A call the staging core made on the runtime layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Start { app_guid: String, started_instances: u32 },
    Stop { app_guid: String },
    Scale { app_guid: String, instances: u32 },
    UpdateRoutes { app_guid: String, routes: Vec<String> },
}

/// Runner that only records what it was asked to do.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<RuntimeCall>>,
}

impl RecordingRunner {
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: RuntimeCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Runner for RecordingRunner {
    async fn start(&self, app: &AppRecord, started_instances: u32) -> StagerResult<()> {
        self.record(RuntimeCall::Start {
            app_guid: app.guid.clone(),
            started_instances,
        });
        Ok(())
    }

    async fn stop(&self, app: &AppRecord) -> StagerResult<()> {
        self.record(RuntimeCall::Stop {
            app_guid: app.guid.clone(),
        });
        Ok(())
    }

    async fn scale(&self, app: &AppRecord) -> StagerResult<()> {
        self.record(RuntimeCall::Scale {
            app_guid: app.guid.clone(),
            instances: app.instances,
        });
        Ok(())
    }

    async fn update_routes(&self, app: &AppRecord) -> StagerResult<()> {
        self.record(RuntimeCall::UpdateRoutes {
            app_guid: app.guid.clone(),
            routes: app.routes.clone(),
        });
        Ok(())
    }
}

pub const SPACE_GUID: &str = "space-1";
pub const STACK: &str = "lucid64";

/// A fully wired node on a temporary database with a recording runner.
pub struct TestNode {
    pub node: StagingNode,
    pub bus: Arc<AsyncMessageBus>,
    pub runner: Arc<RecordingRunner>,
    pub _temp_dir: TempDir,
}

impl TestNode {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config<F: FnOnce(&mut StagerConfig)>(customize: F) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = StagerConfig::new(temp_dir.path().to_path_buf());
        customize(&mut config);

        let db = StagingDb::new(
            sled::Config::new()
                .path(temp_dir.path())
                .temporary(true)
                .open()
                .unwrap(),
        )
        .unwrap();
        db.store_space(&SpaceRecord {
            guid: SPACE_GUID.to_string(),
            name: "dev".to_string(),
        })
        .unwrap();

        let bus = Arc::new(AsyncMessageBus::new());
        let runner = Arc::new(RecordingRunner::default());
        let node = StagingNode::new(config, db, bus.clone(), runner.clone());

        Self {
            node,
            bus,
            runner,
            _temp_dir: temp_dir,
        }
    }

    pub fn db(&self) -> &StagingDb {
        self.node.db()
    }

    /// Register a worker directly with the registry.
    pub fn advertise(&self, worker_id: &str, memory_mb: u64) {
        self.node
            .registry()
            .register_or_refresh(WorkerAdvertisement::from_heartbeat(
                heartbeat(worker_id, memory_mb),
                chrono::Utc::now(),
            ))
            .unwrap();
    }

    /// Store a started app whose bits have been uploaded.
    pub fn seed_app(&self, guid: &str) -> AppRecord {
        let mut app = AppRecord::new(guid, guid, SPACE_GUID);
        app.state = AppState::Started;
        app.instances = 3;
        app.package_hash = Some(format!("{}-bits", guid));
        app.detected_start_command = "original".to_string();
        app.routes = vec![format!("{}.example.com", guid)];
        self.db().store_app(&app).unwrap();
        app
    }

    pub fn app(&self, guid: &str) -> AppRecord {
        self.db().get_app(guid).unwrap().unwrap()
    }

    pub async fn worker_inbox(&self, worker_id: &str) -> AsyncConsumer {
        let subject = self.node.config().staging.request_subject(worker_id);
        self.bus.subscribe(&subject).await
    }

    pub fn credentials(&self) -> BasicCredentials {
        let api = &self.node.config().internal_api;
        BasicCredentials::new(&api.user, &api.password)
    }

    /// Reply to `request` on its bus reply subject.
    pub async fn reply_on_bus(&self, request: &StagingRequest, reply: StagingReply) {
        self.bus
            .publish(&request.reply_to, Event::StagingReplied(reply))
            .await
            .unwrap();
    }
}

pub fn heartbeat(worker_id: &str, memory_mb: u64) -> WorkerHeartbeat {
    WorkerHeartbeat {
        worker_id: worker_id.to_string(),
        stacks: vec![STACK.to_string()],
        available_memory_mb: memory_mb,
        available_disk_mb: 8192,
        available_file_descriptors: 65536,
    }
}

/// Successful reply carrying a droplet and the given start command.
pub fn success_reply(request: &StagingRequest, droplet_sha1: Option<&str>, command: &str) -> StagingReply {
    let mut reply = StagingReply::success(&request.app_id, Some(request.correlation_id.as_str()));
    reply.detected_buildpack = Some("ruby".to_string());
    reply.buildpack_key = Some("ruby-buildpack".to_string());
    reply.detected_start_command = Some(command.to_string());
    reply.droplet_sha1 = droplet_sha1.map(str::to_string);
    reply
}

/// Next staging request delivered to a worker inbox.
pub async fn next_request(inbox: &mut AsyncConsumer) -> StagingRequest {
    match inbox.recv_timeout(Duration::from_secs(2)).await {
        Ok(Event::StagingRequested(request)) => request,
        other => panic!("expected a staging request, got {:?}", other),
    }
}

/// Poll `condition` until it holds or four seconds pass.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// App target with a slow row write or a number of failing applies.
pub struct ScriptedTarget {
    inner: AppTarget,
    mark_delay: Duration,
    apply_failures: AtomicUsize,
}

impl ScriptedTarget {
    pub fn new(app: AppRecord) -> Self {
        Self {
            inner: AppTarget::new(app),
            mark_delay: Duration::ZERO,
            apply_failures: AtomicUsize::new(0),
        }
    }

    /// Hold the caller for `delay` after the row is marked.
    pub fn with_mark_delay(mut self, delay: Duration) -> Self {
        self.mark_delay = delay;
        self
    }

    /// Fail the next `count` applies with a database error.
    pub fn with_apply_failures(self, count: usize) -> Self {
        self.apply_failures.store(count, Ordering::SeqCst);
        self
    }
}

impl Stageable for ScriptedTarget {
    fn guid(&self) -> &str {
        self.inner.guid()
    }

    fn kind(&self) -> TargetKind {
        self.inner.kind()
    }

    fn requirements(&self) -> StagingRequirements {
        self.inner.requirements()
    }

    fn buildpack(&self) -> BuildpackSpec {
        self.inner.buildpack()
    }

    fn package_key(&self) -> &str {
        self.inner.package_key()
    }

    fn cache_key(&self) -> &str {
        self.inner.cache_key()
    }

    fn staging_backend(&self) -> StagingBackend {
        self.inner.staging_backend()
    }

    fn staging_failed(&self) -> bool {
        self.inner.staging_failed()
    }

    fn staging_task_id(&self) -> Option<&str> {
        self.inner.staging_task_id()
    }

    fn starts_instance(&self) -> bool {
        self.inner.starts_instance()
    }

    fn mark_staging(&self, db: &StagingDb, correlation_id: &str) -> StagerResult<()> {
        self.inner.mark_staging(db, correlation_id)?;
        std::thread::sleep(self.mark_delay);
        Ok(())
    }

    fn apply(&self, db: &StagingDb, result: &StagingResult) -> StagerResult<ApplyOutcome> {
        let failing = self
            .apply_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StagerError::Database("transient".to_string()));
        }
        self.inner.apply(db, result)
    }
}
