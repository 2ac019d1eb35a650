mod common;

use common::{next_request, success_reply, TestNode, SPACE_GUID};
use droplet_stager::packages::{
    AccessContext, Action, AdminAccess, PackageCreateMessage, PackageStagingMessage,
    PackageUploadMessage, BITS_ALREADY_UPLOADED,
};
use droplet_stager::store::{
    BlobstoreKind, DropletRecord, Job, PackageRecord, PackageState, PackageType, StagingStatus,
};
use droplet_stager::StagerError;

/// Access context that refuses one action everywhere.
struct Deny(Action);

impl AccessContext for Deny {
    fn can(&self, action: Action, _space_guid: &str) -> bool {
        action != self.0
    }
}

fn create_bits(t: &TestNode) -> PackageRecord {
    t.node
        .packages()
        .create(&PackageCreateMessage::new(SPACE_GUID, Some("bits"), None), &AdminAccess)
        .unwrap()
}

fn ready_package(t: &TestNode) -> PackageRecord {
    let package = create_bits(t);
    let packages = t.node.packages();
    packages
        .upload(&PackageUploadMessage::new(&package.guid, Some("/tmp/bits.zip")), &AdminAccess)
        .unwrap();
    packages.upload_complete(&package.guid, "bits-sha").unwrap()
}

#[tokio::test]
async fn bits_package_starts_created() {
    let t = TestNode::new();
    let package = create_bits(&t);

    assert_eq!(package.package_type, PackageType::Bits);
    assert_eq!(package.state, PackageState::Created);
    assert_eq!(package.url, None);
    assert_eq!(t.db().get_package(&package.guid).unwrap(), Some(package));
}

#[tokio::test]
async fn docker_package_is_ready_immediately() {
    let t = TestNode::new();
    let message = PackageCreateMessage::new(SPACE_GUID, Some("docker"), Some("docker://cloudfoundry/runtime-ci"));

    let package = t.node.packages().create(&message, &AdminAccess).unwrap();

    assert_eq!(package.state, PackageState::Ready);
    assert_eq!(package.url.as_deref(), Some("docker://cloudfoundry/runtime-ci"));
}

#[tokio::test]
async fn invalid_create_requests_are_rejected() {
    let t = TestNode::new();
    let packages = t.node.packages();

    let result = packages.create(&PackageCreateMessage::new(SPACE_GUID, Some("docker"), None), &AdminAccess);
    match result {
        Err(StagerError::Validation(message)) => {
            assert_eq!(message, "The url field must be provided for type docker.")
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    let result = packages.create(&PackageCreateMessage::new("space-x", Some("bits"), None), &AdminAccess);
    assert!(matches!(result, Err(StagerError::NotFound(_))));

    let result = packages.create(
        &PackageCreateMessage::new(SPACE_GUID, Some("bits"), None),
        &Deny(Action::Create),
    );
    assert!(matches!(result, Err(StagerError::Unauthorized(_))));
}

#[tokio::test]
async fn upload_is_accepted_once_and_enqueued_locally() {
    let t = TestNode::new();
    let package = create_bits(&t);
    let packages = t.node.packages();
    let upload = PackageUploadMessage::new(&package.guid, Some("/tmp/bits.zip"));

    let pending = packages.upload(&upload, &AdminAccess).unwrap();
    assert_eq!(pending.state, PackageState::Pending);

    let local = t.node.jobs().list(&t.node.config().jobs.local_queue).unwrap();
    assert_eq!(local.len(), 1);
    assert_eq!(
        local[0].job,
        Job::PackageBits {
            package_guid: package.guid.clone(),
            bits_path: "/tmp/bits.zip".to_string()
        }
    );

    match packages.upload(&upload, &AdminAccess) {
        Err(StagerError::BitsAlreadyUploaded(message)) => assert_eq!(message, BITS_ALREADY_UPLOADED),
        other => panic!("expected bits already uploaded, got {:?}", other),
    }
    assert_eq!(t.node.jobs().list(&t.node.config().jobs.local_queue).unwrap().len(), 1);
}

#[tokio::test]
async fn upload_requires_a_bits_package_and_a_path() {
    let t = TestNode::new();
    let packages = t.node.packages();
    let docker = packages
        .create(
            &PackageCreateMessage::new(SPACE_GUID, Some("docker"), Some("docker://image")),
            &AdminAccess,
        )
        .unwrap();

    let result = packages.upload(&PackageUploadMessage::new(&docker.guid, Some("/tmp/x")), &AdminAccess);
    match result {
        Err(StagerError::Validation(message)) => assert_eq!(message, "Package type must be bits."),
        other => panic!("expected validation error, got {:?}", other),
    }

    let bits = create_bits(&t);
    let result = packages.upload(&PackageUploadMessage::new(&bits.guid, None), &AdminAccess);
    assert!(matches!(result, Err(StagerError::Validation(_))));
}

#[tokio::test]
async fn ready_package_stages_into_its_droplet() {
    let t = TestNode::new();
    t.advertise("w1", 4096);
    let package = ready_package(&t);
    assert_eq!(package.package_hash.as_deref(), Some("bits-sha"));
    t.db()
        .store_droplet(&DropletRecord::new("droplet-1", &package.guid, SPACE_GUID))
        .unwrap();
    let mut inbox = t.worker_inbox("w1").await;

    let handle = t
        .node
        .packages()
        .stage(&PackageStagingMessage::new(&package.guid, Some("droplet-1")), &AdminAccess)
        .await
        .unwrap();

    let request = next_request(&mut inbox).await;
    assert_eq!(request.app_id, "droplet-1");
    assert_eq!(request.correlation_id, handle.correlation_id);
    assert!(!request.start_instance);
    assert_eq!(
        t.db().get_droplet("droplet-1").unwrap().unwrap().state,
        StagingStatus::Staging
    );

    t.reply_on_bus(&request, success_reply(&request, Some("droplet-sha"), "web"))
        .await;

    let db = t.db().clone();
    assert!(
        common::eventually(|| {
            db.get_droplet("droplet-1").unwrap().unwrap().state == StagingStatus::Staged
        })
        .await
    );
    let droplet = t.db().get_droplet("droplet-1").unwrap().unwrap();
    assert_eq!(droplet.droplet_hash.as_deref(), Some("droplet-sha"));
    assert_eq!(droplet.detected_start_command, "web");
    assert!(t.runner.calls().is_empty());
}

#[tokio::test]
async fn staging_preconditions_are_checked() {
    let t = TestNode::new();
    t.advertise("w1", 4096);
    let packages = t.node.packages();
    let created = create_bits(&t);
    t.db()
        .store_droplet(&DropletRecord::new("droplet-1", &created.guid, SPACE_GUID))
        .unwrap();

    let result = packages
        .stage(&PackageStagingMessage::new(&created.guid, Some("droplet-1")), &AdminAccess)
        .await;
    assert!(matches!(result, Err(StagerError::Conflict(_))));

    let result = packages
        .stage(&PackageStagingMessage::new(&created.guid, Some("droplet-x")), &AdminAccess)
        .await;
    assert!(matches!(result, Err(StagerError::NotFound(_))));

    let result = packages
        .stage(&PackageStagingMessage::new(&created.guid, None), &AdminAccess)
        .await;
    assert!(matches!(result, Err(StagerError::Validation(_))));

    let result = packages
        .stage(&PackageStagingMessage::new("missing", Some("droplet-1")), &AdminAccess)
        .await;
    assert!(matches!(result, Err(StagerError::NotFound(_))));

    let ready = ready_package(&t);
    let result = packages
        .stage(&PackageStagingMessage::new(&ready.guid, Some("droplet-1")), &Deny(Action::Update))
        .await;
    assert!(matches!(result, Err(StagerError::Unauthorized(_))));
}

#[tokio::test]
async fn delete_schedules_blob_removal() {
    let t = TestNode::new();
    let package = create_bits(&t);
    let packages = t.node.packages();

    let result = packages.delete(&package.guid, &Deny(Action::Delete));
    assert!(matches!(result, Err(StagerError::Unauthorized(_))));
    assert!(t.db().get_package(&package.guid).unwrap().is_some());

    let removed = packages.delete(&package.guid, &AdminAccess).unwrap();
    assert_eq!(removed.map(|p| p.guid), Some(package.guid.clone()));
    assert!(t.db().get_package(&package.guid).unwrap().is_none());

    let generic = t.node.jobs().list(&t.node.config().jobs.generic_queue).unwrap();
    assert_eq!(generic.len(), 1);
    assert_eq!(
        generic[0].job,
        Job::BlobstoreDelete {
            key: package.guid.clone(),
            blobstore: BlobstoreKind::Package
        }
    );

    assert_eq!(packages.delete(&package.guid, &AdminAccess).unwrap(), None);
    assert_eq!(packages.show(&package.guid, &AdminAccess).unwrap(), None);
}
