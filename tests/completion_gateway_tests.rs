mod common;

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use common::{next_request, success_reply, TestNode};
use droplet_stager::gateway::{configure, BasicCredentials, STAGING_FAILURE_MSG};
use droplet_stager::staging::{StagingReply, StagingRequest};
use droplet_stager::store::{StagingBackend, StagingStatus};
use serde_json::{json, Value};

const COMPLETED: &str = "/internal/staging/completed";

/// A node with `app-1` currently staging on worker `w1`.
async fn staging_node() -> (TestNode, StagingRequest) {
    let t = TestNode::new();
    t.advertise("w1", 4096);
    t.seed_app("app-1");
    let mut inbox = t.worker_inbox("w1").await;
    t.node.stager().stage_app("app-1").await.unwrap();
    let request = next_request(&mut inbox).await;
    (t, request)
}

fn post(credentials: Option<&BasicCredentials>, body: impl Into<web::Bytes>) -> test::TestRequest {
    let request = test::TestRequest::post().uri(COMPLETED).set_payload(body.into());
    match credentials {
        Some(credentials) => request.insert_header((header::AUTHORIZATION, credentials.to_header())),
        None => request,
    }
}

fn body_of(reply: &StagingReply) -> Vec<u8> {
    serde_json::to_vec(reply).unwrap()
}

#[actix_web::test]
async fn successful_callback_stages_the_app() {
    let (t, request) = staging_node().await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(t.node.gateway_state()))
            .configure(configure),
    )
    .await;

    let reply = success_reply(&request, Some("sha-1"), "wait_for_godot");
    let resp = test::call_service(&app, post(Some(&t.credentials()), body_of(&reply)).to_request()).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({}));

    let stored = t.app("app-1");
    assert_eq!(stored.staging_status, StagingStatus::Staged);
    assert_eq!(stored.detected_start_command, "wait_for_godot");
    assert_eq!(t.runner.calls().len(), 1);
}

#[actix_web::test]
async fn callback_without_task_id_is_not_applied_to_the_current_attempt() {
    let (t, stale) = staging_node().await;
    let mut inbox = t.worker_inbox("w1").await;
    t.node.stager().stage_app("app-1").await.unwrap();
    let current = next_request(&mut inbox).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(t.node.gateway_state()))
            .configure(configure),
    )
    .await;

    let mut reply = success_reply(&stale, Some("stale-sha"), "stale");
    reply.task_id = None;
    let resp = test::call_service(&app, post(Some(&t.credentials()), body_of(&reply)).to_request()).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_code"], "CF-NotFound");
    let stored = t.app("app-1");
    assert_eq!(stored.staging_status, StagingStatus::Staging);
    assert_eq!(stored.staging_task_id.as_deref(), Some(current.correlation_id.as_str()));
    assert_eq!(stored.detected_start_command, "original");
}

#[actix_web::test]
async fn wrong_credentials_are_rejected_before_any_mutation() {
    let (t, request) = staging_node().await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(t.node.gateway_state()))
            .configure(configure),
    )
    .await;
    let reply = success_reply(&request, Some("sha-1"), "web");

    let wrong = BasicCredentials::new("internal_user", "guess");
    let resp = test::call_service(&app, post(Some(&wrong), body_of(&reply)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_code"], "CF-NotAuthenticated");

    let resp = test::call_service(&app, post(None, body_of(&reply)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(t.app("app-1").staging_status, StagingStatus::Staging);
    assert_eq!(t.node.tasks().tracker().pending_count(), 1);
}

#[actix_web::test]
async fn app_on_another_backend_is_rejected() {
    let (t, request) = staging_node().await;
    let mut stored = t.app("app-1");
    stored.staging_backend = StagingBackend::Diego;
    t.db().store_app(&stored).unwrap();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(t.node.gateway_state()))
            .configure(configure),
    )
    .await;

    let reply = success_reply(&request, Some("sha-1"), "web");
    let resp = test::call_service(&app, post(Some(&t.credentials()), body_of(&reply)).to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_code"], "CF-StagingBackendInvalid");
    assert_eq!(body["code"], 170011);
    assert_eq!(t.app("app-1"), stored);
}

#[actix_web::test]
async fn malformed_payload_is_a_parse_error() {
    let (t, _) = staging_node().await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(t.node.gateway_state()))
            .configure(configure),
    )
    .await;

    let resp = test::call_service(&app, post(Some(&t.credentials()), "{not json").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_code"], "CF-MessageParseError");
    assert_eq!(t.app("app-1").staging_status, StagingStatus::Staging);
}

#[actix_web::test]
async fn unknown_app_is_not_found() {
    let (t, _) = staging_node().await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(t.node.gateway_state()))
            .configure(configure),
    )
    .await;

    let reply = StagingReply::success("ghost", None);
    let resp = test::call_service(&app, post(Some(&t.credentials()), body_of(&reply)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_code"], "CF-NotFound");
}

#[actix_web::test]
async fn callback_for_an_already_failed_app_is_a_staging_error() {
    let (t, request) = staging_node().await;
    let failure = StagingReply::failure("app-1", Some(request.correlation_id.as_str()), "StagingTimeout", "too slow");
    t.node
        .tasks()
        .complete(
            &request.correlation_id,
            failure.into_result(&request.correlation_id),
            droplet_stager::staging::CompletionSource::Timeout,
        )
        .await
        .unwrap();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(t.node.gateway_state()))
            .configure(configure),
    )
    .await;

    let reply = success_reply(&request, Some("sha-1"), "web");
    let resp = test::call_service(&app, post(Some(&t.credentials()), body_of(&reply)).to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_code"], "CF-StagingError");
    assert!(body["description"].as_str().unwrap().contains(STAGING_FAILURE_MSG));
    assert_eq!(t.app("app-1").staging_status, StagingStatus::Failed);
}

#[actix_web::test]
async fn health_reports_workers_and_pending_attempts() {
    let (t, _) = staging_node().await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(t.node.gateway_state()))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/internal/staging/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "running");
    assert_eq!(body["workers"], 1);
    assert_eq!(body["pending_staging"], 1);
}

#[tokio::test]
async fn gateway_receive_ignores_a_duplicate_callback() {
    let (t, request) = staging_node().await;
    let raw = body_of(&success_reply(&request, Some("sha-1"), "web"));
    let credentials = t.credentials();

    let first = t.node.gateway().receive(&raw, Some(&credentials)).await.unwrap();
    let second = t.node.gateway().receive(&raw, Some(&credentials)).await.unwrap();

    assert_eq!(first, droplet_stager::staging::ApplyOutcome::Applied);
    assert_eq!(second, droplet_stager::staging::ApplyOutcome::Duplicate);
    assert_eq!(t.runner.calls().len(), 1);
}
