use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wedeploy_cli::activities::DeployWatcher;
use wedeploy_common::models::activity::ActivityType;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use crate::client;

fn activity(id: u32, kind: &str, service: &str) -> Value {
    json!({
        "id": id.to_string(),
        "createdAt": 1_700_000_000_000_i64 + i64::from(id),
        "projectId": "shop",
        "groupUid": "g-1",
        "type": kind,
        "metadata": { "serviceId": service },
    })
}

fn watcher(server: &MockServer) -> DeployWatcher {
    DeployWatcher::new(
        client(server),
        "shop".to_owned(),
        "wedeploy.io".to_owned(),
        ["web".to_owned(), "api".to_owned()],
    )
    .with_group_uid("g-1")
    .with_poll_interval(Duration::from_millis(10))
    .with_timeout(Some(Duration::from_secs(10)))
    .hidden()
}

#[tokio::test]
async fn stops_once_every_service_is_final() {
    let server = MockServer::start().await;
    // newest first
    let activities = json!([
        activity(7, "DEPLOY_SUCCEEDED", "web"),
        activity(6, "DEPLOY_SUCCEEDED", "ghost"),
        activity(5, "BUILD_FAILED", "api"),
        activity(4, "DEPLOY_STARTED", "web"),
        activity(3, "BUILD_SUCCEEDED", "web"),
        activity(2, "PROJECT_CREATED", "web"),
        activity(1, "BUILD_STARTED", "web"),
    ]);
    Mock::given(method("GET"))
        .and(path("/projects/shop/activities"))
        .and(query_param("groupUid", "g-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(activities))
        .mount(&server)
        .await;

    let mut watcher = watcher(&server);
    watcher.watch().await.unwrap();

    assert!(watcher.all_final());
    assert_eq!(watcher.state("web"), Some(&ActivityType::DeploySucceeded));
    assert_eq!(watcher.state("api"), Some(&ActivityType::BuildFailed));
    assert_eq!(watcher.state("ghost"), None);

    let summary = watcher.summary();
    assert_eq!(summary.failed_builds, vec!["api".to_owned()]);
    assert_eq!(summary.succeeded, vec!["web".to_owned()]);
    assert_eq!(summary.describe(), "Deployment failed: build failed for api");
}

#[tokio::test]
async fn keeps_polling_until_final() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/shop/activities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            activity(1, "BUILD_STARTED", "web"),
            activity(2, "BUILD_PENDING", "api"),
        ])))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/projects/shop/activities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            activity(4, "DEPLOY_SUCCEEDED", "api"),
            activity(3, "DEPLOY_FAILED", "web"),
        ])))
        .mount(&server)
        .await;

    let mut watcher = watcher(&server);
    watcher.watch().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);

    let summary = watcher.summary();
    assert_eq!(summary.failed_deploys, vec!["web".to_owned()]);
    assert_eq!(summary.succeeded, vec!["api".to_owned()]);
}

#[tokio::test]
async fn gives_up_after_the_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/shop/activities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let mut watcher = watcher(&server).with_timeout(Some(Duration::from_millis(200)));
    let err = watcher.watch().await.unwrap_err();

    assert!(err.to_string().starts_with("gave up waiting"));
    assert!(!watcher.all_final());
}

#[tokio::test]
async fn api_failure_ends_the_watch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/shop/activities"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut watcher = watcher(&server);
    assert!(watcher.watch().await.is_err());

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert!(!watcher.all_final());
}
