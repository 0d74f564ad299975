use std::fs;

use pretty_assertions::assert_eq;
use serde_json::json;
use wedeploy_cli::machine::{Machine, Mode};
use wiremock::{
    matchers::{body_partial_json, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use crate::{client, write_project, write_service};

async fn mock_creation(server: &MockServer, status: u16) {
    let project = ResponseTemplate::new(status);
    let service = ResponseTemplate::new(status);
    let (project, service) = if status == 200 {
        (
            project.set_body_json(json!({ "projectId": "project" })),
            service.set_body_json(json!({ "serviceId": "mycontainer" })),
        )
    } else {
        (project, service)
    };

    Mock::given(method("POST"))
        .and(path("/projects"))
        .respond_with(project)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/projects/project/services"))
        .respond_with(service)
        .mount(server)
        .await;
}

#[tokio::test]
async fn single_service_deploy() {
    let server = MockServer::start().await;
    mock_creation(&server, 200).await;

    let root = tempfile::tempdir().unwrap();
    write_project(root.path(), "project");
    let dir = write_service(root.path(), "mycontainer", r#"{"id":"mycontainer"}"#);

    let machine = Machine::new(
        client(&server),
        "project".to_owned(),
        "wedeploy.io".to_owned(),
        Mode::Deploy,
        root.path().to_path_buf(),
    );
    Mock::given(method("POST"))
        .and(path("/projects/project/services/mycontainer/deploy"))
        .and(query_param("groupUid", machine.group_uid()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    machine.run(vec![dir]).await.unwrap();

    assert_eq!(
        machine.success(),
        vec!["Ready! mycontainer.project.wedeploy.io".to_owned()]
    );
    assert_eq!(machine.deployed_services(), vec!["mycontainer".to_owned()]);
}

#[tokio::test]
async fn existing_project_and_service_are_reused() {
    let server = MockServer::start().await;
    mock_creation(&server, 409).await;
    Mock::given(method("POST"))
        .and(path("/projects/project/services/mycontainer/deploy"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    write_project(root.path(), "project");
    let dir = write_service(root.path(), "mycontainer", r#"{"id":"mycontainer"}"#);

    let machine = Machine::new(
        client(&server),
        "project".to_owned(),
        "wedeploy.io".to_owned(),
        Mode::Deploy,
        root.path().to_path_buf(),
    );

    machine.run(vec![dir]).await.unwrap();
    assert_eq!(machine.success().len(), 1);
}

#[tokio::test]
async fn failures_do_not_stop_other_services() {
    let server = MockServer::start().await;
    mock_creation(&server, 200).await;
    Mock::given(method("POST"))
        .and(path("/projects/project/services/mycontainer/deploy"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    write_project(root.path(), "project");
    let good = write_service(root.path(), "a-good", r#"{"id":"mycontainer"}"#);
    let corrupt = write_service(root.path(), "b-corrupt", r#"{"id": "#);
    let missing = root.path().join("c-missing");
    fs::create_dir_all(&missing).unwrap();

    let machine = Machine::new(
        client(&server),
        "project".to_owned(),
        "wedeploy.io".to_owned(),
        Mode::Deploy,
        root.path().to_path_buf(),
    );

    let errors = machine.run(vec![good, corrupt, missing]).await.unwrap_err();

    let paths = errors.list.iter().map(|e| e.path.as_str()).collect::<Vec<_>>();
    assert_eq!(paths, ["b-corrupt", "c-missing"]);
    assert!(errors.list[0].error.starts_with("error parsing"));
    assert!(errors.list[1].error.starts_with("missing service.json"));
    assert_eq!(machine.success().len(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn failing_hook_is_reported_with_its_path() {
    let server = MockServer::start().await;
    mock_creation(&server, 200).await;
    Mock::given(method("POST"))
        .and(path("/projects/project/services/hookfail/deploy"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    write_project(root.path(), "project");
    let dir = write_service(
        root.path(),
        "container_before_hook_failure",
        r#"{"id":"hookfail","hooks":{"beforeDeploy":"exit 1"}}"#,
    );

    let machine = Machine::new(
        client(&server),
        "project".to_owned(),
        "wedeploy.io".to_owned(),
        Mode::Deploy,
        root.path().to_path_buf(),
    );

    let errors = machine.run(vec![dir]).await.unwrap_err();

    assert_eq!(
        errors.to_string(),
        "List of errors (format is container path: error)\n\
         container_before_hook_failure: exit status 1"
    );
    assert!(machine.success().is_empty());
}

#[tokio::test]
async fn link_registers_the_source_directory() {
    let server = MockServer::start().await;
    mock_creation(&server, 200).await;

    let root = tempfile::tempdir().unwrap();
    write_project(root.path(), "project");
    let dir = write_service(root.path(), "mycontainer", r#"{"id":"mycontainer"}"#);

    Mock::given(method("POST"))
        .and(path("/projects/project/services/mycontainer/link"))
        .and(body_partial_json(json!({
            "serviceId": "mycontainer",
            "source": dir.display().to_string(),
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let machine = Machine::new(
        client(&server),
        "project".to_owned(),
        "wedeploy.me".to_owned(),
        Mode::Link,
        root.path().to_path_buf(),
    );

    machine.run(vec![dir]).await.unwrap();
    assert_eq!(
        machine.success(),
        vec!["Ready! mycontainer.project.wedeploy.me".to_owned()]
    );
}
