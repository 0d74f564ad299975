#![cfg(unix)]

use std::fs;
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::json;
use wedeploy_cli::{
    args::OutputMode,
    infra::{DockerCli, DockerMachine, InfraError, InfraFlags, RunEnd, ShutdownSignals},
    ui::Ui,
};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::client;

/// Every listener in the process sees a SIGINT, so tests that listen take turns
static SIGNALS: Mutex<()> = Mutex::new(());

fn listen() -> (MutexGuard<'static, ()>, ShutdownSignals) {
    let guard = SIGNALS.lock().unwrap_or_else(PoisonError::into_inner);
    (guard, ShutdownSignals::new().unwrap())
}

/// SIGINT to this process after `delay`
fn interrupt_after(delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        tokio::process::Command::new("kill")
            .args(["-INT", &std::process::id().to_string()])
            .status()
            .await
            .unwrap();
    });
}

/// A `docker` that logs its arguments. A call matching a shell `case` pattern runs the
/// paired action, e.g. `("'ps --filter'*", "printf abc123")`.
fn fake_docker(dir: &Path, answers: &[(&str, &str)]) -> (PathBuf, PathBuf) {
    let log = dir.join("docker.log");
    let script = dir.join("docker");
    let cases = answers
        .iter()
        .map(|(pattern, action)| format!("  {pattern}) {action} ;;\n"))
        .collect::<String>();
    fs::write(
        &script,
        format!(
            "#!/bin/sh\n\
             echo \"$*\" >> '{}'\n\
             case \"$*\" in\n{cases}esac\n\
             exit 0\n",
            log.display()
        ),
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    (script, log)
}

const RUNNING: (&str, &str) = ("'ps --filter'*", "printf abc123");

fn calls(log: &Path) -> Vec<String> {
    fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
}

#[tokio::test]
async fn busy_ports_stop_the_start() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let (docker, log) = fake_docker(dir.path(), &[]);

    let listener = TcpListener::bind(("0.0.0.0", 0)).unwrap();
    let busy = listener.local_addr().unwrap().port();
    let free = portpicker::pick_unused_port().unwrap();

    let mut machine = DockerMachine::new(
        InfraFlags::default(),
        client(&server),
        Ui::new(OutputMode::Json),
    )
    .with_docker(DockerCli::with_program(docker))
    .with_ports(vec![free, busy]);

    let (_guard, mut signals) = listen();
    let err = machine.run(&mut signals).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<InfraError>(),
        Some(InfraError::PortsUnavailable(ports)) if ports == &[busy]
    ));
    assert_eq!(
        err.to_string(),
        format!("Can't start WeDeploy: the following ports are unavailable: {busy}")
    );
    assert!(calls(&log).iter().all(|c| !c.starts_with("run")));
    assert!(machine.container.is_none());
}

#[tokio::test]
async fn view_mode_needs_a_running_infrastructure() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let (docker, log) = fake_docker(dir.path(), &[]);

    let flags = InfraFlags {
        view_mode: true,
        ..Default::default()
    };
    let mut machine = DockerMachine::new(flags, client(&server), Ui::new(OutputMode::Json))
        .with_docker(DockerCli::with_program(docker))
        .with_ports(vec![]);

    let (_guard, mut signals) = listen();
    let err = machine.run(&mut signals).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<InfraError>(),
        Some(InfraError::NotRunning)
    ));
    assert_eq!(calls(&log).len(), 1);
}

#[tokio::test]
async fn running_infrastructure_is_reused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let (docker, log) = fake_docker(dir.path(), &[RUNNING]);

    let mut machine = DockerMachine::new(
        InfraFlags::default(),
        client(&server),
        Ui::new(OutputMode::Json),
    )
    .with_docker(DockerCli::with_program(docker))
    .with_readiness(3, std::time::Duration::from_millis(10));

    let (_guard, mut signals) = listen();
    machine.run(&mut signals).await.unwrap();
    assert!(!machine.interrupted());

    assert_eq!(machine.container.as_deref(), Some("abc123"));
    assert!(calls(&log).iter().all(|c| !c.starts_with("run")));
}

#[tokio::test]
async fn start_is_retried_until_the_api_answers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let (docker, _) = fake_docker(dir.path(), &[]);

    let machine = DockerMachine::new(
        InfraFlags::default(),
        client(&server),
        Ui::new(OutputMode::Json),
    )
    .with_docker(DockerCli::with_program(docker))
    .with_readiness(5, std::time::Duration::from_millis(10));

    assert!(machine.wait_ready().await);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn interrupt_while_waiting_for_the_api_stops_the_infrastructure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let (docker, log) = fake_docker(dir.path(), &[RUNNING]);

    let mut machine = DockerMachine::new(
        InfraFlags::default(),
        client(&server),
        Ui::new(OutputMode::Json),
    )
    .with_docker(DockerCli::with_program(docker))
    .with_readiness(30, Duration::from_millis(100));

    let (_guard, mut signals) = listen();
    interrupt_after(Duration::from_millis(300));
    let start = Instant::now();
    machine.run(&mut signals).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(machine.interrupted());

    assert_eq!(machine.watch(&mut signals).await.unwrap(), RunEnd::Stopped);
    assert!(calls(&log).iter().all(|c| !c.starts_with("wait")));
    assert!(calls(&log).iter().any(|c| c.starts_with("ps -a")));
}

#[tokio::test]
async fn stop_unlinks_every_project_and_cleans_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "projectId": "a" }, { "projectId": "b" }])),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/projects/a"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/projects/b"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let (docker, log) = fake_docker(
        dir.path(),
        &[
            ("'ps -a'*", "printf 'c1\\nc2'"),
            ("'images wedeploy/local'*", "printf 'old1\\told\\nnew1\\tlatest'"),
        ],
    );

    let machine = DockerMachine::new(
        InfraFlags::default(),
        client(&server),
        Ui::new(OutputMode::Json),
    )
    .with_docker(DockerCli::with_program(docker));

    machine.stop().await;

    let calls = calls(&log);
    assert!(calls.contains(&"stop c1 c2".to_owned()), "{calls:?}");
    assert!(calls.contains(&"rm -f c1 c2".to_owned()), "{calls:?}");
    assert!(calls.contains(&"rmi old1".to_owned()), "{calls:?}");
}

#[tokio::test]
async fn watch_reports_the_exit_status() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let (docker, log) = fake_docker(dir.path(), &[("wait*", "printf 3")]);

    let mut machine = DockerMachine::new(
        InfraFlags::default(),
        client(&server),
        Ui::new(OutputMode::Json),
    )
    .with_docker(DockerCli::with_program(docker));
    machine.container = Some("abc123".to_owned());

    let (_guard, mut signals) = listen();
    assert_eq!(machine.watch(&mut signals).await.unwrap(), RunEnd::Exited(3));
    assert_eq!(calls(&log), vec!["wait abc123"]);
}

#[tokio::test]
async fn interrupt_while_watching_stops_the_infrastructure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let (docker, log) = fake_docker(
        dir.path(),
        &[("wait*", "sleep 5"), ("'ps -a'*", "printf c1")],
    );

    let mut machine = DockerMachine::new(
        InfraFlags::default(),
        client(&server),
        Ui::new(OutputMode::Json),
    )
    .with_docker(DockerCli::with_program(docker));
    machine.container = Some("abc123".to_owned());

    let (_guard, mut signals) = listen();
    interrupt_after(Duration::from_millis(200));
    assert_eq!(machine.watch(&mut signals).await.unwrap(), RunEnd::Stopped);

    let calls = calls(&log);
    assert!(calls.contains(&"stop c1".to_owned()), "{calls:?}");
    assert!(calls.contains(&"rm -f c1".to_owned()), "{calls:?}");
}

#[tokio::test]
async fn interrupt_in_view_mode_leaves_the_infrastructure_running() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let (docker, log) = fake_docker(dir.path(), &[("wait*", "sleep 5")]);

    let flags = InfraFlags {
        view_mode: true,
        ..Default::default()
    };
    let mut machine = DockerMachine::new(flags, client(&server), Ui::new(OutputMode::Json))
        .with_docker(DockerCli::with_program(docker));
    machine.container = Some("abc123".to_owned());

    let (_guard, mut signals) = listen();
    interrupt_after(Duration::from_millis(200));
    assert_eq!(machine.watch(&mut signals).await.unwrap(), RunEnd::Detached);

    assert_eq!(calls(&log), vec!["wait abc123"]);
    assert!(server.received_requests().await.unwrap().is_empty());
}
