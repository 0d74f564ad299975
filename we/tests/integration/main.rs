mod infra;
mod machine;
mod watcher;

use std::fs;
use std::path::{Path, PathBuf};

use wedeploy_api_client::{Credentials, WeDeployApiClient};
use wiremock::MockServer;

/// API client pointed at a mock server
fn client(server: &MockServer) -> WeDeployApiClient {
    WeDeployApiClient::new(server.uri(), Credentials::None, None, None).unwrap()
}

/// Writes `project.json` into `root`
fn write_project(root: &Path, id: &str) {
    fs::write(root.join("project.json"), format!(r#"{{"id":"{id}"}}"#)).unwrap();
}

/// Creates `root/dir` with the given `service.json` content
fn write_service(root: &Path, dir: &str, descriptor: &str) -> PathBuf {
    let dir = root.join(dir);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("service.json"), descriptor).unwrap();
    fs::write(dir.join("index.html"), "<h1>hi</h1>").unwrap();
    dir
}
