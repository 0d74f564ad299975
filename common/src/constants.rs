//! Shared constants used across WeDeploy crates

// Remotes
pub const DEFAULT_REMOTE: &str = "wedeploy";
pub const DEFAULT_INFRASTRUCTURE: &str = "wedeploy.io";
pub const DEFAULT_API_URL: &str = "https://api.wedeploy.io";
pub const DEFAULT_CONSOLE_URL: &str = "https://console.wedeploy.com";

pub const LOCAL_REMOTE: &str = "local";
pub const LOCAL_INFRASTRUCTURE: &str = "wedeploy.me";
pub const LOCAL_CONSOLE_URL: &str = "http://console.wedeploy.me";
pub const DEFAULT_LOCAL_PORT: u16 = 8080;

pub fn local_api_url(port: u16) -> String {
    format!("http://localhost:{port}")
}

// Descriptor file names
pub const PROJECT_DESCRIPTOR: &str = "project.json";
pub const SERVICE_DESCRIPTOR: &str = "service.json";
pub const LEGACY_SERVICE_DESCRIPTOR: &str = "container.json";

// Local infrastructure
pub const LOCAL_INFRA_IMAGE: &str = "wedeploy/local";
pub const LOCAL_INFRA_IMAGE_TAG: &str = "latest";
pub const CONTAINER_LABEL: &str = "com.wedeploy.container";
pub const PROJECT_LABEL: &str = "com.wedeploy.project";

pub mod headers {
    use http::HeaderName;

    pub static X_WEDEPLOY_CLI_VERSION: HeaderName = HeaderName::from_static("x-wedeploy-cli-version");
}
