pub mod config;
pub mod constants;
pub mod descriptors;
pub mod models;

/// Fully qualified address of a service, as shown to users.
pub fn service_host(service: &str, project: &str, infrastructure: &str) -> String {
    format!("{service}.{project}.{infrastructure}")
}
