//! Deploys or links every service of a project concurrently and collects
//! what went wrong for each of them.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use serde::Serialize;
use strum::{Display as StrumDisplay, IntoStaticStr};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;
use wedeploy_api_client::{util::api_error, WeDeployApiClient};
use wedeploy_common::{
    descriptors::ServiceDescriptor,
    models::service::{LinkRequest, ServiceCreateRequest},
    service_host,
};

use crate::{hooks::run_hook, package::make_bundle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    Deploy,
    Link,
}

/// The failure of one service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceError {
    pub path: String,
    pub error: String,
}

/// Every failure of a run, one per failed service
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Errors {
    pub list: Vec<ServiceError>,
}

impl Display for Errors {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "List of errors (format is container path: error)")?;
        for e in &self.list {
            write!(f, "\n{}: {}", e.path, e.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for Errors {}

struct MachineContext {
    client: WeDeployApiClient,
    project_id: String,
    infrastructure: String,
    mode: Mode,
    group_uid: String,
    project_root: PathBuf,
}

pub struct Machine {
    ctx: Arc<MachineContext>,
    success: Arc<Mutex<Vec<String>>>,
    errors: Arc<Mutex<Errors>>,
    deployed: Arc<Mutex<Vec<String>>>,
}

impl Machine {
    pub fn new(
        client: WeDeployApiClient,
        project_id: String,
        infrastructure: String,
        mode: Mode,
        project_root: PathBuf,
    ) -> Self {
        Self {
            ctx: Arc::new(MachineContext {
                client,
                project_id,
                infrastructure,
                mode,
                group_uid: Uuid::new_v4().to_string(),
                project_root,
            }),
            success: Default::default(),
            errors: Default::default(),
            deployed: Default::default(),
        }
    }

    /// Every service directory gets its own task. Failures are collected, never
    /// cancelling the other services.
    #[instrument(skip_all, fields(project = %self.ctx.project_id, mode = %self.ctx.mode))]
    pub async fn run(&self, service_dirs: Vec<PathBuf>) -> Result<(), Errors> {
        let mut set = JoinSet::new();
        let mut tags = HashMap::new();

        for dir in service_dirs {
            let tag = self.ctx.tag(&dir);
            let task_tag = tag.clone();
            let ctx = self.ctx.clone();
            let success = self.success.clone();
            let errors = self.errors.clone();
            let deployed = self.deployed.clone();

            let handle = set.spawn(async move {
                match ctx.run_service(&dir).await {
                    Ok(service_id) => {
                        let host = service_host(&service_id, &ctx.project_id, &ctx.infrastructure);
                        info!(service = service_id, "service ready");
                        lock(&success).push(format!("Ready! {host}"));
                        lock(&deployed).push(service_id);
                    }
                    Err(e) => {
                        let message = ctx.error_message(&e);
                        debug!(path = task_tag, error = %message, "service failed");
                        lock(&errors).list.push(ServiceError {
                            path: task_tag,
                            error: message,
                        });
                    }
                }
            });
            tags.insert(handle.id(), tag);
        }

        while let Some(res) = set.join_next_with_id().await {
            if let Err(e) = res {
                error!(error = %e, "service task failed");
                let path = tags.remove(&e.id()).unwrap_or_default();
                lock(&self.errors).list.push(ServiceError {
                    path,
                    error: format!("task failed: {e}"),
                });
            }
        }

        let mut errors = lock(&self.errors);
        if errors.list.is_empty() {
            return Ok(());
        }

        errors.list.sort_by(|a, b| a.path.cmp(&b.path));
        Err(errors.clone())
    }

    /// Success lines, in completion order
    pub fn success(&self) -> Vec<String> {
        lock(&self.success).clone()
    }

    /// Ids of the services that went through, sorted
    pub fn deployed_services(&self) -> Vec<String> {
        let mut services = lock(&self.deployed).clone();
        services.sort();
        services
    }

    /// Carried by the activities of this deploy
    pub fn group_uid(&self) -> &str {
        &self.ctx.group_uid
    }

    pub fn project_id(&self) -> &str {
        &self.ctx.project_id
    }
}

impl MachineContext {
    /// Path of a service relative to the project root, as shown in errors
    fn tag(&self, dir: &Path) -> String {
        match dir.strip_prefix(&self.project_root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_owned(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => dir.display().to_string(),
        }
    }

    fn error_message(&self, e: &anyhow::Error) -> String {
        let command: &'static str = self.mode.into();
        match api_error(e) {
            Some(api) => api.friendly_message(Some(command)),
            None => format!("{e:#}"),
        }
    }

    /// The steps for one service. Returns the service id.
    async fn run_service(&self, dir: &Path) -> Result<String> {
        let descriptor = ServiceDescriptor::read(dir)?;
        let hooks = descriptor.hooks();
        let service_id = descriptor.id.clone();
        debug!(service = service_id, dir = %dir.display(), "starting");

        self.client
            .ensure_project(&self.project_id)
            .await
            .with_context(|| format!("failed to create project {}", self.project_id))?;
        self.client
            .ensure_service(&self.project_id, &ServiceCreateRequest::from(&descriptor))
            .await
            .with_context(|| format!("failed to install service {service_id}"))?;

        match self.mode {
            Mode::Deploy => {
                if let Some(ref hook) = hooks.before_deploy {
                    run_hook("before_deploy", hook, dir).await?;
                }

                let bundle_dir = dir.to_path_buf();
                let bundle = tokio::task::spawn_blocking(move || make_bundle(&bundle_dir))
                    .await
                    .context("packaging task failed")??;
                debug!(service = service_id, bytes = bundle.len(), "uploading bundle");
                self.client
                    .upload_bundle(&self.project_id, &service_id, &self.group_uid, bundle)
                    .await?;

                if let Some(ref hook) = hooks.after_deploy {
                    run_hook("after_deploy", hook, dir).await?;
                }
            }
            Mode::Link => {
                if let Some(ref hook) = hooks.before_build {
                    run_hook("before_build", hook, dir).await?;
                }
                if let Some(ref hook) = hooks.build {
                    run_hook("build", hook, dir).await?;
                }

                self.client
                    .link_service(
                        &self.project_id,
                        &LinkRequest {
                            service_id: service_id.clone(),
                            source: dir.display().to_string(),
                        },
                    )
                    .await?;

                if let Some(ref hook) = hooks.after_build {
                    run_hook("after_build", hook, dir).await?;
                }
            }
        }

        Ok(service_id)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
