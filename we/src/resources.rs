//! Finding the project and services a command acts on from the local descriptors

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;
use wedeploy_common::descriptors::{
    find_project_root, list_service_dirs, validate_id, ProjectDescriptor, ServiceDescriptor,
};

use crate::hosts::Target;

#[derive(Debug, Clone, PartialEq)]
pub struct LocalProject {
    pub project_id: String,
    pub root: PathBuf,
    pub service_dirs: Vec<PathBuf>,
}

/// Resolve the project id and service directories for a deploy or link.
///
/// The project id comes from the target, or from the closest `project.json`.
/// Services are the one named by the target, the working directory when it is
/// a service itself, or every service of the project.
pub fn discover(working_dir: &Path, target: &Target) -> Result<LocalProject> {
    let found_root = find_project_root(working_dir);
    let root = found_root.clone().unwrap_or_else(|| working_dir.to_path_buf());

    let project_id = match (&target.project, &found_root) {
        (Some(project), _) => {
            validate_id(project)?;
            project.clone()
        }
        (None, Some(root)) => ProjectDescriptor::read(root)?.id,
        (None, None) => bail!(
            "no project.json found in {} or its parents. Use --project to pick a project",
            working_dir.display()
        ),
    };

    let service_dirs = if let Some(ref service) = target.service {
        let dir = list_service_dirs(&root)
            .with_context(|| format!("failed to list services in {}", root.display()))?
            .into_iter()
            .find(|dir| ServiceDescriptor::read(dir).is_ok_and(|s| &s.id == service))
            .ok_or_else(|| anyhow!("service {service:?} not found in {}", root.display()))?;
        vec![dir]
    } else if working_dir != root && ServiceDescriptor::exists_in(working_dir) {
        vec![working_dir.to_path_buf()]
    } else {
        list_service_dirs(&root)
            .with_context(|| format!("failed to list services in {}", root.display()))?
    };

    if service_dirs.is_empty() {
        bail!("no services found in {}", root.display());
    }

    debug!(project_id, services = service_dirs.len(), "discovered local project");

    Ok(LocalProject {
        project_id,
        root,
        service_dirs,
    })
}
