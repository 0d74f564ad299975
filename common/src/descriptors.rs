//! Local `project.json` and `service.json` / `container.json` descriptor files

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::constants::{LEGACY_SERVICE_DESCRIPTOR, PROJECT_DESCRIPTOR, SERVICE_DESCRIPTOR};

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("missing {file} in {}", .dir.display())]
    NotFound { dir: PathBuf, file: &'static str },
    #[error("can not read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("error parsing {}: {source}", .path.display())]
    Corrupted {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
}

// Note: the "Invalid id" prefix is matched against by scripts wrapping the CLI.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error(
    "Invalid id {0:?}. Ids must:
    1. only contain lowercase alphanumeric characters or dashes `-`.
    2. not start or end with a dash.
    3. not be empty.
    4. be shorter than 64 characters."
)]
pub struct InvalidId(pub String);

pub fn validate_id(id: &str) -> Result<(), InvalidId> {
    let valid = !id.is_empty()
        && id.len() < 64
        && !id.starts_with('-')
        && !id.ends_with('-')
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(InvalidId(id.to_owned()))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<String>,
}

impl ProjectDescriptor {
    pub fn read(dir: &Path) -> Result<Self, DescriptorError> {
        let project: Self = read_json(dir, PROJECT_DESCRIPTOR)?;
        validate_id(&project.id)?;
        Ok(project)
    }
}

/// Shell commands run around the build and deploy steps of a service
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hooks {
    pub before_build: Option<String>,
    pub build: Option<String>,
    pub after_build: Option<String>,
    pub before_deploy: Option<String>,
    pub after_deploy: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Hooks>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

impl ServiceDescriptor {
    /// Reads `service.json`, falling back to the legacy `container.json`
    pub fn read(dir: &Path) -> Result<Self, DescriptorError> {
        let file = if dir.join(SERVICE_DESCRIPTOR).exists() {
            SERVICE_DESCRIPTOR
        } else if dir.join(LEGACY_SERVICE_DESCRIPTOR).exists() {
            LEGACY_SERVICE_DESCRIPTOR
        } else {
            return Err(DescriptorError::NotFound {
                dir: dir.to_path_buf(),
                file: SERVICE_DESCRIPTOR,
            });
        };

        let service: Self = read_json(dir, file)?;
        validate_id(&service.id)?;
        Ok(service)
    }

    pub fn exists_in(dir: &Path) -> bool {
        dir.join(SERVICE_DESCRIPTOR).exists() || dir.join(LEGACY_SERVICE_DESCRIPTOR).exists()
    }

    pub fn hooks(&self) -> Hooks {
        self.hooks.clone().unwrap_or_default()
    }
}

fn read_json<T: DeserializeOwned>(dir: &Path, file: &'static str) -> Result<T, DescriptorError> {
    let path = dir.join(file);
    let content = fs::read(&path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => DescriptorError::NotFound {
            dir: dir.to_path_buf(),
            file,
        },
        _ => DescriptorError::Unreadable {
            path: path.clone(),
            source,
        },
    })?;

    serde_json::from_slice(&content).map_err(|source| DescriptorError::Corrupted { path, source })
}

/// Walks up from `start` looking for a directory containing `project.json`
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(PROJECT_DESCRIPTOR).exists())
        .map(Path::to_path_buf)
}

/// Service directories of a project: the root itself if it holds a service
/// descriptor, plus every direct subdirectory that does. Sorted by path.
pub fn list_service_dirs(project_root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = vec![];

    if ServiceDescriptor::exists_in(project_root) {
        dirs.push(project_root.to_path_buf());
    }

    for entry in fs::read_dir(project_root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() && ServiceDescriptor::exists_in(&entry.path()) {
            dirs.push(entry.path());
        }
    }

    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn read_service_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("container.json"),
            r#"{
                "id": "mycontainer",
                "image": "wedeploy/data",
                "hooks": { "beforeDeploy": "npm install", "afterDeploy": "echo done" },
                "env": { "DEBUG": "1" },
                "scale": 2
            }"#,
        )
        .unwrap();

        let service = ServiceDescriptor::read(dir.path()).unwrap();
        assert_eq!(
            service,
            ServiceDescriptor {
                id: "mycontainer".to_owned(),
                name: None,
                image: Some("wedeploy/data".to_owned()),
                hooks: Some(Hooks {
                    before_deploy: Some("npm install".to_owned()),
                    after_deploy: Some("echo done".to_owned()),
                    ..Default::default()
                }),
                env: BTreeMap::from([("DEBUG".to_owned(), "1".to_owned())]),
                scale: Some(2),
            }
        );
    }

    #[test]
    fn service_json_wins_over_container_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("container.json"), r#"{"id": "old"}"#).unwrap();
        fs::write(dir.path().join("service.json"), r#"{"id": "new"}"#).unwrap();

        assert_eq!(ServiceDescriptor::read(dir.path()).unwrap().id, "new");
    }

    #[test]
    fn missing_and_corrupted_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ServiceDescriptor::read(dir.path()),
            Err(DescriptorError::NotFound { .. })
        ));

        fs::write(dir.path().join("service.json"), "{").unwrap();
        assert!(matches!(
            ServiceDescriptor::read(dir.path()),
            Err(DescriptorError::Corrupted { .. })
        ));

        fs::write(dir.path().join("service.json"), r#"{"id": "Bad_Id"}"#).unwrap();
        assert!(matches!(
            ServiceDescriptor::read(dir.path()),
            Err(DescriptorError::InvalidId(InvalidId(id))) if id == "Bad_Id"
        ));
    }

    #[test]
    fn ids() {
        assert!(validate_id("my-project-1").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("-project").is_err());
        assert!(validate_id("project-").is_err());
        assert!(validate_id("Project").is_err());
        assert!(validate_id(&"a".repeat(64)).is_err());
    }

    #[test]
    fn project_root_and_services() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("project.json"), r#"{"id": "project"}"#).unwrap();
        for service in ["web", "api"] {
            fs::create_dir(root.join(service)).unwrap();
            fs::write(
                root.join(service).join("service.json"),
                format!(r#"{{"id": "{service}"}}"#),
            )
            .unwrap();
        }
        fs::create_dir(root.join("docs")).unwrap();

        assert_eq!(find_project_root(&root.join("web")).unwrap(), root);
        assert_eq!(ProjectDescriptor::read(root).unwrap().id, "project");
        assert_eq!(
            list_service_dirs(root).unwrap(),
            vec![root.join("api"), root.join("web")]
        );
    }
}
