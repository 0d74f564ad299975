use thiserror::Error;
use wedeploy_common::descriptors::validate_id;

use crate::args::TargetArgs;

/// Where a command points at: `[service.]project` on a remote
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Target {
    pub project: Option<String>,
    pub service: Option<String>,
    pub remote: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum HostError {
    #[error("--url can not be combined with --project, --service or --remote")]
    Conflict,
    #[error("Invalid host {0:?}: expected [service.]project[.infrastructure]")]
    Invalid(String),
    #[error("Unknown infrastructure in host {0:?}")]
    UnknownInfrastructure(String),
    #[error("Invalid id {0:?} in host")]
    InvalidId(String),
}

impl TargetArgs {
    /// Resolve the dotted host or the explicit flags into a [`Target`].
    ///
    /// `infrastructures` are the `(remote name, infrastructure domain)` pairs known from config.
    pub fn resolve(
        &self,
        global_remote: Option<&str>,
        infrastructures: &[(String, String)],
    ) -> Result<Target, HostError> {
        let Some(ref url) = self.url else {
            return Ok(Target {
                project: self.project.clone(),
                service: self.service.clone(),
                remote: global_remote.map(str::to_owned),
            });
        };

        if self.project.is_some() || self.service.is_some() || global_remote.is_some() {
            return Err(HostError::Conflict);
        }

        parse_host(url, infrastructures)
    }
}

/// Parse `[scheme://][service.]project[.infrastructure][:port][/path]`
pub fn parse_host(host: &str, infrastructures: &[(String, String)]) -> Result<Target, HostError> {
    let bare = host
        .split_once("://")
        .map_or(host, |(_, rest)| rest)
        .split(['/', ':'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('.');

    if bare.is_empty() {
        return Err(HostError::Invalid(host.to_owned()));
    }

    // longest infrastructure first so `a.b.example.com` beats `example.com`
    let mut known = infrastructures.iter().collect::<Vec<_>>();
    known.sort_by_key(|(_, infra)| std::cmp::Reverse(infra.len()));

    let (prefix, remote) = match known
        .into_iter()
        .find_map(|(name, infra)| Some((bare.strip_suffix(infra.as_str())?, name)))
    {
        Some((prefix, name)) => match prefix.strip_suffix('.') {
            Some(prefix) => (prefix, Some(name.clone())),
            None if prefix.is_empty() => return Err(HostError::Invalid(host.to_owned())),
            // `myexample.com` must not match `example.com`
            None => (bare, None),
        },
        None => (bare, None),
    };

    let parts = prefix.split('.').collect::<Vec<_>>();
    let (service, project) = match parts.as_slice() {
        [project] => (None, *project),
        [service, project] => (Some(*service), *project),
        _ if remote.is_none() => return Err(HostError::UnknownInfrastructure(host.to_owned())),
        _ => return Err(HostError::Invalid(host.to_owned())),
    };

    for id in service.iter().chain(std::iter::once(&project)) {
        validate_id(id).map_err(|_| HostError::InvalidId((*id).to_owned()))?;
    }

    Ok(Target {
        project: Some(project.to_owned()),
        service: service.map(str::to_owned),
        remote,
    })
}
