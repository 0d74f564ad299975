use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use wedeploy_api_client::{Credentials, WeDeployApiClient};
use wedeploy_common::{
    config::{ConfigManager, GlobalConfigManager},
    constants::{
        headers::X_WEDEPLOY_CLI_VERSION, local_api_url, DEFAULT_API_URL, DEFAULT_CONSOLE_URL,
        DEFAULT_INFRASTRUCTURE, DEFAULT_LOCAL_PORT, DEFAULT_REMOTE, LOCAL_CONSOLE_URL,
        LOCAL_INFRASTRUCTURE, LOCAL_REMOTE,
    },
};

use crate::args::{OutputMode, WeGlobalArgs};

/// A remote WeDeploy instance, as stored in the config file
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub infrastructure: String,
    pub url: Option<String>,
    pub console_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

/// Schema for the config file. Everything is optional.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct WeConfig {
    pub default_remote: Option<String>,
    pub debug: Option<bool>,
    pub output_mode: Option<OutputMode>,
    pub local_port: Option<u16>,
    pub enable_analytics: Option<bool>,
    pub poll_interval_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub remotes: BTreeMap<String, RemoteConfig>,
}

impl WeConfig {
    /// `Default::default()` is used for all-None config. This is used for default values when none are set.
    pub fn default_values() -> Self {
        Self {
            default_remote: Some(DEFAULT_REMOTE.to_owned()),
            debug: Some(false),
            output_mode: Some(OutputMode::Normal),
            local_port: Some(DEFAULT_LOCAL_PORT),
            enable_analytics: Some(false),
            poll_interval_secs: Some(1),
            request_timeout_secs: Some(60),
            remotes: BTreeMap::from([
                (
                    DEFAULT_REMOTE.to_owned(),
                    RemoteConfig {
                        infrastructure: DEFAULT_INFRASTRUCTURE.to_owned(),
                        url: Some(DEFAULT_API_URL.to_owned()),
                        console_url: Some(DEFAULT_CONSOLE_URL.to_owned()),
                        ..Default::default()
                    },
                ),
                (
                    LOCAL_REMOTE.to_owned(),
                    RemoteConfig {
                        infrastructure: LOCAL_INFRASTRUCTURE.to_owned(),
                        console_url: Some(LOCAL_CONSOLE_URL.to_owned()),
                        ..Default::default()
                    },
                ),
            ]),
        }
    }

    /// Create a new [`WeConfig`] with the values in `other` overriding the values in `self`.
    /// Remotes are merged by name.
    pub fn merge_with(self, other: WeConfig) -> Self {
        let mut remotes = self.remotes;
        remotes.extend(other.remotes);

        Self {
            default_remote: other.default_remote.or(self.default_remote),
            debug: other.debug.or(self.debug),
            output_mode: other.output_mode.or(self.output_mode),
            local_port: other.local_port.or(self.local_port),
            enable_analytics: other.enable_analytics.or(self.enable_analytics),
            poll_interval_secs: other.poll_interval_secs.or(self.poll_interval_secs),
            request_timeout_secs: other.request_timeout_secs.or(self.request_timeout_secs),
            remotes,
        }
    }

    /// Assume all non-optional fields have been set and convert to more convenient type
    pub fn into_resolved(self) -> Result<ResolvedWeConfig> {
        Ok(ResolvedWeConfig {
            default_remote: self
                .default_remote
                .context("missing default_remote when resolving config")?,
            debug: self.debug.context("missing debug when resolving config")?,
            output_mode: self
                .output_mode
                .context("missing output_mode when resolving config")?,
            local_port: self
                .local_port
                .context("missing local_port when resolving config")?,
            enable_analytics: self
                .enable_analytics
                .context("missing enable_analytics when resolving config")?,
            poll_interval: Duration::from_secs(
                self.poll_interval_secs
                    .context("missing poll_interval_secs when resolving config")?
                    .max(1),
            ),
            request_timeout_secs: self
                .request_timeout_secs
                .context("missing request_timeout_secs when resolving config")?,
            remotes: self.remotes,
        })
    }
}

/// Same as [`WeConfig`], but all non-optional fields are not options
#[derive(Debug, Clone)]
pub struct ResolvedWeConfig {
    pub default_remote: String,
    pub debug: bool,
    pub output_mode: OutputMode,
    pub local_port: u16,
    pub enable_analytics: bool,
    pub poll_interval: Duration,
    pub request_timeout_secs: u64,
    pub remotes: BTreeMap<String, RemoteConfig>,
}

/// Everything needed to talk to one remote
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRemote {
    pub name: String,
    pub infrastructure: String,
    pub api_url: String,
    pub console_url: String,
    pub credentials: Credentials,
}

impl ResolvedRemote {
    pub fn is_local(&self) -> bool {
        self.name == LOCAL_REMOTE
    }
}

pub struct ConfigHandler {
    global: GlobalConfigManager,
    api_url_override: Option<String>,
    token_override: Option<String>,

    resolved: ResolvedWeConfig,
}

impl ConfigHandler {
    pub fn new(global_args: WeGlobalArgs) -> Result<Self> {
        let global = GlobalConfigManager::new("wedeploy")?;
        Self::with_manager(global, global_args)
    }

    pub fn with_manager(global: GlobalConfigManager, global_args: WeGlobalArgs) -> Result<Self> {
        let api_url_override = global_args.api_url.clone();
        let token_override = global_args.token.clone();
        let resolved = Self::resolve_config(&global, global_args.into_config())?;

        Ok(Self {
            global,
            api_url_override,
            token_override,
            resolved,
        })
    }

    /// Read and resolve config values in the order:
    /// - Defaults
    /// - Global config (~/.config/wedeploy/config.toml)
    /// - Env vars
    /// - CLI args
    fn resolve_config(global: &GlobalConfigManager, args_config: WeConfig) -> Result<ResolvedWeConfig> {
        let mut config = WeConfig::default_values();

        if global.exists() {
            tracing::debug!(file = %global.path().display(), "Reading config file");
            match global.open::<WeConfig>() {
                Ok(globals) => config = config.merge_with(globals),
                Err(e) => tracing::warn!(error = %e, "Ignoring config file"),
            }
        }

        config = config.merge_with(args_config);
        let resolved = config.into_resolved()?;

        tracing::debug!(
            default_remote = resolved.default_remote,
            remotes = ?resolved.remotes.keys().collect::<Vec<_>>(),
            "resolved config"
        );

        Ok(resolved)
    }

    pub fn config(&self) -> &ResolvedWeConfig {
        &self.resolved
    }

    /// Path of another file in the global config directory
    pub fn global_file(&self, filename: &str) -> PathBuf {
        self.global.sibling(filename)
    }

    /// `(name, infrastructure)` of every known remote
    pub fn infrastructures(&self) -> Vec<(String, String)> {
        self.resolved
            .remotes
            .iter()
            .map(|(name, remote)| (name.clone(), remote.infrastructure.clone()))
            .collect()
    }

    /// Resolve the named remote, or the default one
    pub fn remote(&self, name: Option<&str>) -> Result<ResolvedRemote> {
        let name = name.unwrap_or(&self.resolved.default_remote);
        let remote = self.resolved.remotes.get(name).ok_or_else(|| {
            anyhow!(
                "Unknown remote {name:?}. Known remotes: {}",
                self.resolved
                    .remotes
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })?;

        let api_url = match (&self.api_url_override, &remote.url) {
            (Some(url), _) => url.clone(),
            (None, Some(url)) => url.clone(),
            (None, None) if name == LOCAL_REMOTE => local_api_url(self.resolved.local_port),
            (None, None) => format!("https://api.{}", remote.infrastructure),
        };
        let console_url = remote
            .console_url
            .clone()
            .unwrap_or_else(|| format!("https://console.{}", remote.infrastructure));
        let credentials = Credentials::from_parts(
            self.token_override.clone().or(remote.token.clone()),
            remote.username.clone(),
            remote.password.clone(),
        );

        Ok(ResolvedRemote {
            name: name.to_owned(),
            infrastructure: remote.infrastructure.clone(),
            api_url,
            console_url,
            credentials,
        })
    }

    /// Create a new API client for a remote
    pub fn make_api_client(&self, remote: &ResolvedRemote) -> Result<WeDeployApiClient> {
        WeDeployApiClient::new(
            remote.api_url.clone(),
            remote.credentials.clone(),
            Some(HeaderMap::try_from(&HashMap::from([(
                X_WEDEPLOY_CLI_VERSION.clone(),
                crate::VERSION.to_owned(),
            )]))?),
            Some(self.resolved.request_timeout_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn global_args(remote: Option<&str>) -> WeGlobalArgs {
        WeGlobalArgs {
            api_url: None,
            remote: remote.map(str::to_owned),
            token: None,
            debug: false,
            output_mode: OutputMode::Normal,
            arg_provided_fields: vec![],
            working_directory: PathBuf::from("."),
        }
    }

    #[test]
    fn defaults_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let handler = ConfigHandler::with_manager(
            GlobalConfigManager::with_directory(dir.path().to_path_buf()),
            global_args(None),
        )
        .unwrap();

        let remote = handler.remote(None).unwrap();
        assert_eq!(remote.name, "wedeploy");
        assert_eq!(remote.infrastructure, "wedeploy.io");
        assert_eq!(remote.credentials, Credentials::None);

        let local = handler.remote(Some("local")).unwrap();
        assert_eq!(local.api_url, "http://localhost:8080");
        assert!(local.is_local());

        assert!(handler.remote(Some("nope")).is_err());
    }

    #[test]
    fn config_file_and_args_layering() {
        let dir = tempfile::tempdir().unwrap();
        let manager = GlobalConfigManager::with_directory(dir.path().to_path_buf());
        std::fs::write(
            manager.path(),
            r#"
default_remote = "acme"
local_port = 9000
poll_interval_secs = 3

[remotes.acme]
infrastructure = "acme.dev"
username = "me"
password = "secret"
"#,
        )
        .unwrap();

        let handler = ConfigHandler::with_manager(manager, global_args(None)).unwrap();
        assert_eq!(handler.config().poll_interval, Duration::from_secs(3));
        let acme = handler.remote(None).unwrap();
        assert_eq!(acme.api_url, "https://api.acme.dev");
        assert_eq!(
            acme.credentials,
            Credentials::Basic {
                username: "me".to_owned(),
                password: "secret".to_owned()
            }
        );
        assert_eq!(
            handler.remote(Some("local")).unwrap().api_url,
            "http://localhost:9000"
        );

        let manager = GlobalConfigManager::with_directory(dir.path().to_path_buf());
        let handler = ConfigHandler::with_manager(manager, global_args(Some("wedeploy"))).unwrap();
        assert_eq!(handler.remote(None).unwrap().name, "wedeploy");
    }
}
