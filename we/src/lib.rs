pub mod activities;
pub mod args;
pub mod commands;
pub mod config;
pub mod hooks;
pub mod hosts;
pub mod infra;
pub mod list;
pub mod machine;
pub mod metrics;
pub mod package;
pub mod resources;
pub mod ui;

use anyhow::{bail, Result};
use tracing::{debug, trace};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, reload, reload::Handle, util::SubscriberInitExt, EnvFilter,
    Registry,
};
use wedeploy_common::descriptors::{
    find_project_root, validate_id, ProjectDescriptor, ServiceDescriptor,
};

use crate::{
    args::{EnvVarCommand, GenerateCommand, MetricsCommand, TargetArgs, WeCommand, WeGlobalArgs},
    config::ConfigHandler,
    hosts::Target,
    metrics::{MetricsCollector, METRICS_FILE},
    ui::Ui,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub enum CommandOutput {
    Ok,
    /// The command ran, but something it started failed
    DeploymentFailure,
    None,
}

pub struct WeDeploy {
    config: ConfigHandler,
    global_args: WeGlobalArgs,
    ui: Ui,
    metrics: MetricsCollector,
}

impl WeDeploy {
    pub fn new(
        global_args: WeGlobalArgs,
        env_filter_handle: Option<Handle<EnvFilter, Registry>>,
    ) -> Result<Self> {
        let config = ConfigHandler::new(global_args.clone())?;
        Ok(Self::with_config(config, global_args, env_filter_handle))
    }

    pub fn with_config(
        config: ConfigHandler,
        global_args: WeGlobalArgs,
        env_filter_handle: Option<Handle<EnvFilter, Registry>>,
    ) -> Self {
        // Config files may turn on debug output
        if let Some(ref handle) = env_filter_handle {
            reload_env_filter(handle, config.config().debug);
        }

        let ui = Ui::new(config.config().output_mode);
        let metrics = MetricsCollector::new(
            config.global_file(METRICS_FILE),
            config.config().enable_analytics,
        );

        Self {
            config,
            global_args,
            ui,
            metrics,
        }
    }

    pub async fn run(self, command: WeCommand) -> Result<CommandOutput> {
        use WeCommand::*;

        let name: &'static str = (&command).into();
        let event = MetricsCollector::event(name, self.global_args.remote.clone());
        if let Err(e) = self.metrics.record(&event) {
            debug!(error = %e, "failed to record usage event");
        }
        trace!(command = name, "running command");

        match command {
            Deploy(args) => self.deploy(args).await,
            Link(args) => self.link(args).await,
            Unlink(args) => self.unlink(args.target).await,
            List(args) => self.list(args).await,
            Activities(args) => self.activities(args).await,
            Run(args) => self.local_run(args).await,
            Stop => self.local_stop().await,
            Dev(args) => self.dev(args).await,
            EnvVar(cmd) => match cmd {
                EnvVarCommand::Show(args) => self.env_show(args.target).await,
                EnvVarCommand::Set { target, vars } => self.env_set(target, vars).await,
                EnvVarCommand::Unset { target, names } => self.env_unset(target, names).await,
            },
            Curl(args) => self.curl(args).await,
            Metrics(MetricsCommand::Submit) => self.submit_metrics().await,
            Generate(GenerateCommand::Shell { shell, output_file }) => {
                self.generate_completions(shell, output_file).await
            }
        }
    }

    /// Resolve `--url` or `--project`/`--service` against the known remotes
    pub(crate) fn target(&self, args: &TargetArgs) -> Result<Target> {
        Ok(args.resolve(
            self.global_args.remote.as_deref(),
            &self.config.infrastructures(),
        )?)
    }

    /// Project of the target, or of the closest `project.json`
    pub(crate) fn project_id(&self, target: &Target) -> Result<String> {
        if let Some(ref project) = target.project {
            validate_id(project)?;
            return Ok(project.clone());
        }

        match find_project_root(&self.global_args.working_directory) {
            Some(root) => Ok(ProjectDescriptor::read(&root)?.id),
            None => bail!("no project given and no project.json found. Use --project to pick one"),
        }
    }

    /// Service of the target, or of the working directory
    pub(crate) fn service_id(&self, target: &Target) -> Result<String> {
        if let Some(ref service) = target.service {
            validate_id(service)?;
            return Ok(service.clone());
        }

        let dir = &self.global_args.working_directory;
        if !ServiceDescriptor::exists_in(dir) {
            bail!("no service given and none found in the working directory. Use --service to pick one");
        }
        Ok(ServiceDescriptor::read(dir)?.id)
    }
}

/// Install the global subscriber and return a handle for changing its filter later
pub fn setup_tracing(debug: bool) -> Handle<EnvFilter, Registry> {
    let (filter, handle) = reload::Layer::new(env_filter(debug));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).without_time())
        .init();

    handle
}

pub fn reload_env_filter(handle: &Handle<EnvFilter, Registry>, debug: bool) {
    if let Err(e) = handle.reload(env_filter(debug)) {
        eprintln!("Failed to reload the log filter: {e}");
    }
}

fn env_filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("info,wedeploy=trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}
