use std::{
    ffi::OsString,
    io::{self, ErrorKind},
    path::PathBuf,
};

use clap::{
    builder::{OsStringValueParser, TypedValueParser},
    Args, Parser, Subcommand, ValueEnum,
};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};

use crate::config::WeConfig;

#[derive(Parser)]
#[command(version, next_help_heading = "Global options")]
pub struct WeArgs {
    #[command(flatten)]
    pub globals: WeGlobalArgs,

    #[command(subcommand)]
    pub cmd: WeCommand,
}

#[derive(Args, Clone, Debug)]
pub struct WeGlobalArgs {
    /// URL for the WeDeploy API to target (overrides the remote's URL)
    #[arg(global = true, long, env = "WE_API", hide = true)]
    pub api_url: Option<String>,
    /// Remote to target, eg. `wedeploy` or `local`
    #[arg(global = true, long, short = 'r', env = "WE_REMOTE")]
    pub remote: Option<String>,
    /// Token used instead of the remote's stored credentials
    #[arg(global = true, long, env = "WE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
    /// Turn on tracing output for WeDeploy libraries. (WARNING: can print sensitive data)
    #[arg(global = true, long, env = "WE_DEBUG")]
    pub debug: bool,
    /// What format to print output in
    #[arg(
        global = true,
        long = "output",
        env = "WE_OUTPUT_MODE",
        default_value = "normal"
    )]
    pub output_mode: OutputMode,

    /// Utility for knowing which of the above config fields were given as args, not used for parsing
    #[arg(skip)]
    pub arg_provided_fields: Vec<&'static str>,

    // Global args that can't be modified in config:
    #[arg(global = true, long, visible_alias = "wd", default_value = ".", value_parser = OsStringValueParser::new().try_map(parse_path))]
    pub working_directory: PathBuf,
}

impl WeGlobalArgs {
    pub fn into_config(self) -> WeConfig {
        // For args that have default values in clap:
        //   Only set them to Some() if a value was given on the command line,
        //   so that the default value is not mistaken as an explicitly given arg and overrides config from files.
        WeConfig {
            default_remote: self.remote,
            debug: self
                .arg_provided_fields
                .contains(&"debug")
                .then_some(self.debug),
            output_mode: self
                .arg_provided_fields
                .contains(&"output_mode")
                .then_some(self.output_mode),
            ..Default::default()
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Normal,
    Json,
}

/// Which project, service and remote a command acts on.
///
/// Either a dotted host (`[service.]project[.infrastructure]`) or the explicit flags.
#[derive(Args, Clone, Debug, Default)]
pub struct TargetArgs {
    /// Host to target, eg. `web.shop.wedeploy.io`
    #[arg(long, short = 'u')]
    pub url: Option<String>,
    /// Project id
    #[arg(long, short = 'p')]
    pub project: Option<String>,
    /// Service id
    #[arg(long, short = 's', visible_alias = "container")]
    pub service: Option<String>,
}

/// CLI for the WeDeploy platform
#[derive(Subcommand, strum::IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum WeCommand {
    /// Deploy the services of a project
    #[command(visible_alias = "d")]
    Deploy(DeployArgs),
    /// Link the services of a project to a running instance
    Link(LinkArgs),
    /// Unlink a project or service
    Unlink(TargetCommandArgs),
    /// List projects and services
    #[command(visible_alias = "ls")]
    List(ListArgs),
    /// Show recent activities of a project
    Activities(ActivitiesArgs),
    /// Run the local WeDeploy infrastructure
    Run(RunArgs),
    /// Stop the local WeDeploy infrastructure
    Stop,
    /// Start the local infrastructure and link the current project to it
    Dev(DevArgs),
    /// Manage environment variables of a service
    #[command(subcommand, name = "env-var", visible_alias = "env")]
    EnvVar(EnvVarCommand),
    /// Do an authenticated request to the WeDeploy API
    Curl(CurlArgs),
    /// Usage metrics
    #[command(subcommand)]
    Metrics(MetricsCommand),
    /// Generate shell completions
    #[command(subcommand, visible_alias = "gen")]
    Generate(GenerateCommand),
}

#[derive(Args, Clone, Debug, Default)]
pub struct TargetCommandArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Args, Clone, Debug, Default)]
pub struct DeployArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Don't wait for the build and deploy to finish
    #[arg(long)]
    pub no_watch: bool,
    /// Stop watching the deployment after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct LinkArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Args, Clone, Debug, Default)]
pub struct ListArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Keep refreshing the list
    #[arg(long, short = 'w')]
    pub watch: bool,
    /// Seconds between refreshes when watching
    #[arg(long)]
    pub interval: Option<u64>,
}

#[derive(Args, Clone, Debug)]
pub struct ActivitiesArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Only activities of this commit
    #[arg(long)]
    pub commit: Option<String>,
    /// Only activities of this deployment group
    #[arg(long)]
    pub group: Option<String>,
    /// Max number of activities
    #[arg(long, default_value = "25")]
    pub limit: u32,
    /// Only build and deploy activities
    #[arg(long)]
    pub deployments: bool,
}

#[derive(Args, Clone, Debug, Default)]
pub struct RunArgs {
    /// Expose the debug ports of the infrastructure
    #[arg(long)]
    pub debug_ports: bool,
    /// Return once the infrastructure is started
    #[arg(long, conflicts_with = "view_mode")]
    pub detach: bool,
    /// Print the docker command instead of running it
    #[arg(long)]
    pub dry_run: bool,
    /// Attach to a running infrastructure without stopping it on exit
    #[arg(long)]
    pub view_mode: bool,
    /// Pull the infrastructure image even if it is present
    #[arg(long)]
    pub pull: bool,
    /// Infrastructure image to run
    #[arg(long, hide = true)]
    pub image: Option<String>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct DevArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Expose the debug ports of the infrastructure
    #[arg(long)]
    pub debug_ports: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum EnvVarCommand {
    /// Show the environment variables of a service
    Show(TargetCommandArgs),
    /// Set environment variables, given as KEY=VALUE
    Set {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(required = true)]
        vars: Vec<String>,
    },
    /// Remove environment variables
    Unset {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Args, Clone, Debug)]
pub struct CurlArgs {
    /// Path on the API, eg. `/projects`
    pub path: String,
    /// HTTP method
    #[arg(long, short = 'X', default_value = "GET")]
    pub request: String,
    /// Request body
    #[arg(long, short = 'd')]
    pub data: Option<String>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum MetricsCommand {
    /// Submit recorded usage events
    Submit,
}

#[derive(Subcommand, Clone, Debug)]
pub enum GenerateCommand {
    /// Generate shell completions
    Shell {
        /// The shell to generate shell completion for
        shell: Shell,
        /// Output to a file (stdout by default)
        #[arg(short, long)]
        output_file: Option<PathBuf>,
    },
}

/// Helper function to parse and return the absolute path
pub fn parse_path(path: OsString) -> Result<PathBuf, io::Error> {
    dunce::canonicalize(&path).map_err(|e| {
        io::Error::new(
            ErrorKind::InvalidInput,
            format!("could not turn {path:?} into a real path: {e}"),
        )
    })
}
