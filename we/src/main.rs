use anyhow::Result;
use clap::parser::ValueSource;
use clap::{CommandFactory, FromArgMatches};
use wedeploy_cli::args::WeArgs;
use wedeploy_cli::{reload_env_filter, setup_tracing, CommandOutput, WeDeploy};

#[tokio::main]
async fn main() -> Result<()> {
    // set up tracing with debug off. debug flag can't be enabled this early
    let env_filter_handle = setup_tracing(false);

    let matches = WeArgs::command().get_matches();
    let mut args = WeArgs::from_arg_matches(&matches)?;
    // store which of the args with default values that were given on the command line
    for arg in ["debug", "output_mode"] {
        if matches.value_source(arg) == Some(ValueSource::CommandLine) {
            args.globals.arg_provided_fields.push(arg);
        }
    }

    // reload to enable debugging asap if given as arg or env var
    reload_env_filter(&env_filter_handle, args.globals.debug);
    tracing::info!(version = wedeploy_cli::VERSION, "WeDeploy CLI starting");

    match WeDeploy::new(args.globals, Some(env_filter_handle))?
        .run(args.cmd)
        .await?
    {
        CommandOutput::DeploymentFailure => std::process::exit(1),
        CommandOutput::Ok | CommandOutput::None => Ok(()),
    }
}
