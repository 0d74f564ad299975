use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::warn;

use crate::{
    activities::{prompt_open_logs, DeployWatcher, Summary},
    args::DeployArgs,
    machine::{Errors, Machine, Mode, ServiceError},
    resources::discover,
    CommandOutput, WeDeploy,
};

use super::common::{finish_spinner, make_spinner, print_json};

#[derive(Serialize)]
pub(super) struct MachineJsonOutput {
    pub ok: bool,
    pub project: String,
    pub group_uid: String,
    pub ready: Vec<String>,
    pub errors: Vec<ServiceError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
}

impl MachineJsonOutput {
    pub fn new(machine: &Machine, errors: Option<Errors>) -> Self {
        Self {
            ok: errors.is_none(),
            project: machine.project_id().to_owned(),
            group_uid: machine.group_uid().to_owned(),
            ready: machine.success(),
            errors: errors.map(|e| e.list).unwrap_or_default(),
            summary: None,
        }
    }

    pub fn command_output(&self) -> CommandOutput {
        if self.ok {
            CommandOutput::Ok
        } else {
            CommandOutput::DeploymentFailure
        }
    }
}

impl WeDeploy {
    pub async fn deploy(&self, args: DeployArgs) -> Result<CommandOutput> {
        let target = self.target(&args.target)?;
        let remote = self.config.remote(target.remote.as_deref())?;
        let client = self.config.make_api_client(&remote)?;
        let local = discover(&self.global_args.working_directory, &target)?;

        self.ui.header(&format!("Deploying {}", local.project_id));

        let machine = Machine::new(
            client.clone(),
            local.project_id.clone(),
            remote.infrastructure.clone(),
            Mode::Deploy,
            local.root,
        );
        let errors = self
            .run_machine(&machine, local.service_dirs, "Uploading services...")
            .await;
        let mut output = MachineJsonOutput::new(&machine, errors);

        let deployed = machine.deployed_services();
        if args.no_watch || deployed.is_empty() {
            return self.finish_machine(output);
        }

        let mut watcher = DeployWatcher::new(
            client,
            local.project_id.clone(),
            remote.infrastructure.clone(),
            deployed,
        )
        .with_group_uid(machine.group_uid())
        .with_poll_interval(self.config.config().poll_interval)
        .with_timeout(args.timeout.map(Duration::from_secs));
        if !self.ui.is_human() {
            watcher = watcher.hidden();
        }

        watcher.watch().await?;
        let summary = watcher.summary();

        if summary.has_failures() {
            self.ui.error(summary.describe());

            if self.ui.is_human() && io::stdin().is_terminal() {
                let url = summary.logs_url(&remote.console_url, &local.project_id);
                if prompt_open_logs(io::stdin().lock(), io::stderr())? {
                    if let Err(e) = webbrowser::open(&url) {
                        warn!(error = %e, "failed to open browser");
                        self.ui.warn(format!("Failed to open a browser. Logs are at {url}"));
                    }
                }
            }
        } else {
            self.ui.success(summary.describe());
        }

        output.ok = output.ok && !summary.has_failures();
        output.summary = Some(summary);
        self.finish_machine(output)
    }

    /// Run the machine behind a spinner and show what came out of it
    pub(super) async fn run_machine(
        &self,
        machine: &Machine,
        service_dirs: Vec<PathBuf>,
        message: &str,
    ) -> Option<Errors> {
        let spinner = make_spinner(self.config.config().output_mode, message);
        let res = machine.run(service_dirs).await;
        finish_spinner(spinner);

        for line in machine.success() {
            self.ui.success(line);
        }

        match res {
            Ok(()) => None,
            Err(errors) => {
                self.ui.error(errors.to_string());
                Some(errors)
            }
        }
    }

    pub(super) fn finish_machine(&self, output: MachineJsonOutput) -> Result<CommandOutput> {
        if !self.ui.is_human() {
            print_json(&output)?;
        }
        Ok(output.command_output())
    }
}
