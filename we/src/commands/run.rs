use anyhow::Result;
use tracing::error;
use wedeploy_common::constants::LOCAL_REMOTE;

use crate::{
    args::RunArgs,
    infra::{DockerMachine, InfraFlags, RunEnd, ShutdownSignals},
    CommandOutput, WeDeploy,
};

impl WeDeploy {
    pub async fn local_run(&self, args: RunArgs) -> Result<CommandOutput> {
        let flags = InfraFlags {
            debug: args.debug_ports,
            detach: args.detach,
            dry_run: args.dry_run,
            view_mode: args.view_mode,
            pull: args.pull,
        };
        let mut machine = self.docker_machine(flags)?;
        if let Some(image) = args.image {
            machine = machine.with_image(image);
        }

        let mut signals = ShutdownSignals::new()?;
        machine.run(&mut signals).await?;

        match machine.watch(&mut signals).await? {
            RunEnd::Started if !flags.dry_run => {
                self.ui.success("WeDeploy is running. Stop it with `we stop`")
            }
            RunEnd::Started => {}
            RunEnd::Exited(code) => self.ui.warn(format!("WeDeploy exited with status {code}")),
            RunEnd::Stopped => self.ui.success("WeDeploy stopped"),
            RunEnd::Detached => self.ui.info("Detached. WeDeploy is still running"),
            RunEnd::ForceExit => {
                error!("shutdown did not finish, forcing exit");
                self.ui.error("Forcing exit. Containers may still be running");
                std::process::exit(1);
            }
        }

        Ok(CommandOutput::None)
    }

    pub async fn local_stop(&self) -> Result<CommandOutput> {
        let machine = self.docker_machine(InfraFlags::default())?;

        self.ui.step("", "Stopping WeDeploy...");
        machine.stop().await;
        self.ui.success("WeDeploy stopped");

        Ok(CommandOutput::None)
    }

    /// The infrastructure serves the API of the `local` remote
    pub(super) fn docker_machine(&self, flags: InfraFlags) -> Result<DockerMachine> {
        let remote = self.config.remote(Some(LOCAL_REMOTE))?;
        let client = self.config.make_api_client(&remote)?;

        Ok(DockerMachine::new(flags, client, self.ui))
    }
}
