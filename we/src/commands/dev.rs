use anyhow::Result;
use tracing::error;

use crate::{
    args::{DevArgs, LinkArgs},
    infra::{InfraFlags, RunEnd, ShutdownSignals},
    CommandOutput, WeDeploy,
};

impl WeDeploy {
    /// Bring the local infrastructure up, then link the project to it
    pub async fn dev(&self, args: DevArgs) -> Result<CommandOutput> {
        let flags = InfraFlags {
            debug: args.debug_ports,
            ..Default::default()
        };
        let mut machine = self.docker_machine(flags)?;
        let mut signals = ShutdownSignals::new()?;
        machine.run(&mut signals).await?;

        // Interrupted while starting: shut down instead of linking
        if machine.interrupted() {
            if machine.watch(&mut signals).await? == RunEnd::ForceExit {
                error!("shutdown did not finish, forcing exit");
                self.ui.error("Forcing exit. Containers may still be running");
                std::process::exit(1);
            }
            self.ui.success("WeDeploy stopped");
            return Ok(CommandOutput::None);
        }

        self.link(LinkArgs {
            target: args.target,
        })
        .await
    }
}
