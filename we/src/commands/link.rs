use anyhow::Result;
use wedeploy_common::constants::LOCAL_REMOTE;

use crate::{
    args::LinkArgs,
    machine::{Machine, Mode},
    resources::discover,
    CommandOutput, WeDeploy,
};

use super::deploy::MachineJsonOutput;

impl WeDeploy {
    /// Links to the `local` remote unless told otherwise
    pub async fn link(&self, args: LinkArgs) -> Result<CommandOutput> {
        let target = self.target(&args.target)?;
        let remote = self
            .config
            .remote(Some(target.remote.as_deref().unwrap_or(LOCAL_REMOTE)))?;
        let client = self.config.make_api_client(&remote)?;
        let local = discover(&self.global_args.working_directory, &target)?;

        self.ui.header(&format!("Linking {}", local.project_id));

        let machine = Machine::new(
            client,
            local.project_id,
            remote.infrastructure,
            Mode::Link,
            local.root,
        );
        let errors = self
            .run_machine(&machine, local.service_dirs, "Linking services...")
            .await;

        self.finish_machine(MachineJsonOutput::new(&machine, errors))
    }
}
