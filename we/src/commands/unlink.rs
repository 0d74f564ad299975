use anyhow::Result;
use serde_json::json;
use wedeploy_common::{constants::LOCAL_REMOTE, service_host};

use crate::{args::TargetArgs, CommandOutput, WeDeploy};

use super::common::{friendly_error, print_json};

impl WeDeploy {
    pub async fn unlink(&self, target: TargetArgs) -> Result<CommandOutput> {
        let target = self.target(&target)?;
        let remote = self
            .config
            .remote(Some(target.remote.as_deref().unwrap_or(LOCAL_REMOTE)))?;
        let client = self.config.make_api_client(&remote)?;
        let project = self.project_id(&target)?;

        let unlinked = match target.service {
            Some(ref service) => {
                client
                    .delete_service(&project, service)
                    .await
                    .map_err(|e| friendly_error(e, "unlink"))?;
                service_host(service, &project, &remote.infrastructure)
            }
            None => {
                client
                    .delete_project(&project)
                    .await
                    .map_err(|e| friendly_error(e, "unlink"))?;
                format!("{project}.{}", remote.infrastructure)
            }
        };

        if self.ui.is_human() {
            self.ui.success(format!("Unlinked {unlinked}"));
        } else {
            print_json(&json!({ "ok": true, "unlinked": unlinked }))?;
        }

        Ok(CommandOutput::Ok)
    }
}
