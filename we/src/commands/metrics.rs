use anyhow::Result;
use serde_json::json;

use crate::{CommandOutput, WeDeploy};

use super::common::print_json;

impl WeDeploy {
    pub async fn submit_metrics(&self) -> Result<CommandOutput> {
        let remote = self.config.remote(self.global_args.remote.as_deref())?;
        let client = self.config.make_api_client(&remote)?;

        let submitted = self.metrics.submit(&client).await?;

        if self.ui.is_human() {
            self.ui.success(format!("Submitted {submitted} usage events"));
        } else {
            print_json(&json!({ "submitted": submitted }))?;
        }

        Ok(CommandOutput::None)
    }
}
