use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::{
    args::ListArgs,
    list::{ApiProjects, ListWatcher, ProjectSource},
    CommandOutput, WeDeploy,
};

use super::common::{friendly_error, print_json};

impl WeDeploy {
    pub async fn list(&self, args: ListArgs) -> Result<CommandOutput> {
        let target = self.target(&args.target)?;
        let remote = self.config.remote(target.remote.as_deref())?;
        let client = self.config.make_api_client(&remote)?;
        let source = Arc::new(ApiProjects {
            client,
            project: target.project,
            service: target.service,
        });

        if !self.ui.is_human() {
            let projects = source.fetch().await.map_err(|e| friendly_error(e, "list"))?;
            print_json(&projects)?;
            return Ok(CommandOutput::None);
        }

        let polling_interval = args
            .interval
            .map(Duration::from_secs)
            .unwrap_or(self.config.config().poll_interval);
        let raw = !io::stdout().is_terminal();
        let mut watcher = ListWatcher::new(
            source,
            polling_interval,
            remote.infrastructure,
            raw,
            Box::new(io::stdout()),
        );

        if !args.watch {
            watcher
                .once()
                .await
                .map_err(|e| friendly_error(e, "list"))?;
            return Ok(CommandOutput::None);
        }

        watcher.start();
        tokio::signal::ctrl_c().await?;
        watcher.stop().await;

        Ok(CommandOutput::None)
    }
}
