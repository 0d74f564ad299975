use std::io::{self, IsTerminal};

use anyhow::Result;
use wedeploy_common::models::activity::{get_activities_table, ActivitiesFilter, ActivityType};

use crate::{args::ActivitiesArgs, CommandOutput, WeDeploy};

use super::common::{finish_spinner, friendly_error, make_spinner, print_json};

impl WeDeploy {
    pub async fn activities(&self, args: ActivitiesArgs) -> Result<CommandOutput> {
        let target = self.target(&args.target)?;
        let remote = self.config.remote(target.remote.as_deref())?;
        let client = self.config.make_api_client(&remote)?;
        let project = self.project_id(&target)?;

        let filter = ActivitiesFilter {
            commit: args.commit,
            group_uid: args.group,
            limit: Some(args.limit),
            types: if args.deployments {
                ActivityType::DEPLOYMENT.to_vec()
            } else {
                vec![]
            },
        };

        let spinner = make_spinner(self.config.config().output_mode, "Fetching activities...");
        let res = client.get_activities(&project, &filter).await;
        finish_spinner(spinner);
        let mut activities = res.map_err(|e| friendly_error(e, "activities"))?.into_inner();

        if let Some(ref service) = target.service {
            activities.0.retain(|a| a.service_id() == Some(service.as_str()));
        }
        // oldest first, like a log
        activities.reverse();

        if self.ui.is_human() {
            print!(
                "{}",
                get_activities_table(&activities, !io::stdout().is_terminal())
            );
        } else {
            print_json(&activities)?;
        }

        Ok(CommandOutput::None)
    }
}
