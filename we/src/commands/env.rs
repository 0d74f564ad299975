use anyhow::{anyhow, Result};
use wedeploy_api_client::WeDeployApiClient;
use wedeploy_common::models::service::EnvVariable;

use crate::{args::TargetArgs, CommandOutput, WeDeploy};

use super::common::{friendly_error, print_json};

impl WeDeploy {
    pub async fn env_show(&self, target: TargetArgs) -> Result<CommandOutput> {
        let (client, project, service) = self.env_target(&target)?;

        let mut vars = client
            .get_env(&project, &service)
            .await
            .map_err(|e| friendly_error(e, "env-var"))?
            .into_inner();
        vars.sort();

        if !self.ui.is_human() {
            print_json(&vars)?;
        } else if vars.is_empty() {
            self.ui.info(format!("No environment variables set for {service}"));
        } else {
            for var in vars {
                println!("{}={}", var.name, var.value);
            }
        }

        Ok(CommandOutput::None)
    }

    pub async fn env_set(&self, target: TargetArgs, vars: Vec<String>) -> Result<CommandOutput> {
        let vars = vars
            .iter()
            .map(|v| parse_env_var(v))
            .collect::<Result<Vec<_>>>()?;
        let (client, project, service) = self.env_target(&target)?;

        client
            .set_env(&project, &service, &vars)
            .await
            .map_err(|e| friendly_error(e, "env-var"))?;

        if self.ui.is_human() {
            for var in &vars {
                self.ui.success(format!("Set {}", var.name));
            }
        } else {
            print_json(&vars)?;
        }

        Ok(CommandOutput::Ok)
    }

    pub async fn env_unset(&self, target: TargetArgs, names: Vec<String>) -> Result<CommandOutput> {
        let (client, project, service) = self.env_target(&target)?;

        for name in &names {
            client
                .unset_env(&project, &service, name)
                .await
                .map_err(|e| friendly_error(e, "env-var"))?;
            self.ui.success(format!("Removed {name}"));
        }

        if !self.ui.is_human() {
            print_json(&names)?;
        }

        Ok(CommandOutput::Ok)
    }

    fn env_target(&self, target: &TargetArgs) -> Result<(WeDeployApiClient, String, String)> {
        let target = self.target(target)?;
        let remote = self.config.remote(target.remote.as_deref())?;
        let client = self.config.make_api_client(&remote)?;
        let project = self.project_id(&target)?;
        let service = self.service_id(&target)?;

        Ok((client, project, service))
    }
}

/// `KEY=VALUE`, the value may contain `=` itself
fn parse_env_var(var: &str) -> Result<EnvVariable> {
    let (name, value) = var
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got {var:?}"))?;
    if name.is_empty() {
        return Err(anyhow!("missing variable name in {var:?}"));
    }

    Ok(EnvVariable {
        name: name.to_owned(),
        value: value.to_owned(),
    })
}
