use anyhow::{bail, Context, Result};
use reqwest::Method;

use crate::{args::CurlArgs, CommandOutput, WeDeploy};

impl WeDeploy {
    pub async fn curl(&self, args: CurlArgs) -> Result<CommandOutput> {
        let remote = self.config.remote(self.global_args.remote.as_deref())?;
        let client = self.config.make_api_client(&remote)?;

        let method = Method::from_bytes(args.request.to_uppercase().as_bytes())
            .with_context(|| format!("invalid HTTP method {:?}", args.request))?;
        let path = if args.path.starts_with('/') {
            args.path
        } else {
            format!("/{}", args.path)
        };

        let res = client
            .raw_request(method, &path, args.data.map(String::into_bytes))
            .await?;
        let status = res.status();
        let body = res.text().await.context("failed to read the response body")?;

        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
            Err(_) if body.is_empty() => {}
            Err(_) => println!("{body}"),
        }

        if !status.is_success() {
            bail!("request failed with status {status}");
        }

        Ok(CommandOutput::None)
    }
}
