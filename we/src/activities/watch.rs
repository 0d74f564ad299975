use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossterm::style::Stylize;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace};
use wedeploy_api_client::WeDeployApiClient;
use wedeploy_common::{
    models::activity::{ActivitiesFilter, Activity, ActivityCategory, ActivityType},
    service_host,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

struct ServiceWatch {
    state: Option<ActivityType>,
    message: String,
    bar: ProgressBar,
}

/// Follows the build and deploy activities of a set of services until every
/// one of them has succeeded or failed.
pub struct DeployWatcher {
    client: WeDeployApiClient,
    project_id: String,
    infrastructure: String,
    group_uid: Option<String>,
    services: BTreeMap<String, ServiceWatch>,
    poll_interval: Duration,
    timeout: Option<Duration>,
    multi: MultiProgress,
}

impl DeployWatcher {
    pub fn new(
        client: WeDeployApiClient,
        project_id: String,
        infrastructure: String,
        services: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut watcher = Self {
            client,
            project_id,
            infrastructure,
            group_uid: None,
            services: BTreeMap::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::stderr()),
        };
        for service in services {
            watcher.track(service);
        }
        watcher
    }

    /// Only follow the activities of one deployment
    pub fn with_group_uid(mut self, group_uid: impl Into<String>) -> Self {
        self.group_uid = Some(group_uid.into());
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Don't draw the status lines
    pub fn hidden(self) -> Self {
        self.multi.set_draw_target(ProgressDrawTarget::hidden());
        self
    }

    fn track(&mut self, service: String) {
        let host = service_host(&service, &self.project_id, &self.infrastructure);
        let message = format!("waiting for {host}");

        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "),
        );
        bar.set_message(message.clone());

        self.services.insert(
            service,
            ServiceWatch {
                state: None,
                message,
                bar,
            },
        );
    }

    pub fn state(&self, service: &str) -> Option<&ActivityType> {
        self.services.get(service)?.state.as_ref()
    }

    /// Status line currently shown for a service
    pub fn message(&self, service: &str) -> Option<&str> {
        self.services.get(service).map(|s| s.message.as_str())
    }

    pub fn is_final(&self, service: &str) -> bool {
        self.state(service).is_some_and(ActivityType::is_final)
    }

    pub fn all_final(&self) -> bool {
        self.services
            .values()
            .all(|s| s.state.as_ref().is_some_and(ActivityType::is_final))
    }

    /// Feed one activity. Returns whether anything changed.
    ///
    /// Activities that are not about deployments, are about services that are
    /// not tracked, or about services that already finished are ignored.
    pub fn apply(&mut self, activity: &Activity) -> bool {
        let (Some(category), Some(phrase)) = (activity.r#type.category(), activity.r#type.phrase())
        else {
            return false;
        };
        let Some(service_id) = activity.service_id() else {
            trace!(id = activity.id, "activity without service");
            return false;
        };
        let Some(watch) = self.services.get_mut(service_id) else {
            trace!(service = service_id, "activity for untracked service");
            return false;
        };
        if watch.state.as_ref().is_some_and(ActivityType::is_final) {
            return false;
        }

        if activity.r#type.is_state_defining() {
            watch.state = Some(activity.r#type.clone());
        }

        let prefix = match category {
            ActivityCategory::Build => "building",
            ActivityCategory::Deploy => "deploying",
        };
        let host = service_host(service_id, &self.project_id, &self.infrastructure);
        watch.message = format!("{prefix} {host} ({phrase})");
        debug!(service = service_id, kind = %activity.r#type, "activity");

        if activity.r#type.is_failure() {
            finish_line(&watch.bar, format!("{} {}", "✖".red(), watch.message.clone().red()));
        } else if activity.r#type == ActivityType::DeploySucceeded {
            finish_line(&watch.bar, format!("{} {}", "✔".green(), watch.message));
        } else {
            watch.bar.set_message(watch.message.clone());
            watch.bar.tick();
        }

        true
    }

    /// Poll the activities until every tracked service is final
    pub async fn watch(&mut self) -> Result<()> {
        for watch in self.services.values() {
            watch.bar.enable_steady_tick(Duration::from_millis(80));
        }

        let res = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.poll())
                .await
                .map_err(|_| {
                    anyhow!(
                        "gave up waiting for the deployment after {}s",
                        timeout.as_secs()
                    )
                })
                .and_then(|res| res),
            None => self.poll().await,
        };

        for watch in self.services.values() {
            if !watch.bar.is_finished() {
                watch.bar.abandon();
            }
        }

        res
    }

    async fn poll(&mut self) -> Result<()> {
        let filter = ActivitiesFilter {
            group_uid: self.group_uid.clone(),
            types: ActivityType::DEPLOYMENT.to_vec(),
            ..Default::default()
        };

        let mut interval = interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.all_final() {
            interval.tick().await;

            let mut activities = self
                .client
                .get_activities(&self.project_id, &filter)
                .await?
                .into_inner();
            // newest first from the API
            activities.reverse();

            for activity in activities.iter() {
                self.apply(activity);
            }
        }

        Ok(())
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();

        for (service, watch) in &self.services {
            match watch.state {
                Some(ActivityType::BuildFailed) => summary.failed_builds.push(service.clone()),
                Some(ActivityType::DeployFailed) => summary.failed_deploys.push(service.clone()),
                _ => summary.succeeded.push(service.clone()),
            }
        }

        summary
    }
}

fn finish_line(bar: &ProgressBar, message: String) {
    bar.set_style(
        ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.finish_with_message(message);
}

/// Outcome of a watched deployment. Services that did not fail count as succeeded.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub failed_builds: Vec<String>,
    pub failed_deploys: Vec<String>,
    pub succeeded: Vec<String>,
}

impl Summary {
    pub fn has_failures(&self) -> bool {
        !self.failed_builds.is_empty() || !self.failed_deploys.is_empty()
    }

    pub fn describe(&self) -> String {
        if !self.has_failures() {
            return format!("Deployment successful ({} services)", self.succeeded.len());
        }

        let mut parts = vec![];
        if !self.failed_builds.is_empty() {
            parts.push(format!("build failed for {}", self.failed_builds.join(", ")));
        }
        if !self.failed_deploys.is_empty() {
            parts.push(format!("deploy failed for {}", self.failed_deploys.join(", ")));
        }
        format!("Deployment failed: {}", parts.join("; "))
    }

    /// Where to look at the logs. A single failed service gets a pre-filtered view.
    pub fn logs_url(&self, console_url: &str, project: &str) -> String {
        let base = format!("{}/projects/{project}/logs", console_url.trim_end_matches('/'));

        match (self.failed_builds.as_slice(), self.failed_deploys.as_slice()) {
            ([service], []) => format!("{base}?services={service}&type=build"),
            ([], [service]) => format!("{base}?services={service}"),
            _ => base,
        }
    }
}

/// Ask whether to open the logs in a browser, asking again on unrecognized answers.
/// The end of input counts as no.
pub fn prompt_open_logs<R: BufRead, W: Write>(mut input: R, mut output: W) -> io::Result<bool> {
    loop {
        write!(output, "Open browser to check the logs? [Y/n]: ")?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            writeln!(output)?;
            return Ok(false);
        }

        match answer.trim().to_lowercase().as_str() {
            "" | "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            other => writeln!(output, "Unrecognized answer {other:?}, please type y or n")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;
    use wedeploy_api_client::Credentials;

    use super::*;

    fn watcher(services: &[&str]) -> DeployWatcher {
        let client =
            WeDeployApiClient::new("http://localhost".to_owned(), Credentials::None, None, None)
                .unwrap();
        DeployWatcher::new(
            client,
            "shop".to_owned(),
            "wedeploy.io".to_owned(),
            services.iter().map(|s| s.to_string()),
        )
        .hidden()
    }

    fn activity(service: &str, r#type: ActivityType) -> Activity {
        Activity {
            id: "1".to_owned(),
            created_at: 0,
            commit: None,
            project_id: "shop".to_owned(),
            project_uid: None,
            group_uid: None,
            r#type,
            metadata: BTreeMap::from([("serviceId".to_owned(), service.to_owned())]),
        }
    }

    #[test]
    fn pending_and_started_only_change_the_message() {
        let mut watcher = watcher(&["web"]);

        assert!(watcher.apply(&activity("web", ActivityType::BuildStarted)));
        assert_eq!(watcher.state("web"), None);
        assert_eq!(
            watcher.message("web"),
            Some("building web.shop.wedeploy.io (build started)")
        );

        assert!(watcher.apply(&activity("web", ActivityType::BuildSucceeded)));
        assert_eq!(watcher.state("web"), Some(&ActivityType::BuildSucceeded));
        assert!(!watcher.is_final("web"));

        watcher.apply(&activity("web", ActivityType::DeployStarted));
        assert_eq!(
            watcher.message("web"),
            Some("deploying web.shop.wedeploy.io (deploy started)")
        );
    }

    #[test]
    fn final_state_never_regresses() {
        let mut watcher = watcher(&["web", "api"]);

        watcher.apply(&activity("web", ActivityType::BuildFailed));
        assert!(watcher.is_final("web"));
        assert!(!watcher.all_final());

        assert!(!watcher.apply(&activity("web", ActivityType::DeploySucceeded)));
        assert!(!watcher.apply(&activity("web", ActivityType::BuildStarted)));
        assert_eq!(watcher.state("web"), Some(&ActivityType::BuildFailed));
        assert!(watcher.is_final("web"));

        watcher.apply(&activity("api", ActivityType::DeploySucceeded));
        assert!(watcher.all_final());
    }

    #[test]
    fn unrelated_activities_are_ignored() {
        let mut watcher = watcher(&["web"]);

        assert!(!watcher.apply(&activity("other", ActivityType::BuildFailed)));
        assert!(!watcher.apply(&activity("web", ActivityType::ProjectCreated)));
        assert!(!watcher.apply(&activity(
            "web",
            ActivityType::Unknown("SOMETHING_NEW".to_owned())
        )));

        let mut no_service = activity("web", ActivityType::BuildFailed);
        no_service.metadata.clear();
        assert!(!watcher.apply(&no_service));

        assert_eq!(watcher.state("web"), None);
        assert_eq!(watcher.message("web"), Some("waiting for web.shop.wedeploy.io"));
    }

    #[test]
    fn summary_and_logs_url() {
        let mut watcher = watcher(&["api", "web", "db"]);
        watcher.apply(&activity("web", ActivityType::BuildFailed));
        watcher.apply(&activity("api", ActivityType::DeploySucceeded));
        watcher.apply(&activity("db", ActivityType::DeploySucceeded));

        let summary = watcher.summary();
        assert_eq!(
            summary,
            Summary {
                failed_builds: vec!["web".to_owned()],
                failed_deploys: vec![],
                succeeded: vec!["api".to_owned(), "db".to_owned()],
            }
        );
        let console = "https://console.wedeploy.com";
        assert_eq!(
            summary.logs_url(console, "shop"),
            "https://console.wedeploy.com/projects/shop/logs?services=web&type=build"
        );

        let one_deploy = Summary {
            failed_deploys: vec!["api".to_owned()],
            ..Default::default()
        };
        assert_eq!(
            one_deploy.logs_url(console, "shop"),
            "https://console.wedeploy.com/projects/shop/logs?services=api"
        );

        let many = Summary {
            failed_builds: vec!["web".to_owned()],
            failed_deploys: vec!["api".to_owned()],
            ..Default::default()
        };
        assert_eq!(
            many.logs_url(console, "shop"),
            "https://console.wedeploy.com/projects/shop/logs"
        );
        assert_eq!(
            many.describe(),
            "Deployment failed: build failed for web; deploy failed for api"
        );
    }

    #[test]
    fn prompt_asks_again() {
        let mut output = vec![];
        let answer = prompt_open_logs(&b"maybe\nY\n"[..], &mut output).unwrap();
        assert!(answer);
        let output = String::from_utf8(output).unwrap();
        assert_eq!(output.matches("Open browser").count(), 2);

        assert!(!prompt_open_logs(&b"no\n"[..], io::sink()).unwrap());
        assert!(prompt_open_logs(&b"\n"[..], io::sink()).unwrap());
        assert!(!prompt_open_logs(&b""[..], io::sink()).unwrap());
    }
}
