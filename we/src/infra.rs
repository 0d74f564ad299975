//! Lifecycle of the local WeDeploy infrastructure container, driven through the `docker` CLI

use std::io::ErrorKind;
use std::net::TcpListener;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use wedeploy_api_client::WeDeployApiClient;
use wedeploy_common::constants::{CONTAINER_LABEL, LOCAL_INFRA_IMAGE, LOCAL_INFRA_IMAGE_TAG};

use crate::ui::Ui;

/// Ports the infrastructure always binds
pub const INFRA_PORTS: [u16; 3] = [80, 8080, 24224];
/// Extra ports bound with `--debug-ports`
pub const DEBUG_PORTS: [u16; 4] = [5001, 5005, 8001, 8500];

pub const READY_ATTEMPTS: u32 = 100;
pub const READY_INTERVAL: Duration = Duration::from_secs(1);
pub const FORCE_EXIT_GRACE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Default)]
pub struct InfraFlags {
    pub debug: bool,
    pub detach: bool,
    pub dry_run: bool,
    pub view_mode: bool,
    pub pull: bool,
}

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("docker was not found. Install docker and make sure it is in your PATH")]
    DockerNotFound,
    #[error("failed to run docker: {0}")]
    Spawn(std::io::Error),
    #[error("`docker {command}` failed: {stderr}\nTry restarting docker")]
    Docker { command: String, stderr: String },
    #[error(
        "Can't start WeDeploy: the following ports are unavailable: {}",
        .0.iter().map(u16::to_string).collect::<Vec<_>>().join(", ")
    )]
    PortsUnavailable(Vec<u16>),
    #[error("WeDeploy is not running, there is nothing to attach to")]
    NotRunning,
}

/// Thin wrapper around the `docker` binary
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: PathBuf,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            program: PathBuf::from("docker"),
        }
    }
}

impl DockerCli {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run a docker command and return its trimmed stdout
    pub async fn output<S: AsRef<str>>(&self, args: &[S]) -> Result<String, InfraError> {
        let args = args.iter().map(|a| a.as_ref()).collect::<Vec<&str>>();
        debug!(?args, "docker");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => InfraError::DockerNotFound,
                _ => InfraError::Spawn(e),
            })?;

        if !output.status.success() {
            return Err(InfraError::Docker {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }

    pub async fn running_container(&self, image: &str) -> Result<Option<String>, InfraError> {
        let filter = format!("ancestor={image}");
        let out = self
            .output(&["ps", "--filter", filter.as_str(), "--format", "{{.ID}}"])
            .await?;

        Ok(out.split_whitespace().next().map(str::to_owned))
    }

    /// Every container, running or not, carrying the WeDeploy label
    pub async fn labeled_containers(&self) -> Result<Vec<String>, InfraError> {
        let filter = format!("label={CONTAINER_LABEL}");
        let out = self
            .output(&["ps", "-a", "--filter", filter.as_str(), "--format", "{{.ID}}"])
            .await?;

        Ok(out.split_whitespace().map(str::to_owned).collect())
    }

    pub async fn image_exists(&self, image: &str) -> Result<bool, InfraError> {
        Ok(!self.output(&["images", "-q", image]).await?.is_empty())
    }

    /// Ids of images of `repository` with another tag than `current_tag`
    pub async fn superseded_images(
        &self,
        repository: &str,
        current_tag: &str,
    ) -> Result<Vec<String>, InfraError> {
        let out = self
            .output(&["images", repository, "--format", "{{.ID}}\t{{.Tag}}"])
            .await?;

        Ok(out
            .lines()
            .filter_map(|line| line.split_once('\t'))
            .filter(|(_, tag)| *tag != current_tag)
            .map(|(id, _)| id.to_owned())
            .collect())
    }

    pub async fn pull(&self, image: &str) -> Result<(), InfraError> {
        self.output(&["pull", image]).await.map(|_| ())
    }

    pub async fn stop(&self, containers: &[String]) -> Result<(), InfraError> {
        if containers.is_empty() {
            return Ok(());
        }
        let mut args = vec!["stop".to_owned()];
        args.extend_from_slice(containers);
        self.output(&args).await.map(|_| ())
    }

    pub async fn remove(&self, containers: &[String]) -> Result<(), InfraError> {
        if containers.is_empty() {
            return Ok(());
        }
        let mut args = vec!["rm".to_owned(), "-f".to_owned()];
        args.extend_from_slice(containers);
        self.output(&args).await.map(|_| ())
    }

    pub async fn remove_images(&self, images: &[String]) -> Result<(), InfraError> {
        if images.is_empty() {
            return Ok(());
        }
        let mut args = vec!["rmi".to_owned()];
        args.extend_from_slice(images);
        self.output(&args).await.map(|_| ())
    }

    /// Blocks until the container exits and returns its exit code
    pub async fn wait(&self, container: &str) -> Result<i64, InfraError> {
        let out = self.output(&["wait", container]).await?;
        Ok(out.parse().unwrap_or(-1))
    }
}

/// Ports of `ports` that something else already listens on
pub fn unavailable_ports(ports: &[u16]) -> Vec<u16> {
    ports
        .iter()
        .copied()
        .filter(|port| match TcpListener::bind(("0.0.0.0", *port)) {
            Ok(_) => false,
            Err(e) if e.kind() == ErrorKind::AddrInUse => true,
            Err(e) => {
                // eg. privileged ports for non-root users, docker may still bind those
                debug!(port, error = %e, "could not check port");
                false
            }
        })
        .collect()
}

/// What a shutdown signal should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalAction {
    Shutdown,
    Warn(&'static str),
    ForceExit,
}

/// Escalation of repeated shutdown signals
#[derive(Debug)]
pub struct SignalEscalation {
    first: Option<Instant>,
    count: u32,
    grace: Duration,
}

impl Default for SignalEscalation {
    fn default() -> Self {
        Self {
            first: None,
            count: 0,
            grace: FORCE_EXIT_GRACE,
        }
    }
}

impl SignalEscalation {
    pub fn on_signal(&mut self, now: Instant) -> SignalAction {
        self.count += 1;

        let Some(first) = self.first else {
            self.first = Some(now);
            return SignalAction::Shutdown;
        };

        if now.duration_since(first) >= self.grace {
            return SignalAction::ForceExit;
        }

        match self.count {
            2 => SignalAction::Warn("WeDeploy is shutting down, please wait."),
            _ => SignalAction::Warn(
                "Still cleaning up. Interrupt again after one minute to force quit (containers may be left behind).",
            ),
        }
    }
}

/// SIGINT and SIGTERM on unix, ctrl-c elsewhere
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    #[cfg(unix)]
    pub fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => debug!("got SIGINT"),
            _ = self.terminate.recv() => debug!("got SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}

/// How a watched infrastructure run ended
#[derive(Debug, PartialEq)]
pub enum RunEnd {
    /// Nothing to wait for (detached or dry run)
    Started,
    /// The container went away by itself
    Exited(i64),
    /// Stopped on a signal
    Stopped,
    /// A signal in view mode: left running
    Detached,
    /// Signals kept coming long after the shutdown began
    ForceExit,
}

pub struct DockerMachine {
    pub container: Option<String>,
    pub image: String,
    flags: InfraFlags,
    up_time: Option<Instant>,
    /// When a shutdown signal came in before `watch`
    interrupted_at: Option<Instant>,
    docker: DockerCli,
    client: WeDeployApiClient,
    ports: Vec<u16>,
    ready_attempts: u32,
    ready_interval: Duration,
    ui: Ui,
}

impl DockerMachine {
    /// `client` talks to the API served by the infrastructure
    pub fn new(flags: InfraFlags, client: WeDeployApiClient, ui: Ui) -> Self {
        let mut ports = INFRA_PORTS.to_vec();
        if flags.debug {
            ports.extend(DEBUG_PORTS);
        }

        Self {
            container: None,
            image: format!("{LOCAL_INFRA_IMAGE}:{LOCAL_INFRA_IMAGE_TAG}"),
            flags,
            up_time: None,
            interrupted_at: None,
            docker: DockerCli::default(),
            client,
            ports,
            ready_attempts: READY_ATTEMPTS,
            ready_interval: READY_INTERVAL,
            ui,
        }
    }

    pub fn with_docker(mut self, docker: DockerCli) -> Self {
        self.docker = docker;
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_ports(mut self, ports: Vec<u16>) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_readiness(mut self, attempts: u32, interval: Duration) -> Self {
        self.ready_attempts = attempts;
        self.ready_interval = interval;
        self
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    /// Whether a shutdown signal arrived while starting
    pub fn interrupted(&self) -> bool {
        self.interrupted_at.is_some()
    }

    /// Start the infrastructure, or find it already running, and wait until it answers.
    ///
    /// A shutdown signal during the readiness wait ends it early. `watch` then
    /// goes straight to the shutdown.
    #[instrument(skip_all, fields(image = self.image))]
    pub async fn run(&mut self, signals: &mut ShutdownSignals) -> anyhow::Result<()> {
        if let Some(id) = self.docker.running_container(&self.image).await? {
            if !self.flags.dry_run {
                info!(container = id, "infrastructure already running");
                self.ui.info("WeDeploy is already running");
                self.container = Some(id);
                self.up_time = Some(Instant::now());
                self.wait_ready_or_signal(signals).await;
                return Ok(());
            }
        } else if self.flags.view_mode {
            return Err(InfraError::NotRunning.into());
        }

        if !self.flags.dry_run {
            self.clean_up().await;
        }

        let busy = unavailable_ports(&self.ports);
        if !busy.is_empty() {
            return Err(InfraError::PortsUnavailable(busy).into());
        }

        let args = self.run_args();
        if self.flags.dry_run {
            println!("docker {}", args.join(" "));
            return Ok(());
        }

        if self.flags.pull || !self.docker.image_exists(&self.image).await? {
            self.ui.step("", format!("Pulling {}...", self.image));
            self.docker.pull(&self.image).await?;
        }

        self.ui.step("", "Starting WeDeploy...");
        let id = self.docker.output(&args).await?;
        debug!(container = id, "started infrastructure");
        self.container = Some(id);
        self.up_time = Some(Instant::now());

        if !self.flags.detach {
            self.wait_ready_or_signal(signals).await;
        }

        Ok(())
    }

    /// Arguments of the `docker run` starting the infrastructure
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_owned(),
            "-d".to_owned(),
            "--label".to_owned(),
            format!("{CONTAINER_LABEL}=infra"),
        ];

        match local_ip_address::local_ip() {
            Ok(ip) => {
                args.push("-e".to_owned());
                args.push(format!("WEDEPLOY_HOST_IP={ip}"));
            }
            Err(e) => warn!(error = %e, "could not find the host address"),
        }

        for port in &self.ports {
            args.push("-p".to_owned());
            args.push(format!("{port}:{port}"));
        }

        args.push(self.image.clone());
        args
    }

    /// Poll the API until it answers. Not answering is not an error.
    pub async fn wait_ready(&self) -> bool {
        for attempt in 0..self.ready_attempts {
            match self.client.get_projects().await {
                Ok(_) => {
                    let elapsed = self.up_time.map(|t| t.elapsed()).unwrap_or_default();
                    self.ui
                        .success(format!("WeDeploy is ready! Started in {}s", elapsed.as_secs()));
                    return true;
                }
                Err(e) => debug!(attempt, error = %e, "infrastructure not ready yet"),
            }
            sleep(self.ready_interval).await;
        }

        warn!("could not verify that the infrastructure is up");
        self.ui
            .warn("Could not verify that WeDeploy is up. It may still be starting.");
        false
    }

    async fn wait_ready_or_signal(&mut self, signals: &mut ShutdownSignals) {
        let interrupted = tokio::select! {
            _ = self.wait_ready() => false,
            _ = signals.recv() => true,
        };
        if interrupted {
            info!("shutdown signal while waiting for the infrastructure");
            self.interrupted_at = Some(Instant::now());
        }
    }

    /// Wait for the container to exit, or for a shutdown signal and then shut down
    pub async fn watch(&self, signals: &mut ShutdownSignals) -> anyhow::Result<RunEnd> {
        let Some(ref container) = self.container else {
            return Ok(RunEnd::Started);
        };

        let first_signal = match self.interrupted_at {
            Some(at) => at,
            None if self.flags.detach || self.flags.dry_run => return Ok(RunEnd::Started),
            None => {
                tokio::select! {
                    code = self.docker.wait(container) => return Ok(RunEnd::Exited(code?)),
                    _ = signals.recv() => {}
                }
                Instant::now()
            }
        };

        let mut escalation = SignalEscalation::default();
        escalation.on_signal(first_signal);

        if self.flags.view_mode {
            return Ok(RunEnd::Detached);
        }

        self.ui.step("", "Stopping WeDeploy...");
        let stop = self.stop();
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = &mut stop => return Ok(RunEnd::Stopped),
                _ = signals.recv() => match escalation.on_signal(Instant::now()) {
                    SignalAction::Warn(message) => self.ui.warn(message),
                    SignalAction::ForceExit => return Ok(RunEnd::ForceExit),
                    SignalAction::Shutdown => {}
                },
            }
        }
    }

    /// Best-effort shutdown: unlink local projects, then remove containers and old images
    pub async fn stop(&self) {
        match self.client.get_projects().await {
            Ok(projects) => {
                for project in projects.into_inner() {
                    if let Err(e) = self.client.delete_project(&project.project_id).await {
                        warn!(project = project.project_id, error = %e, "failed to unlink project");
                    }
                }
            }
            Err(e) => debug!(error = %e, "not unlinking projects"),
        }

        self.clean_up().await;
    }

    async fn clean_up(&self) {
        match self.docker.labeled_containers().await {
            Ok(containers) => {
                if let Err(e) = self.docker.stop(&containers).await {
                    warn!(error = %e, "failed to stop containers");
                }
                if let Err(e) = self.docker.remove(&containers).await {
                    warn!(error = %e, "failed to remove containers");
                }
            }
            Err(e) => warn!(error = %e, "failed to list containers"),
        }

        let (repository, tag) = self
            .image
            .rsplit_once(':')
            .unwrap_or((self.image.as_str(), LOCAL_INFRA_IMAGE_TAG));
        match self.docker.superseded_images(repository, tag).await {
            Ok(images) => {
                if let Err(e) = self.docker.remove_images(&images).await {
                    warn!(error = %e, "failed to remove old images");
                }
            }
            Err(e) => warn!(error = %e, "failed to list images"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_escalate() {
        let mut escalation = SignalEscalation::default();
        let start = Instant::now();

        assert_eq!(escalation.on_signal(start), SignalAction::Shutdown);
        assert!(matches!(
            escalation.on_signal(start + Duration::from_secs(1)),
            SignalAction::Warn(m) if m.contains("shutting down")
        ));
        assert!(matches!(
            escalation.on_signal(start + Duration::from_secs(2)),
            SignalAction::Warn(m) if m.contains("force quit")
        ));
        assert!(matches!(
            escalation.on_signal(start + Duration::from_secs(30)),
            SignalAction::Warn(_)
        ));
        assert_eq!(
            escalation.on_signal(start + Duration::from_secs(61)),
            SignalAction::ForceExit
        );
    }

    #[test]
    fn busy_ports_are_reported() {
        let listener = TcpListener::bind(("0.0.0.0", 0)).unwrap();
        let busy = listener.local_addr().unwrap().port();

        assert_eq!(unavailable_ports(&[busy]), vec![busy]);

        let err = InfraError::PortsUnavailable(vec![80, 8080]);
        assert_eq!(
            err.to_string(),
            "Can't start WeDeploy: the following ports are unavailable: 80, 8080"
        );
    }

    #[test]
    fn debug_ports() {
        let client = WeDeployApiClient::new(
            "http://localhost:8080".to_owned(),
            Default::default(),
            None,
            None,
        )
        .unwrap();
        let ui = Ui::new(crate::args::OutputMode::Json);

        let machine = DockerMachine::new(InfraFlags::default(), client.clone(), ui);
        assert_eq!(machine.ports(), [80, 8080, 24224]);

        let flags = InfraFlags {
            debug: true,
            ..Default::default()
        };
        let machine = DockerMachine::new(flags, client, ui);
        assert_eq!(machine.ports(), [80, 8080, 24224, 5001, 5005, 8001, 8500]);

        let args = machine.run_args();
        assert_eq!(args[..4], ["run", "-d", "--label", "com.wedeploy.container=infra"]);
        assert!(args.windows(2).any(|w| w == ["-p", "24224:24224"]));
        assert_eq!(args.last().unwrap(), "wedeploy/local:latest");
    }
}
