//! Fetches projects on a fixed interval and keeps a live listing of them on screen.

use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use crossterm::{
    cursor::{MoveToColumn, MoveUp},
    queue,
    style::Stylize,
    terminal::{Clear, ClearType},
};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use wedeploy_api_client::WeDeployApiClient;
use wedeploy_common::models::project::{get_projects_table, Project};

/// Where the listed projects come from
#[async_trait]
pub trait ProjectSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Project>>;
}

/// Projects of the API, optionally narrowed to one project or service
pub struct ApiProjects {
    pub client: WeDeployApiClient,
    pub project: Option<String>,
    pub service: Option<String>,
}

#[async_trait]
impl ProjectSource for ApiProjects {
    async fn fetch(&self) -> Result<Vec<Project>> {
        let mut projects = match self.project {
            Some(ref project) => vec![self.client.get_project(project).await?.into_inner()],
            None => self.client.get_projects().await?.into_inner(),
        };

        if let Some(ref service) = self.service {
            for project in projects.iter_mut() {
                project.services.retain(|s| &s.service_id == service);
            }
        }

        Ok(projects)
    }
}

/// The latest snapshot, shared between the fetch and render tasks
#[derive(Debug, Default)]
pub struct ListState {
    pub projects: Vec<Project>,
    pub last_error: Option<String>,
    pub retry: AtomicU32,
    pub fetched: bool,
}

impl ListState {
    fn update(&mut self, res: Result<Vec<Project>>) {
        match res {
            Ok(projects) => {
                self.projects = projects;
                self.last_error = None;
                self.retry.store(0, Ordering::Relaxed);
                self.fetched = true;
            }
            Err(e) => {
                debug!(error = %e, "failed to fetch projects");
                self.last_error = Some(format!("{e:#}"));
            }
        }
    }
}

/// The whole listing as shown on screen
pub fn render_frame(state: &ListState, infrastructure: &str, raw: bool) -> String {
    let mut frame = if state.fetched {
        get_projects_table(&state.projects, infrastructure, raw)
    } else if state.last_error.is_none() {
        "Loading projects...\n".to_owned()
    } else {
        String::new()
    };
    if !frame.is_empty() && !frame.ends_with('\n') {
        frame.push('\n');
    }

    if let Some(ref e) = state.last_error {
        let line = format!(
            "Failed to fetch projects: {e} (retry #{})",
            state.retry.load(Ordering::Relaxed)
        );
        if raw {
            frame.push_str(&line);
        } else {
            frame.push_str(&line.red().to_string());
        }
        frame.push('\n');
    }

    frame
}

/// Redraws a block of lines in place
pub struct LiveWriter {
    out: Box<dyn Write + Send>,
    lines: u16,
}

impl LiveWriter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out, lines: 0 }
    }

    pub fn draw(&mut self, frame: &str) -> std::io::Result<()> {
        if self.lines > 0 {
            queue!(
                self.out,
                MoveUp(self.lines),
                MoveToColumn(0),
                Clear(ClearType::FromCursorDown)
            )?;
        }
        self.out.write_all(frame.as_bytes())?;
        self.out.flush()?;
        self.lines = u16::try_from(frame.lines().count()).unwrap_or(u16::MAX);
        Ok(())
    }
}

pub struct ListWatcher {
    source: Arc<dyn ProjectSource>,
    state: Arc<RwLock<ListState>>,
    polling_interval: Duration,
    infrastructure: String,
    raw: bool,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    writer: Arc<Mutex<LiveWriter>>,
}

impl ListWatcher {
    pub fn new(
        source: Arc<dyn ProjectSource>,
        polling_interval: Duration,
        infrastructure: String,
        raw: bool,
        out: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            source,
            state: Default::default(),
            polling_interval,
            infrastructure,
            raw,
            cancel: CancellationToken::new(),
            tasks: JoinSet::new(),
            writer: Arc::new(Mutex::new(LiveWriter::new(out))),
        }
    }

    pub fn state(&self) -> Arc<RwLock<ListState>> {
        self.state.clone()
    }

    /// Fetch and render a single time
    pub async fn once(&self) -> Result<()> {
        let projects = self.source.fetch().await?;

        let mut state = self.state.write().await;
        state.update(Ok(projects));
        let frame = render_frame(&state, &self.infrastructure, self.raw);
        drop(state);

        lock(&self.writer).draw(&frame)?;
        Ok(())
    }

    /// Start the fetch and render tasks
    pub fn start(&mut self) {
        let (ready_tx, ready_rx) = mpsc::channel(1);

        self.tasks.spawn(fetch_loop(
            self.source.clone(),
            self.state.clone(),
            self.polling_interval,
            ready_tx,
            self.cancel.clone(),
        ));
        self.tasks.spawn(render_loop(
            self.state.clone(),
            self.polling_interval,
            ready_rx,
            self.writer.clone(),
            self.infrastructure.clone(),
            self.raw,
            self.cancel.clone(),
        ));
    }

    /// Stop both tasks and wait for them to end
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        while let Some(res) = self.tasks.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "list task failed");
            }
        }
    }
}

async fn fetch_loop(
    source: Arc<dyn ProjectSource>,
    state: Arc<RwLock<ListState>>,
    polling_interval: Duration,
    ready: mpsc::Sender<()>,
    cancel: CancellationToken,
) {
    let mut ticker = interval(polling_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let res = tokio::select! {
            _ = cancel.cancelled() => {
                trace!("fetch interrupted");
                break;
            }
            res = source.fetch() => res,
        };

        state.write().await.update(res);
        // the renderer only needs to know there is something new
        let _ = ready.try_send(());
    }

    debug!("fetch loop stopped");
}

async fn render_loop(
    state: Arc<RwLock<ListState>>,
    polling_interval: Duration,
    mut ready: mpsc::Receiver<()>,
    writer: Arc<Mutex<LiveWriter>>,
    infrastructure: String,
    raw: bool,
    cancel: CancellationToken,
) {
    let mut ticker = interval(polling_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        while ready.try_recv().is_ok() {}

        let state = state.read().await;
        if state.last_error.is_some() {
            state.retry.fetch_add(1, Ordering::Relaxed);
        }
        let frame = render_frame(&state, &infrastructure, raw);
        drop(state);

        if let Err(e) = lock(&writer).draw(&frame) {
            warn!(error = %e, "failed to draw the project list");
            break;
        }
    }

    debug!("render loop stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
