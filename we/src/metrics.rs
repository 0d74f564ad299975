//! Usage events, kept in a local NDJSON file until they are submitted in bulk

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;
use wedeploy_api_client::WeDeployApiClient;
use wedeploy_common::models::event::Event;

pub const METRICS_FILE: &str = "metrics.ndjson";
const BATCH_SUFFIX: &str = ".sending";

pub struct MetricsCollector {
    path: PathBuf,
    enabled: bool,
}

impl MetricsCollector {
    pub fn new(path: PathBuf, enabled: bool) -> Self {
        Self { path, enabled }
    }

    pub fn event(name: &str, remote: Option<String>) -> Event {
        Event {
            id: Uuid::new_v4().to_string(),
            event: name.to_owned(),
            time: Utc::now(),
            version: crate::VERSION.to_owned(),
            os: std::env::consts::OS.to_owned(),
            arch: std::env::consts::ARCH.to_owned(),
            remote,
            extra: BTreeMap::new(),
        }
    }

    /// Append an event, if collection is enabled
    pub fn record(&self, event: &Event) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        writeln!(file, "{}", serde_json::to_string(event)?)?;

        debug!(event = event.event, "recorded usage event");
        Ok(())
    }

    /// Events waiting to be submitted, including batches whose submission failed.
    /// Lines that don't parse are skipped.
    pub fn pending(&self) -> Result<Vec<Event>> {
        let mut events = read_events(&self.path)?;
        for batch in self.batches()? {
            events.extend(read_events(&batch)?);
        }
        Ok(events)
    }

    /// Submit pending events and forget them. Returns how many were sent.
    ///
    /// The log is renamed into a batch file first, so events recorded while the
    /// request is in flight go to a fresh log. Batches are removed only once sent.
    pub async fn submit(&self, client: &WeDeployApiClient) -> Result<usize> {
        self.set_aside()?;

        let batches = self.batches()?;
        let mut events = vec![];
        for batch in batches.iter() {
            events.extend(read_events(batch)?);
        }

        if !events.is_empty() {
            client.submit_events(bulk_body(&events)?).await?;
        }

        for batch in batches {
            fs::remove_file(&batch)
                .with_context(|| format!("failed to remove {}", batch.display()))?;
        }
        debug!(count = events.len(), "submitted usage events");

        Ok(events.len())
    }

    fn batch_prefix(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| METRICS_FILE.to_owned());
        format!("{name}.")
    }

    fn set_aside(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let batch = self.path.with_file_name(format!(
            "{}{}{BATCH_SUFFIX}",
            self.batch_prefix(),
            Uuid::new_v4()
        ));
        fs::rename(&self.path, &batch)
            .with_context(|| format!("failed to move {}", self.path.display()))
    }

    fn batches(&self) -> Result<Vec<PathBuf>> {
        let Some(dir) = self.path.parent().filter(|d| d.is_dir()) else {
            return Ok(vec![]);
        };
        let prefix = self.batch_prefix();

        let mut batches = vec![];
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_batch = path
                .file_name()
                .map(|n| n.to_string_lossy())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(BATCH_SUFFIX));
            if is_batch {
                batches.push(path);
            }
        }
        batches.sort();

        Ok(batches)
    }
}

fn read_events(path: &Path) -> Result<Vec<Event>> {
    if !path.exists() {
        return Ok(vec![]);
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "skipping unreadable usage event");
                None
            }
        })
        .collect())
}

/// Bulk insert body: a `create` action line before every document
pub fn bulk_body(events: &[Event]) -> Result<String> {
    let mut body = String::new();
    for event in events {
        body.push_str("{\"create\":{}}\n");
        body.push_str(&serde_json::to_string(event)?);
        body.push('\n');
    }
    Ok(body)
}
