use std::time::Duration;

use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use wedeploy_api_client::util::api_error;

use crate::args::OutputMode;

/// Create a standard spinner used across commands, or None in JSON mode.
pub fn make_spinner(output_mode: OutputMode, message: &str) -> Option<ProgressBar> {
    if output_mode == OutputMode::Json {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    Some(pb)
}

pub fn finish_spinner(spinner: Option<ProgressBar>) {
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Swap an API fault for its user facing message
pub fn friendly_error(err: anyhow::Error, command: &str) -> anyhow::Error {
    match api_error(&err) {
        Some(api) => anyhow!(api.friendly_message(Some(command))),
        None => err,
    }
}
