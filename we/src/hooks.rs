use std::path::Path;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum HookError {
    #[error("failed to run {name} hook: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
    #[error("exit status {0}")]
    Exit(i32),
    #[error("terminated by signal {0}")]
    Signal(i32),
}

impl HookError {
    fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return HookError::Exit(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return HookError::Signal(signal);
            }
        }

        HookError::Exit(-1)
    }
}

/// Run a hook command through the shell, inside the service directory.
/// Its output goes to stderr.
#[instrument(skip(command, dir), fields(dir = %dir.display()))]
pub async fn run_hook(name: &'static str, command: &str, dir: &Path) -> Result<(), HookError> {
    debug!(command, "running hook");

    let mut cmd = shell(command);
    let status = cmd
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(std::io::stderr()))
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|source| HookError::Spawn { name, source })?;

    if status.success() {
        Ok(())
    } else {
        Err(HookError::from_status(status))
    }
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
