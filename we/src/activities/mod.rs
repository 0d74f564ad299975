mod watch;

pub use watch::{prompt_open_logs, DeployWatcher, Summary, DEFAULT_POLL_INTERVAL};
