use std::{fs, path::Path};

use anyhow::{Context, Result};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Target carrying save/load/autosave/generate reports into the JSON event log.
pub const EVENT_TARGET: &str = "flow_event";

/// Installs the global subscriber:
///
/// - stdout, filtered by `log_level` (an `EnvFilter` directive such as `"info"`)
/// - a daily-rolling plain-text log at `root/log_file`
/// - a daily-rolling JSON log at `root/event_file` holding only
///   [`EVENT_TARGET`] events
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(root: &Path, log_file: &str, event_file: &str, log_level: &str) -> Result<()> {
    let log_path = root.join(log_file);
    let event_path = root.join(event_file);

    // 1) make sure both log directories exist
    let log_dir = log_path.parent().unwrap_or(root);
    let event_dir = event_path.parent().unwrap_or(root);
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    fs::create_dir_all(event_dir)
        .with_context(|| format!("Failed to create event directory {}", event_dir.display()))?;

    let log_name = log_path
        .file_name()
        .with_context(|| format!("Log file has no name: {}", log_path.display()))?;
    let event_name = event_path
        .file_name()
        .with_context(|| format!("Event file has no name: {}", event_path.display()))?;

    // 2) text file + stdout share the level filter
    let txt_layer = fmt::layer()
        .with_writer(RollingFileAppender::new(Rotation::DAILY, log_dir, log_name))
        .with_ansi(false)
        .with_filter(EnvFilter::new(log_level));
    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(log_level));

    // 3) newline-delimited JSON reports
    let json_layer = fmt::layer()
        .json()
        .with_writer(RollingFileAppender::new(Rotation::DAILY, event_dir, event_name))
        .with_target(true)
        .with_filter(EnvFilter::new(format!("{}=info", EVENT_TARGET)));

    // 4) install
    Registry::default()
        .with(txt_layer)
        .with(stdout_layer)
        .with(json_layer)
        .try_init()
        .context("A tracing subscriber is already installed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_log_directories_and_refuses_second_install() {
        let dir = tempdir().unwrap();
        init_tracing(dir.path(), "logs/topoflow.log", "logs/events.json", "debug").unwrap();
        assert!(dir.path().join("logs").is_dir());
        assert!(init_tracing(dir.path(), "logs/topoflow.log", "logs/events.json", "debug").is_err());
    }
}
