//! # Logging Bootstrap
//!
//! Installs the global `tracing` subscriber: an env filter, a plain-text file layer
//! and an optional console layer.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::domain::config::LoggingConfig;
use crate::strings::logs;

/// Installs the subscriber. Keep the returned guard alive for the whole process,
/// otherwise buffered file output is lost.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

    let mut reset_error = None;
    let (file_layer, guard) = match config.file.as_deref() {
        Some(file) => {
            let (dir, name) = split_log_path(file);
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            // Each session starts with a fresh log.
            reset_error = reset_log_file(&dir.join(name)).err();

            let file_appender = tracing_appender::rolling::never(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // stdout carries the replay report, so console logs go to stderr.
    let console_layer = config
        .console
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(e) = reset_error {
        warn!("{}", logs::log_reset_failed(&e));
    }
    Ok(guard)
}

fn reset_log_file(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

fn split_log_path(file: &str) -> (&Path, &str) {
    let path = Path::new(file);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("session.log");
    (dir, name)
}
