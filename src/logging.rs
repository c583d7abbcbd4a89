//! Tracing subscriber setup

use crate::config::LoggingSettings;
use anyhow::Result;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "rust-fares.log";

/// Initialize logging to stdout and, when configured, a daily-rolling file.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))?;

    let stdout_layer = if settings.json {
        tracing_subscriber::fmt::layer().with_target(true).json().boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    let file_layer = match &settings.directory {
        Some(directory) => {
            let log_dir = PathBuf::from(directory);
            std::fs::create_dir_all(&log_dir)?;
            let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_appender)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;

    match &settings.directory {
        Some(directory) => info!(directory = %directory, "Logging initialized with file output"),
        None => debug!("Logging initialized"),
    }
    Ok(())
}
