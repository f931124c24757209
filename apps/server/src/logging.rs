//! Logging setup
//!
//! Console output (plain or JSON) plus an optional rolling JSON log file. `RUST_LOG`
//! overrides `logging.level` when set.

use crate::config::LoggingConfig;
use anyhow::Context;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the background log writer alive. Buffered file output is flushed on drop.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level '{}'", config.level))?;

    let console_json = config.json.then(|| fmt::layer().json().with_target(true));
    let console_text = (!config.json).then(|| fmt::layer().with_target(true));

    let (file_layer, file_guard) = if config.file_enabled {
        std::fs::create_dir_all(&config.file_directory).with_context(|| {
            format!("Failed to create log directory {}", config.file_directory)
        })?;
        let appender = rolling::RollingFileAppender::new(
            parse_rotation(&config.file_rotation)?,
            &config.file_directory,
            &config.file_prefix,
        );
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_json)
        .with(console_text)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn parse_rotation(value: &str) -> anyhow::Result<rolling::Rotation> {
    match value.trim().to_ascii_lowercase().as_str() {
        "daily" => Ok(rolling::Rotation::DAILY),
        "hourly" => Ok(rolling::Rotation::HOURLY),
        "minutely" => Ok(rolling::Rotation::MINUTELY),
        "never" => Ok(rolling::Rotation::NEVER),
        other => anyhow::bail!(
            "Unknown log rotation '{}'. Expected daily, hourly, minutely or never",
            other
        ),
    }
}
