//! Logging configuration module
//! Console output plus an optional rolling JSON log file

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,             // trace, debug, info, warn, error
    pub log_dir: PathBuf,
    pub file_logging_enabled: bool,
    pub rotation: LogRotation,
    pub json_format: bool,         // console output as JSON
}

/// Log rotation policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    Daily,
    Never,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("/var/log/tandem"),
            file_logging_enabled: false,
            rotation: LogRotation::Daily,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber.
    ///
    /// The returned guard flushes the file writer and must be held for the
    /// life of the process.
    pub fn init(&self) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        let console_layer = if self.json_format {
            fmt::layer().json().with_writer(io::stderr).boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_writer(io::stderr)
                .boxed()
        };

        let (file_layer, guard) = if self.file_logging_enabled {
            let file_appender = match self.rotation {
                LogRotation::Hourly => rolling::hourly(&self.log_dir, "tandem.log"),
                LogRotation::Daily => rolling::daily(&self.log_dir, "tandem.log"),
                LogRotation::Never => rolling::never(&self.log_dir, "tandem.log"),
            };
            let (writer, guard) = non_blocking(file_appender);
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_writer(writer);
            (Some(layer), Some(guard))
        } else {
            (None, None)
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()?;

        tracing::info!(level = %self.level, "Logging initialized");
        Ok(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.file_logging_enabled);
        assert_eq!(config.rotation, LogRotation::Daily);
    }

    #[test]
    fn test_rotation_from_toml() {
        let config: LoggingConfig =
            toml::from_str("rotation = \"hourly\"\nlevel = \"debug\"").unwrap();
        assert_eq!(config.rotation, LogRotation::Hourly);
        assert_eq!(config.level, "debug");
        assert_eq!(config.log_dir, PathBuf::from("/var/log/tandem"));
    }
}
