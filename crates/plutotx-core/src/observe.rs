//! Structured Logging
//!
//! Initialization for the `tracing` ecosystem: level and format selection,
//! optional module filter, and a one-shot global subscriber install. The
//! engine emits structured events (channel, sample counts, verdicts); this
//! module only decides where and how they are rendered.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, multi-line.
    Pretty,
    /// One line per event.
    Compact,
    /// Machine-readable JSON.
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Compact
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level used when no filter or `RUST_LOG` is set.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Module filter, e.g. `plutotx_engine=debug,plutotx_core=info`.
    pub filter: Option<String>,
}

/// Install the global logging subscriber.
///
/// Call once at startup; later calls are silently ignored so tests that
/// each initialize logging do not panic.
pub fn init_logging(config: &LogConfig) {
    let filter = match &config.filter {
        Some(custom) => EnvFilter::try_new(custom)
            .unwrap_or_else(|_| EnvFilter::new(config.level.to_string())),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.to_string())),
    };

    let builder = fmt().with_env_filter(filter);
    let result = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    // A subscriber may already be installed (tests, embedding applications).
    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_display() {
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_init_is_idempotent() {
        init_logging(&LogConfig::default());
        init_logging(&LogConfig {
            level: LogLevel::Trace,
            format: LogFormat::Json,
            filter: Some("plutotx_core=debug".into()),
        });
    }

    #[test]
    fn test_config_yaml_round_trip() {
        let config = LogConfig {
            level: LogLevel::Warn,
            format: LogFormat::Pretty,
            filter: None,
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: LogConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.level, LogLevel::Warn);
        assert_eq!(parsed.format, LogFormat::Pretty);
    }
}
