//! Configuration System
//!
//! YAML-based configuration for the dual-TX engine: per-channel RF
//! defaults, waveform safety limits, streaming tunables, and logging.
//! Loaded from the first file found on the search path, with per-section
//! defaults so a partial file is valid.
//!
//! ## Search path
//!
//! 1. `PLUTOTX_CONFIG` environment variable
//! 2. `./plutotx.yaml`
//! 3. `~/.config/plutotx/config.yaml` (per-user)
//! 4. `/etc/plutotx/config.yaml` (system)
//!
//! ## Example configuration
//!
//! ```yaml
//! tx1:
//!   center_frequency_hz: 2.4e9
//!   sample_rate_sps: 30.72e6
//!   rf_bandwidth_hz: 20e6
//!   gain_db: -10.0
//!
//! engine:
//!   queue_depth: 4
//!   arm_timeout_ms: 2000
//!   underrun_fallback: zero-fill
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::observe::LogConfig;

/// Error type for configuration operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    ReadError(String),

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid config: {0}")]
    ValidationError(String),
}

/// Per-channel RF defaults and constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSection {
    /// Enable the channel at startup.
    pub enabled: bool,
    /// RF center frequency in Hz.
    pub center_frequency_hz: f64,
    /// DAC sample rate in samples per second.
    pub sample_rate_sps: f64,
    /// Analog filter bandwidth in Hz.
    pub rf_bandwidth_hz: f64,
    /// TX gain in dB (negative values are attenuation).
    pub gain_db: f64,
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            enabled: false,
            center_frequency_hz: 2.4e9,
            sample_rate_sps: 30.72e6,
            rf_bandwidth_hz: 20.0e6,
            gain_db: -10.0,
        }
    }
}

/// Waveform synthesis and validation defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveformSection {
    /// Default amplitude as a fraction of full scale.
    pub amplitude: f64,
    /// Crest factor warning threshold in dB.
    pub crest_limit_db: f64,
    /// Apply amplitude normalization during validation.
    pub normalize: bool,
}

impl Default for WaveformSection {
    fn default() -> Self {
        Self {
            amplitude: 0.8,
            crest_limit_db: 6.0,
            normalize: true,
        }
    }
}

/// What the streaming worker feeds the sink when the staging queue is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnderrunFallback {
    /// Transmit silence.
    ZeroFill,
    /// Repeat the most recently streamed buffer.
    RepeatLast,
}

impl Default for UnderrunFallback {
    fn default() -> Self {
        UnderrunFallback::ZeroFill
    }
}

/// Streaming engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Staging queue capacity in buffers.
    pub queue_depth: usize,
    /// Samples per hardware write.
    pub chunk_samples: usize,
    /// Deadline for a single sink write, in milliseconds.
    pub write_deadline_ms: u64,
    /// Synchronized-arm timeout in milliseconds.
    pub arm_timeout_ms: u64,
    /// How long an exhausted staging queue idles before the worker stops,
    /// in milliseconds.
    pub grace_period_ms: u64,
    /// Telemetry snapshot period in milliseconds (2-10 Hz cadence).
    pub telemetry_period_ms: u64,
    /// Fallback fill behavior on underrun.
    pub underrun_fallback: UnderrunFallback,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            queue_depth: 4,
            chunk_samples: 8192,
            write_deadline_ms: 100,
            arm_timeout_ms: 2000,
            grace_period_ms: 500,
            telemetry_period_ms: 250,
            underrun_fallback: UnderrunFallback::ZeroFill,
        }
    }
}

/// Root configuration for the dual-TX engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlutoTxConfig {
    /// First TX channel defaults.
    pub tx1: ChannelSection,
    /// Second TX channel defaults.
    pub tx2: ChannelSection,
    /// Waveform defaults.
    pub waveform: WaveformSection,
    /// Streaming tunables.
    pub engine: EngineSection,
    /// Logging configuration.
    pub logging: LogConfig,
}

impl PlutoTxConfig {
    /// Load configuration from the default search path.
    ///
    /// Returns defaults if no file is found.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("PLUTOTX_CONFIG") {
            if Path::new(&path).exists() {
                return Self::load_from(Path::new(&path));
            }
        }
        for path in Self::search_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Configuration search paths after the environment variable.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./plutotx.yaml")];
        if let Some(dirs) = directories::ProjectDirs::from("", "", "plutotx") {
            paths.push(dirs.config_dir().join("config.yaml"));
        }
        paths.push(PathBuf::from("/etc/plutotx/config.yaml"));
        paths
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, channel) in [("tx1", &self.tx1), ("tx2", &self.tx2)] {
            if channel.sample_rate_sps <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{}: sample rate must be positive",
                    name
                )));
            }
            if channel.rf_bandwidth_hz > channel.sample_rate_sps {
                return Err(ConfigError::ValidationError(format!(
                    "{}: RF bandwidth {} Hz exceeds the sample rate {} sps",
                    name, channel.rf_bandwidth_hz, channel.sample_rate_sps
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.waveform.amplitude) {
            return Err(ConfigError::ValidationError(format!(
                "waveform amplitude {} must be within [0, 1]",
                self.waveform.amplitude
            )));
        }
        if self.engine.queue_depth == 0 {
            return Err(ConfigError::ValidationError(
                "engine queue depth must be at least 1".into(),
            ));
        }
        if self.engine.chunk_samples == 0 {
            return Err(ConfigError::ValidationError(
                "engine chunk size must be at least 1 sample".into(),
            ));
        }
        if !(100..=500).contains(&self.engine.telemetry_period_ms) {
            return Err(ConfigError::ValidationError(format!(
                "telemetry period {} ms outside the 100-500 ms (2-10 Hz) range",
                self.engine.telemetry_period_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PlutoTxConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.queue_depth, 4);
        assert_eq!(config.engine.underrun_fallback, UnderrunFallback::ZeroFill);
    }

    #[test]
    fn test_partial_yaml_uses_section_defaults() {
        let yaml = r#"
tx1:
  center_frequency_hz: 915.0e6
engine:
  queue_depth: 2
"#;
        let config = PlutoTxConfig::parse(yaml).unwrap();
        assert_eq!(config.tx1.center_frequency_hz, 915.0e6);
        // Untouched fields keep their defaults.
        assert_eq!(config.tx1.sample_rate_sps, 30.72e6);
        assert_eq!(config.engine.queue_depth, 2);
        assert_eq!(config.engine.arm_timeout_ms, 2000);
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = PlutoTxConfig::default();
        let yaml = config.to_yaml().unwrap();
        let parsed = PlutoTxConfig::parse(&yaml).unwrap();
        assert_eq!(parsed.tx2.gain_db, config.tx2.gain_db);
        assert_eq!(parsed.engine.telemetry_period_ms, 250);
    }

    #[test]
    fn test_fallback_kebab_case() {
        let fallback: UnderrunFallback = serde_yaml::from_str("repeat-last").unwrap();
        assert_eq!(fallback, UnderrunFallback::RepeatLast);
    }

    #[test]
    fn test_validation_rejects_bandwidth_over_rate() {
        let mut config = PlutoTxConfig::default();
        config.tx1.rf_bandwidth_hz = 40.0e6;
        config.tx1.sample_rate_sps = 30.72e6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_queue() {
        let mut config = PlutoTxConfig::default();
        config.engine.queue_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_out_of_band_cadence() {
        let mut config = PlutoTxConfig::default();
        config.engine.telemetry_period_ms = 50; // 20 Hz, too fast
        assert!(config.validate().is_err());
    }
}
