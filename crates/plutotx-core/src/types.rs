//! Core types for the TX waveform engine
//!
//! Defines the fundamental types shared across the synthesis and streaming
//! layers: complex I/Q sample aliases, the TX channel identifier, and the
//! error taxonomy for the waveform path.
//!
//! ## I/Q samples
//!
//! Transmit waveforms are sequences of complex baseband samples where the
//! real part (I) drives the in-phase DAC and the imaginary part (Q) the
//! quadrature DAC. Both DACs of a channel consume the same stream, so a
//! waveform is always a single `Vec<Complex64>` regardless of how many
//! physical converters sit behind it.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Type alias for complex numbers using f64 precision
pub type Complex = Complex64;

/// A single I/Q sample point
pub type IQSample = Complex64;

/// A buffer of I/Q samples
pub type IQBuffer = Vec<IQSample>;

/// Result type for waveform operations
pub type WaveformResult<T> = Result<T, WaveformError>;

/// Errors that can occur while synthesizing, validating, or importing waveforms
#[derive(Debug, Clone, thiserror::Error)]
pub enum WaveformError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("frequency {frequency_hz} Hz is at or above Nyquist ({nyquist_hz} Hz)")]
    NyquistViolation { frequency_hz: f64, nyquist_hz: f64 },

    #[error("seed is required for waveform kind '{0}'")]
    SeedRequired(&'static str),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("unsupported IQ format: {0}")]
    UnsupportedFormat(String),

    #[error("empty sample buffer")]
    EmptyBuffer,

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for WaveformError {
    fn from(err: std::io::Error) -> Self {
        WaveformError::Io(err.to_string())
    }
}

/// Transmit channel identifier.
///
/// The Pluto+ exposes exactly two TX channels. Keeping this a closed enum
/// (rather than an integer index) makes channel mix-ups a compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxChannel {
    /// First TX channel
    Tx1,
    /// Second TX channel
    Tx2,
}

impl TxChannel {
    /// Both channels, in index order.
    pub const ALL: [TxChannel; 2] = [TxChannel::Tx1, TxChannel::Tx2];

    /// Zero-based index of the channel.
    pub fn index(&self) -> usize {
        match self {
            TxChannel::Tx1 => 0,
            TxChannel::Tx2 => 1,
        }
    }
}

impl std::fmt::Display for TxChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxChannel::Tx1 => write!(f, "tx1"),
            TxChannel::Tx2 => write!(f, "tx2"),
        }
    }
}

/// Convert a linear magnitude ratio to decibels, floored at -240 dB.
pub fn linear_to_db(value: f64) -> f64 {
    20.0 * value.max(1e-12).log10()
}

/// Convert decibels to a linear magnitude ratio.
pub fn db_to_linear(value_db: f64) -> f64 {
    10.0_f64.powf(value_db / 20.0)
}

/// Peak magnitude of a sample buffer.
pub fn peak_magnitude(samples: &[IQSample]) -> f64 {
    samples.iter().map(|s| s.norm()).fold(0.0_f64, f64::max)
}

/// Root-mean-square magnitude of a sample buffer.
pub fn rms_magnitude(samples: &[IQSample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_power = samples.iter().map(|s| s.norm_sqr()).sum::<f64>() / samples.len() as f64;
    mean_power.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_db_round_trip() {
        assert_relative_eq!(linear_to_db(db_to_linear(-6.0)), -6.0, epsilon = 1e-10);
        assert_relative_eq!(linear_to_db(1.0), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_db_floor() {
        // Zero magnitude must not produce -inf.
        assert!(linear_to_db(0.0) >= -241.0);
    }

    #[test]
    fn test_peak_and_rms() {
        let samples = vec![
            Complex::new(1.0, 0.0),
            Complex::new(0.0, -1.0),
            Complex::new(0.5, 0.0),
        ];
        assert_relative_eq!(peak_magnitude(&samples), 1.0, epsilon = 1e-12);
        let expected_rms = ((1.0 + 1.0 + 0.25) / 3.0_f64).sqrt();
        assert_relative_eq!(rms_magnitude(&samples), expected_rms, epsilon = 1e-12);
    }

    #[test]
    fn test_channel_display() {
        assert_eq!(TxChannel::Tx1.to_string(), "tx1");
        assert_eq!(TxChannel::Tx2.index(), 1);
    }
}
