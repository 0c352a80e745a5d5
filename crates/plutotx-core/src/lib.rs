//! # PlutoTX Core DSP Library
//!
//! This crate provides the waveform synthesis, validation, and I/Q file
//! handling layer for a dual-channel SDR transmit engine.
//!
//! ## Overview
//!
//! A transmit session turns a waveform description into a validated complex
//! baseband buffer, then hands it to the streaming engine:
//!
//! - **Waveform Synthesis**: Tones, square, triangle, PRBS, multitone,
//!   chirps, OFDM, and resampled arbitrary captures
//! - **Validation**: Crest factor, Nyquist margin, and amplitude
//!   normalization before anything reaches a DAC
//! - **I/Q File I/O**: Interleaved `cf32`/`cf64`/`ci8` binary and CSV
//! - **Configuration**: YAML config with per-channel RF defaults
//!
//! ## Signal Flow
//!
//! ```text
//! Descriptor → Synthesize → Validate/Normalize → SampleBuffer → Engine
//! ```
//!
//! ## Example
//!
//! ```rust
//! use plutotx_core::{TxChannel, Validator, WaveformDescriptor, synthesize};
//!
//! // A 2 MHz complex tone at 30.72 MS/s for 50 ms on the first channel.
//! let desc = WaveformDescriptor::tone("cal-tone", TxChannel::Tx1, 2.0e6, 30.72e6, 0.05, 0.8);
//! let mut buffer = synthesize(desc).unwrap();
//!
//! let report = Validator::default().validate(&mut buffer);
//! assert!(report.nyquist_margin_hz > 0.0);
//! ```

pub mod config;
pub mod iqio;
pub mod lfsr;
pub mod observe;
pub mod ofdm;
pub mod resampler;
pub mod types;
pub mod validator;
pub mod wavegen;

pub use config::{ChannelSection, ConfigError, EngineSection, PlutoTxConfig, UnderrunFallback};
pub use iqio::{load_iq, load_iq_auto, save_iq, save_iq_auto, IqFormat};
pub use lfsr::PrbsGenerator;
pub use observe::{init_logging, LogConfig, LogFormat, LogLevel};
pub use ofdm::{OfdmModulator, OfdmParams};
pub use resampler::resample;
pub use types::{
    db_to_linear, linear_to_db, peak_magnitude, rms_magnitude, Complex, IQBuffer, IQSample,
    TxChannel, WaveformError, WaveformResult,
};
pub use validator::{ValidationReport, Validator, Verdict};
pub use wavegen::{
    synthesize, SampleBuffer, WaveformDescriptor, WaveformKind, SAFE_AMPLITUDE,
};
