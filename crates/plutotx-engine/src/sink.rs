//! # Hardware Sink Abstraction
//!
//! Trait boundary between the streaming engine and whatever consumes I/Q
//! samples: real SDR hardware, a loopback recorder, or the mock sink used
//! in tests.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            Channel Pipeline                  │
//! ├──────────────────────────────────────────────┤
//! │         HardwareSink (Rust trait)            │
//! ├──────────────┬───────────────┬───────────────┤
//! │  PlutoSDR    │  File writer  │  MockSink     │
//! └──────────────┴───────────────┴───────────────┘
//! ```
//!
//! A sink write takes a bounded deadline so a stalled DMA buffer surfaces
//! as an error instead of hanging the worker thread.

use std::time::Duration;

use plutotx_core::types::{IQSample, TxChannel};

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Errors surfaced by a hardware sink.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    #[error("sink is not connected")]
    NotConnected,

    #[error("RF parameter out of range: {0}")]
    InvalidRfParams(String),

    #[error("write deadline of {0:?} exceeded")]
    WriteTimeout(Duration),

    #[error("channel {0} is not available on this sink")]
    ChannelUnavailable(TxChannel),

    #[error("device fault: {0}")]
    DeviceFault(String),
}

/// RF tuning parameters for one TX channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RfParams {
    /// Carrier frequency in Hz.
    pub center_frequency_hz: f64,
    /// DAC sample rate in samples per second.
    pub sample_rate_sps: f64,
    /// Analog filter bandwidth in Hz.
    pub rf_bandwidth_hz: f64,
    /// TX gain in dB.
    pub gain_db: f64,
}

impl RfParams {
    /// Build params from a config section.
    pub fn from_section(section: &plutotx_core::ChannelSection) -> Self {
        Self {
            center_frequency_hz: section.center_frequency_hz,
            sample_rate_sps: section.sample_rate_sps,
            rf_bandwidth_hz: section.rf_bandwidth_hz,
            gain_db: section.gain_db,
        }
    }
}

/// What a sink can do, queried once at session setup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinkCapabilities {
    /// Lowest tunable carrier frequency in Hz.
    pub min_frequency_hz: f64,
    /// Highest tunable carrier frequency in Hz.
    pub max_frequency_hz: f64,
    /// Highest supported sample rate in samples per second.
    pub max_sample_rate_sps: f64,
    /// Whether both TX channels can stream at once.
    pub dual_tx: bool,
}

/// Periodic health report from the sink.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct SinkStatus {
    /// Die or board temperature in degrees Celsius, if readable.
    pub temperature_c: Option<f64>,
    /// External reference lock state, if the sink has a reference input.
    pub ext_ref_locked: Option<bool>,
    /// Hardware buffer fill level in [0, 1], if readable.
    pub buffer_level: Option<f64>,
}

/// A destination for transmit samples.
///
/// Implementations are driven from a single worker thread per channel, so
/// methods take `&mut self`. The trait is `Send` so a sink can be handed to
/// the worker.
pub trait HardwareSink: Send {
    /// Human-readable sink name for logs.
    fn name(&self) -> &str;

    /// Static capabilities of this sink.
    fn capabilities(&self) -> SinkCapabilities;

    /// Apply RF parameters to one channel. Must be called before the first
    /// write to that channel.
    fn configure(&mut self, channel: TxChannel, params: &RfParams) -> SinkResult<()>;

    /// Push one chunk of baseband samples to a channel, returning the
    /// number of samples accepted.
    ///
    /// Blocks until the chunk is accepted or the deadline passes.
    fn write_chunk(
        &mut self,
        channel: TxChannel,
        samples: &[IQSample],
        deadline: Duration,
    ) -> SinkResult<usize>;

    /// Poll sink health. Called at the telemetry cadence.
    fn report_status(&mut self) -> SinkResult<SinkStatus>;
}
