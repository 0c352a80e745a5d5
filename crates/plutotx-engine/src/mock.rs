//! # Mock Hardware Sink
//!
//! A software stand-in for the radio used by the test suite and by dry
//! runs. It records everything written to it, can pace writes at the
//! configured sample rate, can cap how many samples each write accepts
//! to mimic a shallow device buffer, and can inject a device fault
//! after a set number of writes to exercise the pipeline's fault path.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use plutotx_core::TxChannel;
//! use plutotx_engine::mock::MockSink;
//! use plutotx_engine::sink::{HardwareSink, RfParams};
//!
//! let mut sink = MockSink::new();
//! let params = RfParams {
//!     center_frequency_hz: 2.4e9,
//!     sample_rate_sps: 30.72e6,
//!     rf_bandwidth_hz: 20.0e6,
//!     gain_db: -10.0,
//! };
//! sink.configure(TxChannel::Tx1, &params).unwrap();
//! sink.write_chunk(TxChannel::Tx1, &[Default::default(); 16], Duration::from_millis(100))
//!     .unwrap();
//! assert_eq!(sink.recorded(TxChannel::Tx1).len(), 16);
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use plutotx_core::types::{IQSample, TxChannel};
use tracing::debug;

use crate::sink::{
    HardwareSink, RfParams, SinkCapabilities, SinkError, SinkResult, SinkStatus,
};

/// Capabilities reported by the mock, matching a PlutoSDR-class device.
const MOCK_CAPABILITIES: SinkCapabilities = SinkCapabilities {
    min_frequency_hz: 70.0e6,
    max_frequency_hz: 6.0e9,
    max_sample_rate_sps: 61.44e6,
    dual_tx: true,
};

/// In-memory sink that records writes and can inject faults.
pub struct MockSink {
    connected: bool,
    configured: [Option<RfParams>; 2],
    /// Shared so a recording tap stays readable after the sink is boxed.
    recorded: [Arc<Mutex<Vec<IQSample>>>; 2],
    writes: u64,
    /// Fail with a device fault once this many writes have succeeded.
    fault_after_writes: Option<u64>,
    /// Accept at most this many samples per write, leaving the tail.
    accept_at_most: Option<usize>,
    /// Sleep for the accepted samples' real-time duration on each write.
    pace_writes: bool,
    temperature_c: f64,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            connected: true,
            configured: [None, None],
            recorded: [Arc::default(), Arc::default()],
            writes: 0,
            fault_after_writes: None,
            accept_at_most: None,
            pace_writes: false,
            temperature_c: 38.5,
        }
    }

    /// Inject a device fault after `n` successful writes across all channels.
    pub fn fault_after_writes(mut self, n: u64) -> Self {
        self.fault_after_writes = Some(n);
        self
    }

    /// Pace each write at the configured sample rate.
    pub fn with_pacing(mut self) -> Self {
        self.pace_writes = true;
        self
    }

    /// Cap how many samples each write accepts, like a device whose
    /// DMA buffer is shallower than the caller's chunk size.
    pub fn accept_at_most(mut self, n: usize) -> Self {
        self.accept_at_most = Some(n);
        self
    }

    /// Simulate pulling the USB cable.
    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    /// Everything written to a channel so far.
    pub fn recorded(&self, channel: TxChannel) -> Vec<IQSample> {
        self.recorded[channel.index()].lock().unwrap().clone()
    }

    /// A tap on a channel's recording. Clone this before boxing the
    /// sink to inspect what the engine wrote to it.
    pub fn recording(&self, channel: TxChannel) -> Arc<Mutex<Vec<IQSample>>> {
        Arc::clone(&self.recorded[channel.index()])
    }

    /// Total successful writes across both channels.
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    /// The RF params last applied to a channel, if any.
    pub fn configured_params(&self, channel: TxChannel) -> Option<RfParams> {
        self.configured[channel.index()]
    }
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareSink for MockSink {
    fn name(&self) -> &str {
        "mock"
    }

    fn capabilities(&self) -> SinkCapabilities {
        MOCK_CAPABILITIES
    }

    fn configure(&mut self, channel: TxChannel, params: &RfParams) -> SinkResult<()> {
        if !self.connected {
            return Err(SinkError::NotConnected);
        }
        let caps = self.capabilities();
        if params.center_frequency_hz < caps.min_frequency_hz
            || params.center_frequency_hz > caps.max_frequency_hz
        {
            return Err(SinkError::InvalidRfParams(format!(
                "carrier {} Hz outside [{}, {}]",
                params.center_frequency_hz, caps.min_frequency_hz, caps.max_frequency_hz
            )));
        }
        if params.sample_rate_sps <= 0.0 || params.sample_rate_sps > caps.max_sample_rate_sps {
            return Err(SinkError::InvalidRfParams(format!(
                "sample rate {} sps outside (0, {}]",
                params.sample_rate_sps, caps.max_sample_rate_sps
            )));
        }
        debug!(channel = %channel, freq_hz = params.center_frequency_hz, "mock sink configured");
        self.configured[channel.index()] = Some(*params);
        Ok(())
    }

    fn write_chunk(
        &mut self,
        channel: TxChannel,
        samples: &[IQSample],
        _deadline: Duration,
    ) -> SinkResult<usize> {
        if !self.connected {
            return Err(SinkError::NotConnected);
        }
        let params = self.configured[channel.index()]
            .ok_or(SinkError::ChannelUnavailable(channel))?;
        if let Some(limit) = self.fault_after_writes {
            if self.writes >= limit {
                return Err(SinkError::DeviceFault("injected fault".into()));
            }
        }
        let accepted = match self.accept_at_most {
            Some(limit) => samples.len().min(limit),
            None => samples.len(),
        };
        if self.pace_writes && params.sample_rate_sps > 0.0 {
            let secs = accepted as f64 / params.sample_rate_sps;
            std::thread::sleep(Duration::from_secs_f64(secs));
        }
        self.recorded[channel.index()]
            .lock()
            .unwrap()
            .extend_from_slice(&samples[..accepted]);
        self.writes += 1;
        Ok(accepted)
    }

    fn report_status(&mut self) -> SinkResult<SinkStatus> {
        if !self.connected {
            return Err(SinkError::NotConnected);
        }
        // Slow synthetic drift so repeated polls are distinguishable.
        self.temperature_c += 0.01;
        Ok(SinkStatus {
            temperature_c: Some(self.temperature_c),
            ext_ref_locked: Some(true),
            buffer_level: Some(0.5),
        })
    }
}
