//! # Transmit Session
//!
//! Top-level orchestrator owning both channel pipelines, the shared
//! sink, the arm barrier, and the telemetry aggregator. A session walks
//! a waveform from descriptor to air:
//!
//! ```text
//! descriptor → synthesize → validate → load → arm ⇉ stream
//!                                              (barrier)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use plutotx_core::{PlutoTxConfig, TxChannel, WaveformDescriptor};
//! use plutotx_engine::mock::MockSink;
//! use plutotx_engine::session::TxSession;
//!
//! let mut config = PlutoTxConfig::default();
//! config.tx1.enabled = true;
//! config.tx2.enabled = true;
//!
//! let session = TxSession::new(Box::new(MockSink::new()), config);
//! session.apply_configured_rf().unwrap();
//!
//! let tone = WaveformDescriptor::tone("t1", TxChannel::Tx1, 2.0e6, 30.72e6, 0.05, 0.8);
//! let sweep = WaveformDescriptor::tone("t2", TxChannel::Tx2, 1.0e6, 30.72e6, 0.05, 0.8);
//! session.prepare(&tone).unwrap();
//! session.prepare(&sweep).unwrap();
//!
//! // Both DACs start within one barrier release.
//! session.start_synchronized().unwrap();
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use plutotx_core::config::PlutoTxConfig;
use plutotx_core::types::{TxChannel, WaveformError};
use plutotx_core::validator::Validator;
use plutotx_core::wavegen::{synthesize, WaveformDescriptor};
use tracing::info;

use crate::barrier::ArmBarrier;
use crate::pipeline::{
    ChannelPipeline, ChannelState, PipelineConfig, PipelineError, SharedSink,
};
use crate::sink::{HardwareSink, RfParams};
use crate::telemetry::{EventHub, TelemetryAggregator, TelemetrySnapshot, TelemetrySource};

/// Errors from session-level operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Waveform(#[from] WaveformError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("RF bandwidth {bandwidth_hz} Hz does not fit in a {sample_rate_sps} sps channel")]
    BandwidthTooWide {
        bandwidth_hz: f64,
        sample_rate_sps: f64,
    },

    #[error("channel {channel} is not in the {expected} state")]
    ChannelNotReady {
        channel: TxChannel,
        expected: &'static str,
    },

    #[error("sink {0} cannot stream both channels at once")]
    DualTxUnsupported(String),
}

/// A dual-channel transmit session over one hardware sink.
pub struct TxSession {
    config: PlutoTxConfig,
    sink: SharedSink,
    pipelines: [ChannelPipeline; 2],
    barrier: ArmBarrier,
    hub: Arc<EventHub>,
    telemetry: TelemetryAggregator,
}

impl TxSession {
    /// Build a session over `sink`, spawning both channel workers and
    /// the telemetry poller.
    pub fn new(sink: Box<dyn HardwareSink>, config: PlutoTxConfig) -> Self {
        let sink_name = sink.name().to_string();
        let sink: SharedSink = Arc::new(Mutex::new(sink));
        let hub = Arc::new(EventHub::new());
        let pipeline_config = PipelineConfig::from_section(&config.engine);
        let pipelines = [
            ChannelPipeline::new(
                TxChannel::Tx1,
                Arc::clone(&sink),
                pipeline_config,
                Arc::clone(&hub),
            ),
            ChannelPipeline::new(
                TxChannel::Tx2,
                Arc::clone(&sink),
                pipeline_config,
                Arc::clone(&hub),
            ),
        ];
        let probes: Vec<Arc<dyn TelemetrySource>> = pipelines
            .iter()
            .map(|p| Arc::new(p.probe()) as Arc<dyn TelemetrySource>)
            .collect();
        let mut telemetry = TelemetryAggregator::new(
            probes,
            Arc::clone(&hub),
            Duration::from_millis(config.engine.telemetry_period_ms),
        );
        telemetry.start();
        info!(sink = %sink_name, "transmit session ready");
        Self {
            config,
            sink,
            pipelines,
            barrier: ArmBarrier::new(),
            hub,
            telemetry,
        }
    }

    /// The event hub, for subscribing to state changes and telemetry.
    pub fn events(&self) -> &Arc<EventHub> {
        &self.hub
    }

    /// Direct access to one channel's pipeline.
    pub fn pipeline(&self, channel: TxChannel) -> &ChannelPipeline {
        &self.pipelines[channel.index()]
    }

    /// Apply RF parameters to one channel.
    ///
    /// The bandwidth is checked against the sample rate before anything
    /// touches the hardware; the analog filter cannot be wider than the
    /// digital channel feeding it.
    pub fn apply_rf(&self, channel: TxChannel, params: &RfParams) -> Result<(), SessionError> {
        if params.rf_bandwidth_hz > params.sample_rate_sps {
            return Err(SessionError::BandwidthTooWide {
                bandwidth_hz: params.rf_bandwidth_hz,
                sample_rate_sps: params.sample_rate_sps,
            });
        }
        self.pipeline(channel).configure(params)?;
        Ok(())
    }

    /// Apply the config file's RF sections to each enabled channel.
    pub fn apply_configured_rf(&self) -> Result<(), SessionError> {
        for (channel, section) in [
            (TxChannel::Tx1, &self.config.tx1),
            (TxChannel::Tx2, &self.config.tx2),
        ] {
            if section.enabled {
                self.apply_rf(channel, &RfParams::from_section(section))?;
            }
        }
        Ok(())
    }

    /// Synthesize, validate, and stage a waveform on its channel.
    pub fn prepare(&self, descriptor: &WaveformDescriptor) -> Result<(), SessionError> {
        let mut buffer = synthesize(descriptor.clone())?;
        let validator = Validator {
            crest_limit_db: self.config.waveform.crest_limit_db,
            normalize: self.config.waveform.normalize,
            normalize_target: self.config.waveform.amplitude,
        };
        validator.validate(&mut buffer);
        self.pipeline(descriptor.channel).load(buffer)?;
        Ok(())
    }

    /// Start one channel independently.
    ///
    /// Uses a one-participant barrier session, so the channel releases
    /// immediately.
    pub fn start(&self, channel: TxChannel) -> Result<(), SessionError> {
        let token = self.barrier.begin(1).map_err(PipelineError::Sync)?;
        self.pipeline(channel)
            .arm(&self.barrier, token, self.arm_timeout())?;
        Ok(())
    }

    /// Start both channels simultaneously.
    ///
    /// Both pipelines must already be loaded. Each channel arms on its
    /// own thread and blocks at the barrier; the barrier releases both
    /// together. If either channel fails to arm in time, the session
    /// aborts and both fall back to loaded.
    pub fn start_synchronized(&self) -> Result<(), SessionError> {
        {
            let sink = self.sink.lock().unwrap();
            if !sink.capabilities().dual_tx {
                return Err(SessionError::DualTxUnsupported(sink.name().to_string()));
            }
        }
        for channel in TxChannel::ALL {
            if self.pipeline(channel).state() != ChannelState::Loaded {
                return Err(SessionError::ChannelNotReady {
                    channel,
                    expected: "loaded",
                });
            }
        }
        let timeout = self.arm_timeout();
        let token = self.barrier.begin(2).map_err(PipelineError::Sync)?;
        let (tx1_result, tx2_result) = std::thread::scope(|scope| {
            let tx2 = scope
                .spawn(|| self.pipeline(TxChannel::Tx2).arm(&self.barrier, token, timeout));
            let tx1 = self.pipeline(TxChannel::Tx1).arm(&self.barrier, token, timeout);
            (tx1, tx2.join().expect("tx2 arm thread panicked"))
        });
        tx1_result?;
        tx2_result?;
        info!("synchronized start released both channels");
        Ok(())
    }

    /// Stop one streaming channel.
    pub fn stop(&self, channel: TxChannel) -> Result<(), SessionError> {
        self.pipeline(channel).stop()?;
        Ok(())
    }

    /// Stop every channel currently streaming.
    pub fn stop_all(&self) -> Result<(), SessionError> {
        for channel in TxChannel::ALL {
            if self.pipeline(channel).state() == ChannelState::Streaming {
                self.pipeline(channel).stop()?;
            }
        }
        Ok(())
    }

    /// Return one channel to idle after a stop or fault.
    pub fn reset(&self, channel: TxChannel) -> Result<(), SessionError> {
        self.pipeline(channel).reset()?;
        Ok(())
    }

    /// The most recent merged telemetry snapshot.
    pub fn snapshot(&self) -> Option<TelemetrySnapshot> {
        self.telemetry.latest()
    }

    /// Poll the sink's health directly.
    pub fn sink_status(&self) -> Result<crate::sink::SinkStatus, crate::sink::SinkError> {
        self.sink.lock().unwrap().report_status()
    }

    fn arm_timeout(&self) -> Duration {
        Duration::from_millis(self.config.engine.arm_timeout_ms)
    }
}

impl Drop for TxSession {
    fn drop(&mut self) {
        self.telemetry.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSink;
    use std::time::Instant;

    const TEST_RATE: f64 = 1.0e6;

    fn test_config() -> PlutoTxConfig {
        let mut config = PlutoTxConfig::default();
        for section in [&mut config.tx1, &mut config.tx2] {
            section.enabled = true;
            section.center_frequency_hz = 915.0e6;
            section.sample_rate_sps = TEST_RATE;
            section.rf_bandwidth_hz = 0.5e6;
        }
        config.engine.chunk_samples = 256;
        config.engine.grace_period_ms = 40;
        config.engine.arm_timeout_ms = 500;
        config.engine.telemetry_period_ms = 100;
        config
    }

    fn tone(name: &str, channel: TxChannel, duration_s: f64) -> WaveformDescriptor {
        WaveformDescriptor::tone(name, channel, 10.0e3, TEST_RATE, duration_s, 0.5)
    }

    fn ready_session() -> TxSession {
        let session = TxSession::new(Box::new(MockSink::new().with_pacing()), test_config());
        session.apply_configured_rf().unwrap();
        session
    }

    fn wait_for_state(session: &TxSession, channel: TxChannel, state: ChannelState) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while session.pipeline(channel).state() != state && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(session.pipeline(channel).state(), state);
    }

    #[test]
    fn test_synchronized_start_streams_both_channels() {
        let session = ready_session();
        session.prepare(&tone("a", TxChannel::Tx1, 0.2)).unwrap();
        session.prepare(&tone("b", TxChannel::Tx2, 0.2)).unwrap();

        session.start_synchronized().unwrap();
        assert_eq!(session.pipeline(TxChannel::Tx1).state(), ChannelState::Streaming);
        assert_eq!(session.pipeline(TxChannel::Tx2).state(), ChannelState::Streaming);

        std::thread::sleep(Duration::from_millis(30));
        session.stop_all().unwrap();
        assert_eq!(session.pipeline(TxChannel::Tx1).state(), ChannelState::Stopped);
        assert_eq!(session.pipeline(TxChannel::Tx2).state(), ChannelState::Stopped);
    }

    #[test]
    fn test_synchronized_start_requires_both_loaded() {
        let session = ready_session();
        session.prepare(&tone("a", TxChannel::Tx1, 0.1)).unwrap();
        let err = session.start_synchronized().unwrap_err();
        assert!(matches!(
            err,
            SessionError::ChannelNotReady {
                channel: TxChannel::Tx2,
                ..
            }
        ));
        // The loaded channel is untouched.
        assert_eq!(session.pipeline(TxChannel::Tx1).state(), ChannelState::Loaded);
    }

    #[test]
    fn test_independent_start_releases_immediately() {
        let session = ready_session();
        session.prepare(&tone("solo", TxChannel::Tx2, 0.1)).unwrap();
        session.start(TxChannel::Tx2).unwrap();
        assert_eq!(session.pipeline(TxChannel::Tx2).state(), ChannelState::Streaming);
        assert_eq!(session.pipeline(TxChannel::Tx1).state(), ChannelState::Idle);
        session.stop(TxChannel::Tx2).unwrap();
    }

    #[test]
    fn test_bandwidth_precheck_blocks_apply() {
        let session = TxSession::new(Box::new(MockSink::new()), test_config());
        let params = RfParams {
            center_frequency_hz: 915.0e6,
            sample_rate_sps: 1.0e6,
            rf_bandwidth_hz: 2.0e6,
            gain_db: -10.0,
        };
        let err = session.apply_rf(TxChannel::Tx1, &params).unwrap_err();
        assert!(matches!(err, SessionError::BandwidthTooWide { .. }));
    }

    #[test]
    fn test_prepare_rejects_nyquist_violation() {
        let session = ready_session();
        let desc = WaveformDescriptor::tone("hot", TxChannel::Tx1, 600.0e3, TEST_RATE, 0.01, 0.5);
        let err = session.prepare(&desc).unwrap_err();
        assert!(matches!(err, SessionError::Waveform(_)));
    }

    #[test]
    fn test_snapshot_covers_both_channels() {
        let session = ready_session();
        let deadline = Instant::now() + Duration::from_secs(2);
        let snapshot = loop {
            if let Some(snapshot) = session.snapshot() {
                break snapshot;
            }
            assert!(Instant::now() < deadline, "no telemetry snapshot produced");
            std::thread::sleep(Duration::from_millis(10));
        };
        assert_eq!(snapshot.channels.len(), 2);
        assert!(snapshot.channel(TxChannel::Tx1).is_some());
        assert!(snapshot.channel(TxChannel::Tx2).is_some());
    }

    #[test]
    fn test_full_lifecycle_with_reset() {
        let session = ready_session();
        session.prepare(&tone("once", TxChannel::Tx1, 0.01)).unwrap();
        session.start(TxChannel::Tx1).unwrap();
        wait_for_state(&session, TxChannel::Tx1, ChannelState::Stopped);
        session.reset(TxChannel::Tx1).unwrap();
        assert_eq!(session.pipeline(TxChannel::Tx1).state(), ChannelState::Idle);
        // The channel is immediately reusable.
        session.prepare(&tone("again", TxChannel::Tx1, 0.01)).unwrap();
        assert_eq!(session.pipeline(TxChannel::Tx1).state(), ChannelState::Loaded);
    }

    #[test]
    fn test_sink_status_passthrough() {
        let session = ready_session();
        let status = session.sink_status().unwrap();
        assert!(status.temperature_c.is_some());
    }
}
