//! # Channel Pipeline
//!
//! Per-channel streaming state machine. Validated sample buffers are
//! staged into a bounded queue; a dedicated worker thread feeds the sink
//! in fixed-size chunks so the caller is never on the real-time path.
//!
//! ## State machine
//!
//! ```text
//!          load          arm         barrier release
//!  Idle ────────▶ Loaded ────▶ Armed ───────────────▶ Streaming
//!    ▲                ▲          │ timeout/abort          │
//!    │                └──────────┘                        │ stop /
//!    │ reset                                              │ queue drained
//!    ├──────────────────── Stopped ◀──────────────────────┤
//!    └──────────────────── Faulted ◀── sink write error ──┘
//! ```
//!
//! When the queue runs dry while streaming, the worker counts one
//! underrun per empty episode and keeps the DAC fed with fallback
//! samples until either new data arrives or the grace period expires,
//! at which point the pipeline stops cleanly.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TryRecvError};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use plutotx_core::config::{EngineSection, UnderrunFallback};
use plutotx_core::types::{IQSample, TxChannel};
use plutotx_core::validator::Verdict;
use plutotx_core::wavegen::SampleBuffer;
use tracing::{info, warn};

use crate::barrier::{ArmBarrier, SyncError, SyncToken};
use crate::sink::{HardwareSink, RfParams, SinkError};
use crate::telemetry::{ChannelTelemetry, EngineEvent, EventHub, TelemetrySource};

/// Shared handle to the sink, cloned into both pipelines when a single
/// physical device carries both channels.
pub type SharedSink = Arc<Mutex<Box<dyn HardwareSink>>>;

/// Lifecycle state of one channel pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    /// No data staged.
    Idle,
    /// At least one validated buffer staged.
    Loaded,
    /// Waiting at the arm barrier.
    Armed,
    /// Worker is feeding the sink.
    Streaming,
    /// Streaming ended, counters preserved for inspection.
    Stopped,
    /// Sink write failed, manual reset required.
    Faulted,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChannelState::Idle => "idle",
            ChannelState::Loaded => "loaded",
            ChannelState::Armed => "armed",
            ChannelState::Streaming => "streaming",
            ChannelState::Stopped => "stopped",
            ChannelState::Faulted => "faulted",
        };
        write!(f, "{}", name)
    }
}

/// Errors from pipeline operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("cannot {action} from the {from} state")]
    InvalidTransition {
        from: ChannelState,
        action: &'static str,
    },

    #[error("buffer has not been validated")]
    NotValidated,

    #[error("validation verdict {verdict:?} blocks loading: {reasons:?}")]
    ValidationRejected {
        verdict: Verdict,
        reasons: Vec<String>,
    },

    #[error("staging queue is full")]
    QueueFull,

    #[error("buffer targets {buffer} but this pipeline drives {pipeline}")]
    ChannelMismatch {
        buffer: TxChannel,
        pipeline: TxChannel,
    },

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("worker thread did not acknowledge the stop request")]
    WorkerStalled,
}

/// Streaming tunables for one pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Staging queue capacity in buffers.
    pub queue_depth: usize,
    /// Samples per sink write.
    pub chunk_samples: usize,
    /// Per-write deadline.
    pub write_deadline: Duration,
    /// Idle time on an empty queue before the worker stops.
    pub grace_period: Duration,
    /// Fill behavior while the queue is empty.
    pub fallback: UnderrunFallback,
}

impl PipelineConfig {
    pub fn from_section(section: &EngineSection) -> Self {
        Self {
            queue_depth: section.queue_depth,
            chunk_samples: section.chunk_samples,
            write_deadline: Duration::from_millis(section.write_deadline_ms),
            grace_period: Duration::from_millis(section.grace_period_ms),
            fallback: section.underrun_fallback,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_section(&EngineSection::default())
    }
}

struct Shared {
    channel: TxChannel,
    state: Mutex<ChannelState>,
    cond: Condvar,
    samples_streamed: AtomicU64,
    underruns: AtomicU64,
    buffers_queued: AtomicUsize,
    stop_requested: AtomicBool,
    shutdown: AtomicBool,
    fault: Mutex<Option<String>>,
    rf: Mutex<Option<RfParams>>,
    hub: Arc<EventHub>,
}

impl Shared {
    fn set_state(&self, next: ChannelState) {
        let mut state = self.state.lock().unwrap();
        if *state == next {
            return;
        }
        info!(channel = %self.channel, from = %*state, to = %next, "pipeline state change");
        *state = next;
        self.cond.notify_all();
        drop(state);
        self.hub.publish(&EngineEvent::StateChanged {
            channel: self.channel,
            state: next,
        });
    }

    fn state(&self) -> ChannelState {
        *self.state.lock().unwrap()
    }
}

/// One channel's streaming pipeline.
pub struct ChannelPipeline {
    channel: TxChannel,
    shared: Arc<Shared>,
    sink: SharedSink,
    staging: SyncSender<SampleBuffer>,
    worker: Option<JoinHandle<()>>,
}

impl ChannelPipeline {
    /// Build a pipeline and spawn its worker thread.
    pub fn new(
        channel: TxChannel,
        sink: SharedSink,
        config: PipelineConfig,
        hub: Arc<EventHub>,
    ) -> Self {
        let (staging, rx) = mpsc::sync_channel(config.queue_depth);
        let shared = Arc::new(Shared {
            channel,
            state: Mutex::new(ChannelState::Idle),
            cond: Condvar::new(),
            samples_streamed: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            buffers_queued: AtomicUsize::new(0),
            stop_requested: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            fault: Mutex::new(None),
            rf: Mutex::new(None),
            hub,
        });
        let worker = {
            let shared = Arc::clone(&shared);
            let sink = Arc::clone(&sink);
            std::thread::Builder::new()
                .name(format!("{}-worker", channel))
                .spawn(move || worker_loop(shared, rx, sink, config))
                .ok()
        };
        Self {
            channel,
            shared,
            sink,
            staging,
            worker,
        }
    }

    /// The channel this pipeline drives.
    pub fn channel(&self) -> TxChannel {
        self.channel
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    /// Underrun episodes since the last reset.
    pub fn underruns(&self) -> u64 {
        self.shared.underruns.load(Ordering::Acquire)
    }

    /// Waveform samples pushed to the sink since the last reset.
    pub fn samples_streamed(&self) -> u64 {
        self.shared.samples_streamed.load(Ordering::Acquire)
    }

    /// The fault message if the pipeline is in the faulted state.
    pub fn fault(&self) -> Option<String> {
        self.shared.fault.lock().unwrap().clone()
    }

    /// Apply RF parameters to the sink for this channel.
    ///
    /// Rejected while streaming; retuning under an active DAC is not
    /// supported by the hardware.
    pub fn configure(&self, params: &RfParams) -> Result<(), PipelineError> {
        let state = self.state();
        if matches!(state, ChannelState::Armed | ChannelState::Streaming) {
            return Err(PipelineError::InvalidTransition {
                from: state,
                action: "configure",
            });
        }
        self.sink.lock().unwrap().configure(self.channel, params)?;
        *self.shared.rf.lock().unwrap() = Some(*params);
        Ok(())
    }

    /// Stage a validated buffer for streaming.
    ///
    /// The buffer must carry a passing validation report. A `Warn`
    /// verdict is rejected here; staging it anyway requires the caller
    /// to acknowledge it through
    /// [`load_accepting_warnings`](Self::load_accepting_warnings).
    pub fn load(&self, buffer: SampleBuffer) -> Result<(), PipelineError> {
        self.load_inner(buffer, false)
    }

    /// Stage a buffer whose report carries a `Warn` verdict.
    ///
    /// The warning is still published as an engine event so monitors
    /// see what went on air.
    pub fn load_accepting_warnings(&self, buffer: SampleBuffer) -> Result<(), PipelineError> {
        self.load_inner(buffer, true)
    }

    fn load_inner(&self, buffer: SampleBuffer, accept_warn: bool) -> Result<(), PipelineError> {
        let state = self.state();
        if matches!(state, ChannelState::Stopped | ChannelState::Faulted) {
            return Err(PipelineError::InvalidTransition {
                from: state,
                action: "load",
            });
        }
        if buffer.descriptor().channel != self.channel {
            return Err(PipelineError::ChannelMismatch {
                buffer: buffer.descriptor().channel,
                pipeline: self.channel,
            });
        }
        let report = buffer.report().ok_or(PipelineError::NotValidated)?;
        match report.verdict {
            Verdict::Pass => {}
            Verdict::Warn if accept_warn => {
                warn!(channel = %self.channel, reasons = ?report.reasons, "staging buffer with acknowledged warnings");
                self.shared.hub.publish(&EngineEvent::ValidationWarning {
                    channel: self.channel,
                    reasons: report.reasons.clone(),
                });
            }
            verdict => {
                return Err(PipelineError::ValidationRejected {
                    verdict,
                    reasons: report.reasons.clone(),
                });
            }
        }
        // The gauge leads the queue so the worker's decrement after a
        // receive can never underflow it.
        self.shared.buffers_queued.fetch_add(1, Ordering::AcqRel);
        if self.staging.try_send(buffer).is_err() {
            self.shared.buffers_queued.fetch_sub(1, Ordering::AcqRel);
            return Err(PipelineError::QueueFull);
        }
        if self.state() == ChannelState::Idle {
            self.shared.set_state(ChannelState::Loaded);
        }
        Ok(())
    }

    /// Arm this channel and block at the barrier until every participant
    /// in the session has armed.
    ///
    /// On release the pipeline moves to streaming and the worker starts
    /// feeding the sink. On timeout or abort the pipeline falls back to
    /// loaded with its staged data intact.
    pub fn arm(
        &self,
        barrier: &ArmBarrier,
        token: SyncToken,
        timeout: Duration,
    ) -> Result<(), PipelineError> {
        let state = self.state();
        if state != ChannelState::Loaded {
            return Err(PipelineError::InvalidTransition {
                from: state,
                action: "arm",
            });
        }
        self.shared.set_state(ChannelState::Armed);
        match barrier.wait_armed(token, timeout) {
            Ok(()) => {
                // Cleared before the state flips so a stop issued the
                // instant streaming begins still reaches the worker.
                self.shared.stop_requested.store(false, Ordering::Release);
                self.shared.set_state(ChannelState::Streaming);
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(ChannelState::Loaded);
                self.shared.hub.publish(&EngineEvent::SyncAborted {
                    channel: self.channel,
                });
                Err(PipelineError::Sync(e))
            }
        }
    }

    /// Request a stop and wait for the worker to acknowledge it.
    pub fn stop(&self) -> Result<(), PipelineError> {
        let state = self.state();
        if state != ChannelState::Streaming {
            return Err(PipelineError::InvalidTransition {
                from: state,
                action: "stop",
            });
        }
        self.shared.stop_requested.store(true, Ordering::Release);
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut state = self.shared.state.lock().unwrap();
        while *state == ChannelState::Streaming {
            let now = Instant::now();
            if now >= deadline {
                return Err(PipelineError::WorkerStalled);
            }
            let (guard, _) = self
                .shared
                .cond
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = guard;
        }
        Ok(())
    }

    /// Return a stopped or faulted pipeline to idle, clearing counters
    /// and any recorded fault.
    pub fn reset(&self) -> Result<(), PipelineError> {
        let state = self.state();
        if !matches!(state, ChannelState::Stopped | ChannelState::Faulted) {
            return Err(PipelineError::InvalidTransition {
                from: state,
                action: "reset",
            });
        }
        self.shared.samples_streamed.store(0, Ordering::Release);
        self.shared.underruns.store(0, Ordering::Release);
        *self.shared.fault.lock().unwrap() = None;
        self.shared.set_state(ChannelState::Idle);
        Ok(())
    }

    /// A telemetry probe for the aggregator.
    pub fn probe(&self) -> PipelineProbe {
        PipelineProbe {
            shared: Arc::clone(&self.shared),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl Drop for ChannelPipeline {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.stop_requested.store(true, Ordering::Release);
        self.shared.cond.notify_all();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

/// Read-only telemetry view of one pipeline.
pub struct PipelineProbe {
    shared: Arc<Shared>,
    sink: SharedSink,
}

impl TelemetrySource for PipelineProbe {
    fn sample(&self) -> ChannelTelemetry {
        // A contended sink lock means the worker is mid-write; skip the
        // health poll rather than block the telemetry cadence.
        let sink = match self.sink.try_lock() {
            Ok(mut sink) => sink.report_status().ok(),
            Err(_) => None,
        };
        ChannelTelemetry {
            channel: self.shared.channel,
            state: self.shared.state(),
            gain_db: self.shared.rf.lock().unwrap().map(|rf| rf.gain_db),
            samples_streamed: self.shared.samples_streamed.load(Ordering::Acquire),
            underruns: self.shared.underruns.load(Ordering::Acquire),
            buffers_queued: self.shared.buffers_queued.load(Ordering::Acquire),
            sink,
        }
    }
}

fn drain(rx: &Receiver<SampleBuffer>, shared: &Shared) {
    while rx.try_recv().is_ok() {}
    shared.buffers_queued.store(0, Ordering::Release);
}

fn worker_loop(
    shared: Arc<Shared>,
    rx: Receiver<SampleBuffer>,
    sink: SharedSink,
    config: PipelineConfig,
) {
    let zeros = vec![IQSample::default(); config.chunk_samples];
    let mut last_chunk = zeros.clone();

    loop {
        // Park until armed-and-released or shut down.
        {
            let mut state = shared.state.lock().unwrap();
            while *state != ChannelState::Streaming && !shared.shutdown.load(Ordering::Acquire) {
                state = shared.cond.wait(state).unwrap();
            }
        }
        if shared.shutdown.load(Ordering::Acquire) {
            return;
        }

        let mut in_underrun = false;
        let mut idle_since = Instant::now();

        'streaming: loop {
            if shared.shutdown.load(Ordering::Acquire) {
                drain(&rx, &shared);
                return;
            }
            if shared.stop_requested.swap(false, Ordering::AcqRel) {
                drain(&rx, &shared);
                shared.set_state(ChannelState::Stopped);
                break 'streaming;
            }
            match rx.try_recv() {
                Ok(buffer) => {
                    shared.buffers_queued.fetch_sub(1, Ordering::AcqRel);
                    in_underrun = false;
                    for chunk in buffer.samples().chunks(config.chunk_samples) {
                        if shared.stop_requested.load(Ordering::Acquire)
                            || shared.shutdown.load(Ordering::Acquire)
                        {
                            break;
                        }
                        // Partial acceptance re-offers the tail so every
                        // staged sample reaches the sink in order.
                        let mut offset = 0;
                        while offset < chunk.len() {
                            let result = sink.lock().unwrap().write_chunk(
                                shared.channel,
                                &chunk[offset..],
                                config.write_deadline,
                            );
                            match result {
                                Ok(0) => {
                                    fault(
                                        &shared,
                                        &rx,
                                        SinkError::WriteTimeout(config.write_deadline),
                                    );
                                    break 'streaming;
                                }
                                Ok(accepted) => {
                                    shared
                                        .samples_streamed
                                        .fetch_add(accepted as u64, Ordering::AcqRel);
                                    offset += accepted;
                                }
                                Err(e) => {
                                    fault(&shared, &rx, e);
                                    break 'streaming;
                                }
                            }
                        }
                        if chunk.len() == config.chunk_samples {
                            last_chunk.copy_from_slice(chunk);
                        }
                    }
                    idle_since = Instant::now();
                }
                Err(TryRecvError::Empty) => {
                    if !in_underrun {
                        in_underrun = true;
                        idle_since = Instant::now();
                        let total = shared.underruns.fetch_add(1, Ordering::AcqRel) + 1;
                        warn!(channel = %shared.channel, total, "staging queue underrun");
                        shared.hub.publish(&EngineEvent::Underrun {
                            channel: shared.channel,
                            total,
                        });
                    }
                    if idle_since.elapsed() >= config.grace_period {
                        shared.set_state(ChannelState::Stopped);
                        break 'streaming;
                    }
                    let fill: &[IQSample] = match config.fallback {
                        UnderrunFallback::ZeroFill => &zeros,
                        UnderrunFallback::RepeatLast => &last_chunk,
                    };
                    let result = sink.lock().unwrap().write_chunk(
                        shared.channel,
                        fill,
                        config.write_deadline,
                    );
                    if let Err(e) = result {
                        fault(&shared, &rx, e);
                        break 'streaming;
                    }
                }
                Err(TryRecvError::Disconnected) => {
                    shared.set_state(ChannelState::Stopped);
                    break 'streaming;
                }
            }
        }
    }
}

fn fault(shared: &Shared, rx: &Receiver<SampleBuffer>, error: SinkError) {
    warn!(channel = %shared.channel, error = %error, "sink write failed, pipeline faulted");
    drain(rx, shared);
    *shared.fault.lock().unwrap() = Some(error.to_string());
    shared.hub.publish(&EngineEvent::Fault {
        channel: shared.channel,
        message: error.to_string(),
    });
    shared.set_state(ChannelState::Faulted);
}
