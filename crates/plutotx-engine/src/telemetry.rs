//! # Telemetry Aggregator and Event Hub
//!
//! Periodic health reporting for the streaming engine. Each channel
//! pipeline exposes a [`TelemetrySource`] probe; the aggregator polls
//! every probe at a fixed cadence, merges the results into one
//! [`TelemetrySnapshot`], and pushes it through the [`EventHub`].
//!
//! Consumers only ever see the latest snapshot. If a subscriber is slow
//! the aggregator does not queue behind it, so telemetry can never stall
//! the streaming path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use plutotx_core::types::TxChannel;
use tracing::{debug, warn};

use crate::pipeline::ChannelState;
use crate::sink::SinkStatus;

/// One channel's contribution to a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ChannelTelemetry {
    /// Which channel this describes.
    pub channel: TxChannel,
    /// Pipeline state at poll time.
    pub state: ChannelState,
    /// Configured TX gain in dB, once RF parameters have been applied.
    pub gain_db: Option<f64>,
    /// Total samples pushed to the sink since the last reset.
    pub samples_streamed: u64,
    /// Underrun episodes since the last reset.
    pub underruns: u64,
    /// Buffers currently staged for streaming.
    pub buffers_queued: usize,
    /// Sink health, if the sink reports it.
    pub sink: Option<SinkStatus>,
}

/// Merged view of every channel, produced at the telemetry cadence.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TelemetrySnapshot {
    /// Wall-clock time of the poll.
    pub taken_at: SystemTime,
    /// One entry per registered channel.
    pub channels: Vec<ChannelTelemetry>,
}

impl TelemetrySnapshot {
    /// Look up one channel's entry.
    pub fn channel(&self, channel: TxChannel) -> Option<&ChannelTelemetry> {
        self.channels.iter().find(|c| c.channel == channel)
    }
}

/// Events published by the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A pipeline moved to a new state.
    StateChanged {
        channel: TxChannel,
        state: ChannelState,
    },
    /// The staging queue ran dry while streaming.
    Underrun { channel: TxChannel, total: u64 },
    /// A buffer was staged with a warning verdict.
    ValidationWarning {
        channel: TxChannel,
        reasons: Vec<String>,
    },
    /// A synchronized start timed out or was cancelled.
    SyncAborted { channel: TxChannel },
    /// The sink rejected a write and the pipeline faulted.
    Fault { channel: TxChannel, message: String },
    /// A fresh telemetry snapshot.
    Snapshot(TelemetrySnapshot),
}

type EventCallback = Box<dyn Fn(&EngineEvent) + Send + Sync>;

/// Fan-out point for engine events.
///
/// Callbacks run on the publisher's thread and must not block; the hub
/// makes no delivery guarantees beyond "called once per event".
#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<EventCallback>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for every future event.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        self.subscribers.lock().unwrap().push(Box::new(callback));
    }

    /// Deliver an event to every subscriber.
    pub fn publish(&self, event: &EngineEvent) {
        for callback in self.subscribers.lock().unwrap().iter() {
            callback(event);
        }
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.subscribers.lock().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("EventHub").field("subscribers", &count).finish()
    }
}

/// A pollable source of per-channel telemetry.
pub trait TelemetrySource: Send + Sync {
    fn sample(&self) -> ChannelTelemetry;
}

/// Background poller that merges channel probes into snapshots.
pub struct TelemetryAggregator {
    sources: Vec<Arc<dyn TelemetrySource>>,
    hub: Arc<EventHub>,
    period: Duration,
    latest: Arc<Mutex<Option<TelemetrySnapshot>>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl TelemetryAggregator {
    /// Build an aggregator polling `sources` every `period`.
    pub fn new(
        sources: Vec<Arc<dyn TelemetrySource>>,
        hub: Arc<EventHub>,
        period: Duration,
    ) -> Self {
        Self {
            sources,
            hub,
            period,
            latest: Arc::new(Mutex::new(None)),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Start the polling thread. Idempotent.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }
        let sources = self.sources.clone();
        let hub = Arc::clone(&self.hub);
        let latest = Arc::clone(&self.latest);
        let shutdown = Arc::clone(&self.shutdown);
        let period = self.period;
        let handle = std::thread::Builder::new()
            .name("telemetry".into())
            .spawn(move || {
                debug!(period_ms = period.as_millis() as u64, "telemetry poller started");
                while !shutdown.load(Ordering::Acquire) {
                    let snapshot = TelemetrySnapshot {
                        taken_at: SystemTime::now(),
                        channels: sources.iter().map(|s| s.sample()).collect(),
                    };
                    *latest.lock().unwrap() = Some(snapshot.clone());
                    hub.publish(&EngineEvent::Snapshot(snapshot));
                    std::thread::sleep(period);
                }
                debug!("telemetry poller stopped");
            });
        match handle {
            Ok(handle) => self.worker = Some(handle),
            Err(e) => warn!(error = %e, "failed to spawn telemetry thread"),
        }
    }

    /// The most recent snapshot, if one has been taken.
    pub fn latest(&self) -> Option<TelemetrySnapshot> {
        self.latest.lock().unwrap().clone()
    }

    /// Stop the polling thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TelemetryAggregator {
    fn drop(&mut self) {
        self.stop();
    }
}
