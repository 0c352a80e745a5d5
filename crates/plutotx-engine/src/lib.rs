//! # PlutoTX Streaming Engine
//!
//! Dual-channel transmit engine built on the `plutotx-core` DSP layer.
//! Each TX channel runs a pipeline with its own worker thread feeding a
//! shared hardware sink; a rendezvous barrier lets both channels start
//! streaming in the same instant, and a telemetry aggregator reports
//! engine health at a fixed cadence.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────── TxSession ────────────────────────┐
//! │  ┌─ ChannelPipeline (tx1) ─┐   ┌─ ChannelPipeline (tx2) ─┐│
//! │  │ staging queue → worker  │   │ staging queue → worker  ││
//! │  └───────────┬─────────────┘   └───────────┬─────────────┘│
//! │          ArmBarrier (synchronized release)                │
//! │              └───────── HardwareSink ───────┘             │
//! │  TelemetryAggregator → EventHub → subscribers             │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod barrier;
pub mod mock;
pub mod pipeline;
pub mod session;
pub mod sink;
pub mod telemetry;

pub use barrier::{ArmBarrier, SyncError, SyncToken};
pub use mock::MockSink;
pub use pipeline::{
    ChannelPipeline, ChannelState, PipelineConfig, PipelineError, PipelineProbe, SharedSink,
};
pub use session::{SessionError, TxSession};
pub use sink::{HardwareSink, RfParams, SinkCapabilities, SinkError, SinkResult, SinkStatus};
pub use telemetry::{
    ChannelTelemetry, EngineEvent, EventHub, TelemetryAggregator, TelemetrySnapshot,
    TelemetrySource,
};
