//! # Cine Playback Engine
//!
//! Real-time cine playback and intelligent buffering for multi-slice
//! medical image series (CT/MR stacks).
//!
//! **Purpose:** Keep a bounded prefetch buffer populated ahead of a moving
//! playback cursor, adapt the prefetch radius to frame rate and observed
//! load latency, handle direction reversal and loop/bounce semantics, and
//! report smoothness/health metrics for adaptive degradation in the host
//! viewer.
//!
//! **Architecture:** Single engine instance per viewer session, constructed
//! with an injected [`SliceLoader`] capability. Decoding and rendering stay
//! in the host; the engine only decides *when and which* slice indices are
//! requested. Loads run through a bounded concurrency gate; all other work
//! is lock-scoped and non-blocking.

pub mod adaptive;
pub mod buffer;
pub mod config;
pub mod engine;
pub mod loader;
pub mod metrics;
pub mod planner;
pub mod state;

pub use cine_common::{
    BoxError, Error, EventBus, EventKind, ListenerHandle, PerformanceMetrics, PlaybackEvent,
    Result,
};

pub use buffer::BufferStatus;
pub use config::EngineConfig;
pub use engine::CineEngine;
pub use loader::SliceLoader;
pub use state::{LoopMode, PlayDirection, PlaybackSnapshot};
