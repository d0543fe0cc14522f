//! # Cine Common Library
//!
//! Shared types for the cine playback engine and its host viewers:
//! - Error taxonomy (`Error` enum)
//! - Playback event types and the typed event bus
//! - Performance metrics snapshot consumed by telemetry

pub mod error;
pub mod events;
pub mod metrics;

pub use error::{BoxError, Error, Result};
pub use events::{EventBus, EventKind, ListenerHandle, PlaybackEvent};
pub use metrics::PerformanceMetrics;
