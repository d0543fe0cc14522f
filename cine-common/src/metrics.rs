//! Performance metrics snapshot
//!
//! Derived/rolling values recomputed from internal samples by the engine
//! and carried on `PerformanceUpdate` events for telemetry and adaptive
//! degradation decisions in the host viewer.

use serde::{Deserialize, Serialize};

/// Rolling playback health metrics
///
/// All fields are derived; consumers must treat a snapshot as
/// point-in-time and never mutate it back into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Observed frame rate over the rolling frame-time window (fps)
    pub actual_frame_rate: f64,

    /// Navigations that found their target slice unbuffered
    pub dropped_frames: u64,

    /// Fraction of the preload window currently buffered (0..1)
    pub buffer_health: f64,

    /// Exponential moving average of slice load latency (ms)
    pub loading_latency_ms: f64,

    /// Frame-time consistency score (0..1, 1 = perfectly smooth)
    pub smoothness_score: f64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            actual_frame_rate: 0.0,
            dropped_frames: 0,
            buffer_health: 0.0,
            loading_latency_ms: 0.0,
            smoothness_score: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_metrics() {
        let m = PerformanceMetrics::default();
        assert_eq!(m.dropped_frames, 0);
        assert_eq!(m.smoothness_score, 1.0);
        assert_eq!(m.buffer_health, 0.0);
    }
}
