//! Frame timing and rolling performance metrics
//!
//! Tracks a bounded window of slice-change timestamps plus dropped-frame
//! and load-latency accounting. All derived values (`actual_frame_rate`,
//! `smoothness_score`, ...) are recomputed on demand from the samples;
//! nothing here is mutated from outside the engine.

use cine_common::PerformanceMetrics;
use std::collections::VecDeque;
use std::time::Instant;

/// Rolling frame-time window size
const FRAME_WINDOW: usize = 60;

/// EMA smoothing factor for load latency
const LATENCY_EMA_ALPHA: f64 = 0.1;

/// Below this many frame samples the smoothness score is pinned to 1.0
const SMOOTHNESS_MIN_SAMPLES: usize = 10;

/// A performance sample is emitted every this many recorded frames
pub const PERFORMANCE_SAMPLE_INTERVAL: u64 = 10;

#[derive(Debug, Default)]
pub struct MetricsTracker {
    frame_times: VecDeque<Instant>,
    frames_recorded: u64,
    dropped_frames: u64,
    latency_ema_ms: Option<f64>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full reset (study re-initialization)
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Clear frame timing only; dropped-frame and latency history survive
    /// (playback start)
    pub fn reset_frame_timing(&mut self) {
        self.frame_times.clear();
        self.frames_recorded = 0;
    }

    /// Record a slice change.
    ///
    /// Returns the frame time in ms (0 for the first frame after a timing
    /// reset) and the total frames recorded since that reset.
    pub fn record_frame(&mut self, now: Instant) -> (f64, u64) {
        let frame_time_ms = self
            .frame_times
            .back()
            .map(|last| now.duration_since(*last).as_secs_f64() * 1000.0)
            .unwrap_or(0.0);

        self.frame_times.push_back(now);
        if self.frame_times.len() > FRAME_WINDOW {
            self.frame_times.pop_front();
        }
        self.frames_recorded += 1;

        (frame_time_ms, self.frames_recorded)
    }

    /// Count a navigation that found its target unbuffered
    pub fn record_dropped(&mut self) {
        self.dropped_frames += 1;
    }

    /// Feed an observed load latency into the moving average.
    ///
    /// `ema = ema*(1-a) + sample*a`; the first sample seeds the average.
    pub fn record_latency(&mut self, sample_ms: f64) {
        self.latency_ema_ms = Some(match self.latency_ema_ms {
            Some(ema) => ema * (1.0 - LATENCY_EMA_ALPHA) + sample_ms * LATENCY_EMA_ALPHA,
            None => sample_ms,
        });
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency_ema_ms.unwrap_or(0.0)
    }

    pub fn frames_recorded(&self) -> u64 {
        self.frames_recorded
    }

    /// Observed frame rate over the rolling window (fps)
    pub fn actual_frame_rate(&self) -> f64 {
        let (Some(first), Some(last)) = (self.frame_times.front(), self.frame_times.back()) else {
            return 0.0;
        };
        if self.frame_times.len() < 2 {
            return 0.0;
        }
        let span_ms = last.duration_since(*first).as_secs_f64() * 1000.0;
        if span_ms <= 0.0 {
            return 0.0;
        }
        (self.frame_times.len() - 1) as f64 / span_ms * 1000.0
    }

    /// Frame-time consistency from the coefficient of variation of
    /// consecutive deltas: `max(0, 1 - 2*(stddev/mean))`.
    pub fn smoothness_score(&self) -> f64 {
        if self.frame_times.len() < SMOOTHNESS_MIN_SAMPLES {
            return 1.0;
        }

        let deltas: Vec<f64> = self
            .frame_times
            .iter()
            .zip(self.frame_times.iter().skip(1))
            .map(|(a, b)| b.duration_since(*a).as_secs_f64() * 1000.0)
            .collect();

        let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
        if mean <= 0.0 {
            return 1.0;
        }
        let variance =
            deltas.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / deltas.len() as f64;
        let stddev = variance.sqrt();

        (1.0 - 2.0 * (stddev / mean)).max(0.0)
    }

    /// Snapshot with the caller-supplied buffer health folded in
    pub fn snapshot(&self, buffer_health: f64, smoothing_enabled: bool) -> PerformanceMetrics {
        PerformanceMetrics {
            actual_frame_rate: self.actual_frame_rate(),
            dropped_frames: self.dropped_frames,
            buffer_health,
            loading_latency_ms: self.latency_ms(),
            smoothness_score: if smoothing_enabled {
                self.smoothness_score()
            } else {
                1.0
            },
        }
    }
}
