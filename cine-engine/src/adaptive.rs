//! Adaptive buffering controller
//!
//! Two inputs drive the preload radius: the requested frame rate (faster
//! cine needs a deeper look-ahead) and the observed load latency vs. the
//! per-frame time budget (a slow loader cannot fill a wide window, so the
//! radius contracts toward the cursor).

use cine_common::PerformanceMetrics;

/// Shrink factor applied when the loader cannot keep up (percent)
const SHRINK_NUMERATOR: usize = 3;
const SHRINK_DENOMINATOR: usize = 4;

/// Health below which a slow loader triggers a radius contraction
const UNHEALTHY_THRESHOLD: f64 = 0.5;

/// Health at or above which the radius may grow back toward target
const HEALTHY_THRESHOLD: f64 = 0.9;

/// Frame-rate-proportional preload radius.
///
/// `clamp(rate/10, 0.5, 2.0) * base`, rounded, never below 1. At the
/// default 10 fps this reproduces the configured base; 60 fps doubles it,
/// slow scrubbing halves it.
pub fn radius_for_frame_rate(frame_rate: f64, base_buffer_size: usize) -> usize {
    let factor = (frame_rate / 10.0).clamp(0.5, 2.0);
    ((factor * base_buffer_size as f64).round() as usize).max(1)
}

/// Periodic radius retune from observed metrics.
///
/// Returns the new radius, or `None` when no change is warranted:
/// - latency EMA above the frame budget with an unhealthy buffer shrinks
///   the radius by a quarter (floor 1), concentrating loads near the
///   cursor;
/// - a healthy buffer with latency comfortably under budget grows the
///   radius one step back toward the frame-rate target.
///
/// The radius never exceeds `2 * buffer_size`.
pub fn retune(
    metrics: &PerformanceMetrics,
    frame_rate: f64,
    speed: f64,
    current_radius: usize,
    buffer_size: usize,
) -> Option<usize> {
    let budget_ms = 1000.0 / (frame_rate * speed).max(f64::EPSILON);
    let max_radius = buffer_size * 2;

    if metrics.loading_latency_ms > budget_ms && metrics.buffer_health < UNHEALTHY_THRESHOLD {
        let shrunk = (current_radius * SHRINK_NUMERATOR / SHRINK_DENOMINATOR).max(1);
        return (shrunk != current_radius).then_some(shrunk);
    }

    if metrics.buffer_health >= HEALTHY_THRESHOLD
        && metrics.loading_latency_ms < budget_ms / 2.0
        && current_radius < radius_for_frame_rate(frame_rate, buffer_size).min(max_radius)
    {
        return Some(current_radius + 1);
    }

    None
}
