//! Prefetch planner
//!
//! Turns cursor position, play direction, and preload radius into a
//! priority-ordered list of slice indices to load. Direction matters: the
//! slice the cursor will hit next is always worth more than the slice it
//! just left.

use crate::buffer::BufferIndex;
use crate::state::PlayDirection;

/// Priority-ordered prefetch candidates around `center`.
///
/// The center slice comes first, then for each ring `r = 1..=radius` the
/// index ahead of the play direction before the one behind it. Indices
/// outside `[0, total)` and already-buffered indices are excluded.
pub fn plan(
    center: usize,
    radius: usize,
    direction: PlayDirection,
    total: usize,
    buffered: &BufferIndex,
) -> Vec<usize> {
    if total == 0 {
        return Vec::new();
    }

    let center = center as i64;
    let total = total as i64;
    let mut out = Vec::with_capacity(2 * radius + 1);
    let mut push = |candidate: i64| {
        if candidate >= 0 && candidate < total && !buffered.contains(candidate as usize) {
            out.push(candidate as usize);
        }
    };

    push(center);
    for r in 1..=radius as i64 {
        let (ahead, behind) = match direction {
            PlayDirection::Forward => (center + r, center - r),
            PlayDirection::Backward => (center - r, center + r),
        };
        push(ahead);
        push(behind);
    }

    out
}

/// Missing in-window indices sorted by distance from the cursor,
/// nearest first; ties break ahead-of-direction first.
///
/// Feeds `ensure_buffer_health`, which wants the loads most likely to be
/// displayed soonest at the front of the batch.
pub fn nearest_missing(
    current: usize,
    radius: usize,
    direction: PlayDirection,
    total: usize,
    buffered: &BufferIndex,
) -> Vec<usize> {
    let mut missing = buffered.status(current, radius, total).missing;
    missing.sort_by_key(|&index| {
        let ahead = match direction {
            PlayDirection::Forward => index > current,
            PlayDirection::Backward => index < current,
        };
        (index.abs_diff(current), !ahead)
    });
    missing
}
