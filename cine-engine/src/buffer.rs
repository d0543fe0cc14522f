//! Buffer index
//!
//! Ground truth for "is slice N ready to display": a set of loaded slice
//! indices plus load bookkeeping. Pixel data itself lives in the host's
//! cache; the engine tracks membership only.

use serde::Serialize;
use std::collections::HashSet;

/// Preload window partition around the cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferStatus {
    /// In-window indices currently buffered, ascending
    pub buffered: Vec<usize>,
    /// In-window indices not yet buffered, ascending
    pub missing: Vec<usize>,
}

/// Set of currently-loaded slice indices
#[derive(Debug, Default)]
pub struct BufferIndex {
    slices: HashSet<usize>,
    loads_completed: u64,
    loads_failed: u64,
}

impl BufferIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.slices.contains(&index)
    }

    /// Record a completed load; returns false if already present
    pub fn insert(&mut self, index: usize) -> bool {
        let inserted = self.slices.insert(index);
        if inserted {
            self.loads_completed += 1;
        }
        inserted
    }

    pub fn record_failure(&mut self) {
        self.loads_failed += 1;
    }

    pub fn clear(&mut self) {
        self.slices.clear();
        self.loads_completed = 0;
        self.loads_failed = 0;
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn loads_completed(&self) -> u64 {
        self.loads_completed
    }

    pub fn loads_failed(&self) -> u64 {
        self.loads_failed
    }

    /// Buffered indices in ascending order (snapshots)
    pub fn sorted(&self) -> Vec<usize> {
        let mut out: Vec<usize> = self.slices.iter().copied().collect();
        out.sort_unstable();
        out
    }

    /// Partition the preload window `[current - radius, current + radius]`
    /// (clamped to `[0, total)`) by membership.
    pub fn status(&self, current: usize, radius: usize, total: usize) -> BufferStatus {
        let mut buffered = Vec::new();
        let mut missing = Vec::new();
        for index in window(current, radius, total) {
            if self.contains(index) {
                buffered.push(index);
            } else {
                missing.push(index);
            }
        }
        BufferStatus { buffered, missing }
    }

    /// Fraction of the target preload window currently buffered.
    ///
    /// The denominator is the full window size `2*radius + 1` even near
    /// sequence edges, so health saturates via the `min` rather than
    /// over-reporting on short windows.
    pub fn health(&self, current: usize, radius: usize, total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let in_window = window(current, radius, total)
            .filter(|&i| self.contains(i))
            .count();
        (in_window as f64 / (2 * radius + 1) as f64).min(1.0)
    }
}

/// Iterator over the clamped preload window
fn window(current: usize, radius: usize, total: usize) -> impl Iterator<Item = usize> {
    if total == 0 {
        return 0..0;
    }
    let start = current.saturating_sub(radius);
    let end = (current + radius).min(total - 1);
    start..end + 1
}
