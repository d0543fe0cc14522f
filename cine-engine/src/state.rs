//! Playback state model and the direction/loop advance policy

use serde::{Deserialize, Serialize};

/// Cine playback direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayDirection {
    Forward,
    Backward,
}

impl PlayDirection {
    pub fn reversed(self) -> Self {
        match self {
            PlayDirection::Forward => PlayDirection::Backward,
            PlayDirection::Backward => PlayDirection::Forward,
        }
    }
}

impl std::fmt::Display for PlayDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayDirection::Forward => write!(f, "forward"),
            PlayDirection::Backward => write!(f, "backward"),
        }
    }
}

/// Behavior at sequence boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Stop at the end of the sequence
    None,
    /// Wrap around to the opposite end
    Loop,
    /// Reverse direction at each end
    Bounce,
}

impl std::fmt::Display for LoopMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopMode::None => write!(f, "none"),
            LoopMode::Loop => write!(f, "loop"),
            LoopMode::Bounce => write!(f, "bounce"),
        }
    }
}

/// Compute the next cursor position.
///
/// Returns the next index together with the direction that applies from
/// that frame on (changed only by a bounce), or `None` when the end of the
/// sequence is reached with `LoopMode::None`.
///
/// Bounce skips the boundary slice on reversal (`total - 2` going forward,
/// `1` going backward) so the same frame is not displayed twice. For a
/// single-slice series those expressions are degenerate; the cursor is
/// clamped to 0 and only the direction flips.
pub fn advance(
    current: usize,
    total: usize,
    direction: PlayDirection,
    loop_mode: LoopMode,
) -> Option<(usize, PlayDirection)> {
    if total == 0 {
        return None;
    }

    match direction {
        PlayDirection::Forward => {
            let next = current + 1;
            if next < total {
                return Some((next, direction));
            }
            match loop_mode {
                LoopMode::Loop => Some((0, direction)),
                LoopMode::Bounce => {
                    let next = if total >= 2 { total - 2 } else { 0 };
                    Some((next, PlayDirection::Backward))
                }
                LoopMode::None => None,
            }
        }
        PlayDirection::Backward => {
            if current > 0 {
                return Some((current - 1, direction));
            }
            match loop_mode {
                LoopMode::Loop => Some((total - 1, direction)),
                LoopMode::Bounce => Some((1.min(total - 1), PlayDirection::Forward)),
                LoopMode::None => None,
            }
        }
    }
}

/// Point-in-time snapshot of the full playback state
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    pub current_slice: usize,
    pub total_slices: usize,
    pub frame_rate: f64,
    pub play_direction: PlayDirection,
    pub loop_mode: LoopMode,
    pub speed: f64,
    /// Sorted buffered indices
    pub buffered_slices: Vec<usize>,
    /// Buffer health over the preload window, scaled to 0..100
    pub preload_progress: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use LoopMode::*;
    use PlayDirection::*;

    #[test]
    fn test_forward_interior_advance() {
        assert_eq!(advance(3, 10, Forward, None), Some((4, Forward)));
        assert_eq!(advance(0, 10, Forward, Bounce), Some((1, Forward)));
    }

    #[test]
    fn test_backward_interior_advance() {
        assert_eq!(advance(3, 10, Backward, None), Some((2, Backward)));
    }

    #[test]
    fn test_forward_end_loop_wraps() {
        assert_eq!(advance(9, 10, Forward, Loop), Some((0, Forward)));
    }

    #[test]
    fn test_forward_end_none_signals_end() {
        assert_eq!(advance(9, 10, Forward, None), Option::None);
    }

    #[test]
    fn test_forward_end_bounce_skips_boundary() {
        assert_eq!(advance(9, 10, Forward, Bounce), Some((8, Backward)));
    }

    #[test]
    fn test_backward_start_loop_wraps() {
        assert_eq!(advance(0, 10, Backward, Loop), Some((9, Backward)));
    }

    #[test]
    fn test_backward_start_none_signals_end() {
        assert_eq!(advance(0, 10, Backward, None), Option::None);
    }

    #[test]
    fn test_backward_start_bounce_skips_boundary() {
        assert_eq!(advance(0, 10, Backward, Bounce), Some((1, Forward)));
    }

    #[test]
    fn test_bounce_two_slice_series() {
        assert_eq!(advance(1, 2, Forward, Bounce), Some((0, Backward)));
        assert_eq!(advance(0, 2, Backward, Bounce), Some((1, Forward)));
    }

    #[test]
    fn test_bounce_single_slice_stays_in_range() {
        assert_eq!(advance(0, 1, Forward, Bounce), Some((0, Backward)));
        assert_eq!(advance(0, 1, Backward, Bounce), Some((0, Forward)));
    }

    #[test]
    fn test_loop_single_slice() {
        assert_eq!(advance(0, 1, Forward, Loop), Some((0, Forward)));
        assert_eq!(advance(0, 1, Backward, Loop), Some((0, Backward)));
    }

    #[test]
    fn test_empty_series_never_advances() {
        assert_eq!(advance(0, 0, Forward, Loop), Option::None);
        assert_eq!(advance(0, 0, Backward, Bounce), Option::None);
    }

    #[test]
    fn test_direction_reversal() {
        assert_eq!(Forward.reversed(), Backward);
        assert_eq!(Backward.reversed(), Forward);
    }
}
