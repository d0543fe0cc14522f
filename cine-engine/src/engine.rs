//! Cine engine orchestration
//!
//! Coordinates the playback state machine, buffer index, prefetch planner,
//! load gate, and metrics into the surface consumed by the host viewer.
//!
//! Concurrency model: state lives behind `tokio::sync::RwLock`s that are
//! never held across a loader await, so suspension points exist only
//! inside slice loads. Concurrent navigations interleave at those awaits
//! and the last resolving write wins; callers get weak consistency, not
//! ordering. Locks are always taken state -> buffer -> metrics.

use crate::adaptive;
use crate::buffer::{BufferIndex, BufferStatus};
use crate::config::{EngineConfig, FRAME_RATE_MAX, FRAME_RATE_MIN, SPEED_MAX, SPEED_MIN};
use crate::loader::{LoadGate, SliceLoader};
use crate::metrics::{MetricsTracker, PERFORMANCE_SAMPLE_INTERVAL};
use crate::planner;
use crate::state::{advance, LoopMode, PlayDirection, PlaybackSnapshot};
use chrono::Utc;
use cine_common::{EventBus, EventKind, ListenerHandle, PerformanceMetrics, PlaybackEvent, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Mutable playback state owned by the engine
struct EngineState {
    is_playing: bool,
    current_slice: usize,
    total_slices: usize,
    frame_rate: f64,
    play_direction: PlayDirection,
    loop_mode: LoopMode,
    speed: f64,
    /// Current (possibly retuned) prefetch radius
    preload_radius: usize,
}

/// Cine playback and buffering engine
///
/// One instance per viewer session, constructed with the host's slice
/// load capability injected. All internals are `Arc`-shared so background
/// buffering tasks can hold their own handles.
pub struct CineEngine {
    config: EngineConfig,
    state: Arc<RwLock<EngineState>>,
    buffer: Arc<RwLock<BufferIndex>>,
    metrics: Arc<RwLock<MetricsTracker>>,
    gate: Arc<LoadGate>,
    events: Arc<EventBus>,
    /// Set once the initial buffer target has been reached (or trivially
    /// met); `start_playback` stops awaiting fills after that.
    buffer_target_reached: Arc<AtomicBool>,
    /// Suppresses background buffering while the initial fill is draining
    initial_fill_in_progress: Arc<AtomicBool>,
}

impl CineEngine {
    /// Create an engine from a validated config and a loader capability
    pub fn new(config: EngineConfig, loader: Arc<dyn SliceLoader>) -> Result<Self> {
        let config = config.validated()?;
        info!(
            "Creating cine engine (buffer target {}, radius {}, {} concurrent loads)",
            config.buffer_size, config.preload_radius, config.max_concurrent_loads
        );

        let gate = LoadGate::new(
            loader,
            config.max_concurrent_loads,
            config.load_timeout(),
        );

        Ok(Self {
            state: Arc::new(RwLock::new(EngineState {
                is_playing: false,
                current_slice: 0,
                total_slices: 0,
                frame_rate: config.default_frame_rate,
                play_direction: PlayDirection::Forward,
                loop_mode: LoopMode::Loop,
                speed: 1.0,
                preload_radius: config.preload_radius,
            })),
            buffer: Arc::new(RwLock::new(BufferIndex::new())),
            metrics: Arc::new(RwLock::new(MetricsTracker::new())),
            gate: Arc::new(gate),
            events: Arc::new(EventBus::new(100)),
            buffer_target_reached: Arc::new(AtomicBool::new(false)),
            initial_fill_in_progress: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    /// Prepare the engine for a study.
    ///
    /// Resets the buffered set and metrics, clamps `start_slice` into
    /// range, and awaits the initial fill around it. The fill is
    /// best-effort: individual load failures degrade buffer health but do
    /// not fail initialization. `total_slices == 0` is the degenerate
    /// empty-series case and resolves immediately.
    ///
    /// Not reentrant: a second call while one is in flight is undefined
    /// behavior. Callers must serialize initialization.
    pub async fn initialize_for_study(&self, total_slices: usize, start_slice: usize) -> Result<()> {
        let start = if total_slices == 0 {
            0
        } else {
            start_slice.min(total_slices - 1)
        };
        info!("Initializing study: {} slices, starting at {}", total_slices, start);

        {
            let mut st = self.state.write().await;
            st.is_playing = false;
            st.total_slices = total_slices;
            st.current_slice = start;
            st.preload_radius = self.config.preload_radius;
        }
        self.buffer.write().await.clear();
        self.metrics.write().await.reset();
        self.buffer_target_reached.store(false, Ordering::SeqCst);

        if total_slices == 0 {
            self.buffer_target_reached.store(true, Ordering::SeqCst);
            return Ok(());
        }

        self.initial_fill_in_progress.store(true, Ordering::SeqCst);
        self.start_buffering(start).await;
        self.initial_fill_in_progress.store(false, Ordering::SeqCst);
        self.buffer_target_reached.store(true, Ordering::SeqCst);
        self.emit_buffer_update().await;
        Ok(())
    }

    /// Start cine playback. No-op when already playing.
    ///
    /// If the buffer target has never been reached, awaits
    /// [`ensure_buffer_health`](Self::ensure_buffer_health) before
    /// returning, so the first frames have material to show.
    pub async fn start_playback(&self) {
        {
            let mut st = self.state.write().await;
            if st.is_playing {
                return;
            }
            st.is_playing = true;
        }
        self.metrics.write().await.reset_frame_timing();

        if !self.buffer_target_reached.load(Ordering::SeqCst) {
            self.ensure_buffer_health().await;
            self.buffer_target_reached.store(true, Ordering::SeqCst);
        }

        let frame_rate = self.state.read().await.frame_rate;
        info!("Playback started at {} fps", frame_rate);
        self.events.emit(PlaybackEvent::Play {
            frame_rate,
            timestamp: Utc::now(),
        });
    }

    /// Pause playback. No-op (no event) when not playing.
    pub async fn pause_playback(&self) {
        let current = {
            let mut st = self.state.write().await;
            if !st.is_playing {
                return;
            }
            st.is_playing = false;
            st.current_slice
        };
        info!("Playback paused at slice {}", current);
        self.events.emit(PlaybackEvent::Pause {
            current_slice: current,
            timestamp: Utc::now(),
        });
    }

    /// Stop playback and reset the cursor to slice 0, unconditionally.
    ///
    /// The buffer survives a stop; only [`cleanup`](Self::cleanup) clears
    /// it.
    pub async fn stop_playback(&self) {
        {
            let mut st = self.state.write().await;
            st.is_playing = false;
            st.current_slice = 0;
        }
        info!("Playback stopped");
        self.events.emit(PlaybackEvent::Stop {
            timestamp: Utc::now(),
        });
    }

    /// Navigate to a specific slice.
    ///
    /// Out-of-range targets are rejected (`false`, no state change). A
    /// buffer miss counts one dropped frame and awaits a load of exactly
    /// that slice; a failed load leaves the cursor unchanged and returns
    /// `false`. On success the cursor moves, frame timing is recorded,
    /// background buffering re-plans around the new position, and a
    /// `slice_change` event fires.
    pub async fn go_to_slice(&self, index: usize) -> bool {
        let total = self.state.read().await.total_slices;
        if index >= total {
            debug!("rejecting navigation to slice {} (total {})", index, total);
            return false;
        }

        let was_buffered = self.buffer.read().await.contains(index);
        if !was_buffered {
            self.metrics.write().await.record_dropped();
            if !self.load_and_index(index).await {
                return false;
            }
        }

        let previous = {
            let mut st = self.state.write().await;
            std::mem::replace(&mut st.current_slice, index)
        };
        let (frame_time_ms, frame_count) =
            self.metrics.write().await.record_frame(Instant::now());

        if self.config.adaptive_buffering {
            self.spawn_background_buffer(index);
        }

        self.events.emit(PlaybackEvent::SliceChange {
            previous_slice: previous,
            current_slice: index,
            frame_time_ms,
            is_buffered: was_buffered,
            timestamp: Utc::now(),
        });

        if frame_count % PERFORMANCE_SAMPLE_INTERVAL == 0 {
            self.emit_performance_update().await;
        }

        true
    }

    /// Advance one frame along the current direction/loop policy.
    ///
    /// Returns `false` at the end of the sequence with `LoopMode::None`
    /// (cursor unmoved); the host render loop treats that as its signal to
    /// pause. A bounce boundary flips the direction before navigating.
    pub async fn next_frame(&self) -> bool {
        let step = {
            let st = self.state.read().await;
            advance(st.current_slice, st.total_slices, st.play_direction, st.loop_mode)
        };

        let Some((next, direction)) = step else {
            debug!("end of sequence reached");
            return false;
        };

        {
            let mut st = self.state.write().await;
            if st.play_direction != direction {
                debug!("bounce: direction now {}", direction);
                st.play_direction = direction;
            }
        }

        self.go_to_slice(next).await
    }

    /// Set the cine frame rate, clamped to `[1, 60]` fps.
    ///
    /// With adaptive buffering on, the preload radius rescales
    /// proportionally so faster playback looks further ahead.
    pub async fn set_frame_rate(&self, rate: f64) {
        let clamped = rate.clamp(FRAME_RATE_MIN, FRAME_RATE_MAX);
        let mut st = self.state.write().await;
        st.frame_rate = clamped;
        if self.config.adaptive_buffering {
            st.preload_radius = adaptive::radius_for_frame_rate(clamped, self.config.buffer_size);
            debug!("frame rate {} fps, preload radius {}", clamped, st.preload_radius);
        }
    }

    /// Set the playback speed multiplier, clamped to `[0.1, 5.0]`.
    pub async fn set_speed(&self, speed: f64) {
        self.state.write().await.speed = speed.clamp(SPEED_MIN, SPEED_MAX);
    }

    /// Set the play direction and re-plan buffering around the cursor
    /// (direction decides prefetch priority).
    pub async fn set_play_direction(&self, direction: PlayDirection) {
        let current = {
            let mut st = self.state.write().await;
            st.play_direction = direction;
            st.current_slice
        };
        if self.config.adaptive_buffering {
            self.spawn_background_buffer(current);
        }
    }

    /// Set the loop mode. Takes effect on the next frame advance.
    pub async fn set_loop_mode(&self, mode: LoopMode) {
        self.state.write().await.loop_mode = mode;
    }

    /// Snapshot of the full playback state
    pub async fn get_state(&self) -> PlaybackSnapshot {
        let st = self.state.read().await;
        let buf = self.buffer.read().await;
        let health = buf.health(st.current_slice, st.preload_radius, st.total_slices);
        PlaybackSnapshot {
            is_playing: st.is_playing,
            current_slice: st.current_slice,
            total_slices: st.total_slices,
            frame_rate: st.frame_rate,
            play_direction: st.play_direction,
            loop_mode: st.loop_mode,
            speed: st.speed,
            buffered_slices: buf.sorted(),
            preload_progress: health * 100.0,
        }
    }

    /// Current rolling performance metrics
    pub async fn get_metrics(&self) -> PerformanceMetrics {
        let st = self.state.read().await;
        let buf = self.buffer.read().await;
        let health = buf.health(st.current_slice, st.preload_radius, st.total_slices);
        self.metrics
            .read()
            .await
            .snapshot(health, self.config.enable_smoothing)
    }

    /// Pure membership check
    pub async fn is_slice_buffered(&self, index: usize) -> bool {
        self.buffer.read().await.contains(index)
    }

    /// Buffered/missing partition of the current preload window
    pub async fn get_buffer_status(&self) -> BufferStatus {
        let st = self.state.read().await;
        let buf = self.buffer.read().await;
        buf.status(st.current_slice, st.preload_radius, st.total_slices)
    }

    /// Register a listener for one event kind
    pub fn add_event_listener<F>(&self, kind: EventKind, callback: F) -> ListenerHandle
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        self.events.add_listener(kind, callback)
    }

    /// Remove a listener by its registration handle
    pub fn remove_event_listener(&self, kind: EventKind, handle: ListenerHandle) -> bool {
        self.events.remove_listener(kind, handle)
    }

    /// Subscribe to the full event stream (telemetry firehose)
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Synchronously (awaited) restore the preload window.
    ///
    /// Loads every missing in-window slice, nearest to the cursor first,
    /// through the bounded gate. Failures are logged and skipped.
    pub async fn ensure_buffer_health(&self) {
        let (current, radius, direction, total) = {
            let st = self.state.read().await;
            (st.current_slice, st.preload_radius, st.play_direction, st.total_slices)
        };
        let picks = {
            let buf = self.buffer.read().await;
            planner::nearest_missing(current, radius, direction, total, &buf)
        };
        if picks.is_empty() {
            return;
        }
        debug!("restoring buffer health: {} missing slices", picks.len());
        let loads = picks.into_iter().map(|index| self.load_and_index(index));
        futures::future::join_all(loads).await;
    }

    /// Tear the engine down: stop playback, clear the buffer, drop all
    /// listeners.
    pub async fn cleanup(&self) {
        self.state.write().await.is_playing = false;
        self.buffer.write().await.clear();
        self.events.clear();
        info!("Engine cleaned up");
    }

    /// Initial best-effort fill around `center`.
    ///
    /// All planned loads run through the gate; failures do not abort the
    /// batch.
    async fn start_buffering(&self, center: usize) {
        let (radius, direction, total) = {
            let st = self.state.read().await;
            (st.preload_radius, st.play_direction, st.total_slices)
        };
        let candidates = {
            let buf = self.buffer.read().await;
            planner::plan(center, radius, direction, total, &buf)
        };
        if candidates.is_empty() {
            return;
        }
        info!("initial fill: {} slices around {}", candidates.len(), center);
        let loads = candidates.into_iter().map(|index| self.load_and_index(index));
        futures::future::join_all(loads).await;
    }

    /// Fire-and-forget re-plan after navigation
    fn spawn_background_buffer(&self, center: usize) {
        if self.initial_fill_in_progress.load(Ordering::SeqCst) {
            return;
        }
        let engine = self.clone_handles();
        tokio::spawn(async move {
            engine.background_buffer(center).await;
        });
    }

    /// Top up the window when it has drifted too far from target.
    ///
    /// Dispatches at most `max_concurrent_loads` of the planner's
    /// highest-priority missing slices, and only when more than 30% of the
    /// buffer target is missing.
    async fn background_buffer(&self, center: usize) {
        if self.initial_fill_in_progress.load(Ordering::SeqCst) {
            return;
        }
        let (radius, direction, total) = {
            let st = self.state.read().await;
            (st.preload_radius, st.play_direction, st.total_slices)
        };
        let (missing_count, picks) = {
            let buf = self.buffer.read().await;
            let missing_count = buf.status(center, radius, total).missing.len();
            let picks: Vec<usize> = planner::plan(center, radius, direction, total, &buf)
                .into_iter()
                .take(self.config.max_concurrent_loads)
                .collect();
            (missing_count, picks)
        };
        if missing_count as f64 <= self.config.buffer_size as f64 * 0.3 {
            return;
        }
        debug!(
            "background buffering: {} missing, dispatching {}",
            missing_count,
            picks.len()
        );
        let loads = picks.into_iter().map(|index| self.load_and_index(index));
        futures::future::join_all(loads).await;
    }

    /// Load one slice through the gate and index it on success.
    ///
    /// Skips already-buffered slices. A load abandoned by its navigation
    /// still completes and populates the buffer. Failures are recorded and
    /// logged; the buffer is left unchanged.
    async fn load_and_index(&self, index: usize) -> bool {
        if self.buffer.read().await.contains(index) {
            return true;
        }
        match self.gate.load(index).await {
            Ok(latency) => {
                self.buffer.write().await.insert(index);
                self.metrics
                    .write()
                    .await
                    .record_latency(latency.as_secs_f64() * 1000.0);
                self.emit_buffer_update().await;
                true
            }
            Err(e) => {
                self.buffer.write().await.record_failure();
                warn!("slice {} load failed: {}", index, e);
                false
            }
        }
    }

    async fn emit_buffer_update(&self) {
        let st = self.state.read().await;
        let buf = self.buffer.read().await;
        let health = buf.health(st.current_slice, st.preload_radius, st.total_slices);
        self.events.emit(PlaybackEvent::BufferUpdate {
            buffered_count: buf.len(),
            buffer_health: health,
            preload_progress: health * 100.0,
            timestamp: Utc::now(),
        });
    }

    /// Emit a metrics sample and let the adaptive controller retune the
    /// radius from it.
    async fn emit_performance_update(&self) {
        let metrics = self.get_metrics().await;
        self.events.emit(PlaybackEvent::PerformanceUpdate {
            metrics,
            timestamp: Utc::now(),
        });

        if self.config.adaptive_buffering {
            let (frame_rate, speed, radius) = {
                let st = self.state.read().await;
                (st.frame_rate, st.speed, st.preload_radius)
            };
            if let Some(new_radius) =
                adaptive::retune(&metrics, frame_rate, speed, radius, self.config.buffer_size)
            {
                debug!("adaptive retune: preload radius {} -> {}", radius, new_radius);
                self.state.write().await.preload_radius = new_radius;
            }
        }
    }

    /// Clone handles for background tasks
    fn clone_handles(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            buffer: Arc::clone(&self.buffer),
            metrics: Arc::clone(&self.metrics),
            gate: Arc::clone(&self.gate),
            events: Arc::clone(&self.events),
            buffer_target_reached: Arc::clone(&self.buffer_target_reached),
            initial_fill_in_progress: Arc::clone(&self.initial_fill_in_progress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cine_common::BoxError;
    use futures::future::BoxFuture;

    /// Loader that resolves immediately
    struct InstantLoader;

    impl SliceLoader for InstantLoader {
        fn load_slice_data(
            &self,
            _index: usize,
        ) -> BoxFuture<'_, std::result::Result<(), BoxError>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn engine() -> CineEngine {
        CineEngine::new(EngineConfig::default(), Arc::new(InstantLoader)).unwrap()
    }

    #[tokio::test]
    async fn test_engine_creation_defaults() {
        let engine = engine();
        let state = engine.get_state().await;
        assert!(!state.is_playing);
        assert_eq!(state.total_slices, 0);
        assert_eq!(state.current_slice, 0);
        assert_eq!(state.frame_rate, 10.0);
        assert_eq!(state.speed, 1.0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = EngineConfig {
            max_concurrent_loads: 0,
            ..Default::default()
        };
        assert!(CineEngine::new(config, Arc::new(InstantLoader)).is_err());
    }

    #[tokio::test]
    async fn test_initialize_fills_around_start() {
        let engine = engine();
        engine.initialize_for_study(50, 25).await.unwrap();

        let state = engine.get_state().await;
        assert_eq!(state.total_slices, 50);
        assert_eq!(state.current_slice, 25);
        // Window of radius 5 around 25 fully buffered
        for i in 20..=30 {
            assert!(engine.is_slice_buffered(i).await, "slice {i} not buffered");
        }
        assert_eq!(state.preload_progress, 100.0);
    }

    #[tokio::test]
    async fn test_initialize_clamps_start_slice() {
        let engine = engine();
        engine.initialize_for_study(10, 500).await.unwrap();
        assert_eq!(engine.get_state().await.current_slice, 9);
    }

    #[tokio::test]
    async fn test_initialize_empty_series() {
        let engine = engine();
        engine.initialize_for_study(0, 3).await.unwrap();
        let state = engine.get_state().await;
        assert_eq!(state.total_slices, 0);
        assert_eq!(state.current_slice, 0);
        assert!(state.buffered_slices.is_empty());
    }

    #[tokio::test]
    async fn test_play_pause_stop_transitions() {
        let engine = engine();
        engine.initialize_for_study(10, 0).await.unwrap();

        engine.start_playback().await;
        assert!(engine.get_state().await.is_playing);

        engine.pause_playback().await;
        assert!(!engine.get_state().await.is_playing);

        engine.go_to_slice(5).await;
        engine.stop_playback().await;
        let state = engine.get_state().await;
        assert!(!state.is_playing);
        assert_eq!(state.current_slice, 0);
        // Stop does not clear the buffer
        assert!(!state.buffered_slices.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_clears_buffer_and_listeners() {
        let engine = engine();
        engine.initialize_for_study(10, 0).await.unwrap();
        engine.add_event_listener(EventKind::Play, |_| {});

        engine.cleanup().await;
        let state = engine.get_state().await;
        assert!(state.buffered_slices.is_empty());
        assert_eq!(engine.events.listener_count(), 0);
    }
}
