//! Event system for the cine playback engine
//!
//! The engine communicates with its host (UI bindings, telemetry) through
//! two complementary surfaces:
//!
//! - **Typed listeners** keyed by [`EventKind`]: `add_listener` returns an
//!   opaque [`ListenerHandle`] accepted by `remove_listener`. Callbacks run
//!   synchronously at emit time, each isolated so one faulty listener
//!   cannot break delivery to the others or abort the state transition
//!   that triggered the event.
//! - **Broadcast subscription** (`tokio::broadcast`): a lossy firehose of
//!   every event, for consumers that forward the stream wholesale
//!   (SSE bridges, telemetry). Slow subscribers lag; they never block the
//!   engine.
//!
//! Events are immutable values. They are never stored beyond dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::metrics::PerformanceMetrics;

/// Event categories a listener can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Play,
    Pause,
    Stop,
    SliceChange,
    BufferUpdate,
    PerformanceUpdate,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Play => write!(f, "play"),
            EventKind::Pause => write!(f, "pause"),
            EventKind::Stop => write!(f, "stop"),
            EventKind::SliceChange => write!(f, "slice_change"),
            EventKind::BufferUpdate => write!(f, "buffer_update"),
            EventKind::PerformanceUpdate => write!(f, "performance_update"),
        }
    }
}

/// Playback event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackEvent {
    /// Playback started
    Play {
        frame_rate: f64,
        timestamp: DateTime<Utc>,
    },

    /// Playback paused
    Pause {
        current_slice: usize,
        timestamp: DateTime<Utc>,
    },

    /// Playback stopped; cursor reset to the first slice
    Stop { timestamp: DateTime<Utc> },

    /// The displayed slice changed
    SliceChange {
        previous_slice: usize,
        current_slice: usize,
        /// Time since the previous slice change (ms)
        frame_time_ms: f64,
        /// Whether the target was already buffered when requested
        is_buffered: bool,
        timestamp: DateTime<Utc>,
    },

    /// Buffer membership changed
    BufferUpdate {
        buffered_count: usize,
        buffer_health: f64,
        preload_progress: f64,
        timestamp: DateTime<Utc>,
    },

    /// Periodic metrics sample
    PerformanceUpdate {
        metrics: PerformanceMetrics,
        timestamp: DateTime<Utc>,
    },
}

impl PlaybackEvent {
    /// The kind used for listener dispatch
    pub fn kind(&self) -> EventKind {
        match self {
            PlaybackEvent::Play { .. } => EventKind::Play,
            PlaybackEvent::Pause { .. } => EventKind::Pause,
            PlaybackEvent::Stop { .. } => EventKind::Stop,
            PlaybackEvent::SliceChange { .. } => EventKind::SliceChange,
            PlaybackEvent::BufferUpdate { .. } => EventKind::BufferUpdate,
            PlaybackEvent::PerformanceUpdate { .. } => EventKind::PerformanceUpdate,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            PlaybackEvent::Play { timestamp, .. }
            | PlaybackEvent::Pause { timestamp, .. }
            | PlaybackEvent::Stop { timestamp }
            | PlaybackEvent::SliceChange { timestamp, .. }
            | PlaybackEvent::BufferUpdate { timestamp, .. }
            | PlaybackEvent::PerformanceUpdate { timestamp, .. } => *timestamp,
        }
    }
}

/// Opaque registration handle returned by `add_listener`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(Uuid);

type ListenerFn = dyn Fn(&PlaybackEvent) + Send + Sync;

/// Typed publish/subscribe bus keyed by event kind
///
/// Listener callbacks are dispatched outside the registry lock, so a
/// callback may itself register or remove listeners without deadlocking.
/// Removal during emit takes effect on the next emit.
pub struct EventBus {
    listeners: Mutex<HashMap<EventKind, Vec<(ListenerHandle, Arc<ListenerFn>)>>>,
    tx: broadcast::Sender<PlaybackEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus whose broadcast channel buffers `capacity` events
    /// before lagging slow subscribers.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            listeners: Mutex::new(HashMap::new()),
            tx,
            capacity,
        }
    }

    /// Register a callback for one event kind
    pub fn add_listener<F>(&self, kind: EventKind, callback: F) -> ListenerHandle
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        let handle = ListenerHandle(Uuid::new_v4());
        let mut listeners = self.listeners.lock().expect("listener registry poisoned");
        listeners
            .entry(kind)
            .or_default()
            .push((handle, Arc::new(callback)));
        handle
    }

    /// Remove a previously registered callback
    ///
    /// Returns false if the handle was not registered under `kind`.
    pub fn remove_listener(&self, kind: EventKind, handle: ListenerHandle) -> bool {
        let mut listeners = self.listeners.lock().expect("listener registry poisoned");
        if let Some(entries) = listeners.get_mut(&kind) {
            let before = entries.len();
            entries.retain(|(h, _)| *h != handle);
            return entries.len() != before;
        }
        false
    }

    /// Dispatch an event to keyed listeners, then to broadcast subscribers
    ///
    /// Each listener runs under panic isolation: a panicking callback is
    /// logged and skipped, and delivery continues with the next listener.
    /// Broadcast send errors (no subscribers) are ignored.
    pub fn emit(&self, event: PlaybackEvent) {
        let snapshot: Vec<Arc<ListenerFn>> = {
            let listeners = self.listeners.lock().expect("listener registry poisoned");
            listeners
                .get(&event.kind())
                .map(|entries| entries.iter().map(|(_, f)| Arc::clone(f)).collect())
                .unwrap_or_default()
        };

        for callback in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                warn!("listener for {} panicked; continuing dispatch", event.kind());
            }
        }

        let _ = self.tx.send(event);
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.tx.subscribe()
    }

    /// Number of broadcast subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Total keyed listeners across all kinds
    pub fn listener_count(&self) -> usize {
        let listeners = self.listeners.lock().expect("listener registry poisoned");
        listeners.values().map(Vec::len).sum()
    }

    /// Drop every keyed listener (engine cleanup)
    pub fn clear(&self) {
        self.listeners
            .lock()
            .expect("listener registry poisoned")
            .clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn stop_event() -> PlaybackEvent {
        PlaybackEvent::Stop {
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_add_emit_remove() {
        let bus = EventBus::new(16);
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        let handle = bus.add_listener(EventKind::Stop, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.listener_count(), 1);

        bus.emit(stop_event());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(bus.remove_listener(EventKind::Stop, handle));
        bus.emit(stop_event());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Second removal reports not-found
        assert!(!bus.remove_listener(EventKind::Stop, handle));
    }

    #[test]
    fn test_listener_only_sees_registered_kind() {
        let bus = EventBus::new(16);
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        bus.add_listener(EventKind::Play, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(stop_event());
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        bus.emit(PlaybackEvent::Play {
            frame_rate: 24.0,
            timestamp: Utc::now(),
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_break_delivery() {
        let bus = EventBus::new(16);
        let hits = Arc::new(AtomicUsize::new(0));

        bus.add_listener(EventKind::Stop, |_| panic!("faulty listener"));
        let hits_clone = Arc::clone(&hits);
        bus.add_listener(EventKind::Stop, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(stop_event());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broadcast_subscription() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(PlaybackEvent::Pause {
            current_slice: 4,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event {
            PlaybackEvent::Pause { current_slice, .. } => assert_eq!(current_slice, 4),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::new(16);
        bus.emit(stop_event());
    }

    #[test]
    fn test_clear_drops_all_listeners() {
        let bus = EventBus::new(16);
        bus.add_listener(EventKind::Play, |_| {});
        bus.add_listener(EventKind::Stop, |_| {});
        assert_eq!(bus.listener_count(), 2);

        bus.clear();
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = PlaybackEvent::SliceChange {
            previous_slice: 3,
            current_slice: 4,
            frame_time_ms: 41.7,
            is_buffered: true,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "slice_change");
        assert_eq!(json["previous_slice"], 3);
        assert_eq!(json["current_slice"], 4);
        assert_eq!(json["is_buffered"], true);
    }

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(stop_event().kind(), EventKind::Stop);
        assert_eq!(EventKind::SliceChange.to_string(), "slice_change");
        assert_eq!(EventKind::PerformanceUpdate.to_string(), "performance_update");
    }
}
