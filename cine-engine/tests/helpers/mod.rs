//! Shared test fixtures for the engine integration tests

// Not every test crate uses every fixture.
#![allow(dead_code)]

use cine_common::BoxError;
use cine_engine::{CineEngine, EngineConfig, SliceLoader};
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Configurable mock loader: per-call delay, failure injection, and
/// in-flight concurrency tracking.
pub struct MockLoader {
    delay: Duration,
    fail_indices: Mutex<HashSet<usize>>,
    load_count: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockLoader {
    pub fn instant() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            fail_indices: Mutex::new(HashSet::new()),
            load_count: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Make loads of `index` fail until cleared
    pub fn fail_on(&self, index: usize) {
        self.fail_indices.lock().unwrap().insert(index);
    }

    pub fn clear_failures(&self) {
        self.fail_indices.lock().unwrap().clear();
    }

    /// Total load attempts (including failures)
    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }

    /// Highest concurrent in-flight load count observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl SliceLoader for MockLoader {
    fn load_slice_data(&self, index: usize) -> BoxFuture<'_, Result<(), BoxError>> {
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.load_count.fetch_add(1, Ordering::SeqCst);

            if self.fail_indices.lock().unwrap().contains(&index) {
                return Err(anyhow::anyhow!("simulated load failure for slice {index}").into());
            }
            Ok(())
        })
    }
}

/// Engine over the given loader and config
pub fn engine_with(loader: Arc<MockLoader>, config: EngineConfig) -> CineEngine {
    CineEngine::new(config, loader).unwrap()
}

/// Engine over an instant loader with default config
pub fn instant_engine() -> CineEngine {
    engine_with(Arc::new(MockLoader::instant()), EngineConfig::default())
}

/// Compact config for buffering tests: small window, tight gate
pub fn small_config() -> EngineConfig {
    EngineConfig {
        buffer_size: 6,
        preload_radius: 2,
        max_concurrent_loads: 2,
        ..Default::default()
    }
}

/// Install a test tracing subscriber once
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}
