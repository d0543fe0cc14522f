//! Slice loader adapter
//!
//! Wraps the host-provided load capability with a bounded concurrency
//! gate, a per-call deadline, and latency measurement. The engine never
//! sees pixel data; a load either resolves (slice ready in the host
//! cache) or rejects.

use cine_common::{BoxError, Error, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::debug;

/// Host-provided slice load capability (injected dependency).
///
/// Resolves once the pixel data for `index` has been fetched and decoded
/// into the host's cache. Content is opaque to the engine; only
/// resolve/reject and latency are observed.
pub trait SliceLoader: Send + Sync {
    fn load_slice_data(&self, index: usize) -> BoxFuture<'_, std::result::Result<(), BoxError>>;
}

/// Bounded-concurrency load gate.
///
/// At most `max_concurrent` loads are in flight at once; further callers
/// wait for a permit. The gate is not fair - order among waiters is
/// unspecified.
pub struct LoadGate {
    loader: Arc<dyn SliceLoader>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl LoadGate {
    pub fn new(loader: Arc<dyn SliceLoader>, max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            loader,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            timeout,
        }
    }

    /// Load one slice through the gate.
    ///
    /// Returns the observed load latency (measured from dispatch, after a
    /// permit is held, so gate queueing does not distort the sample).
    pub async fn load(&self, index: usize) -> Result<Duration> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Internal("load gate semaphore closed".into()))?;

        debug!("dispatching load for slice {}", index);
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.loader.load_slice_data(index)).await {
            Ok(Ok(())) => Ok(started.elapsed()),
            Ok(Err(source)) => Err(Error::SliceLoad { index, source }),
            Err(_) => Err(Error::LoadTimeout {
                index,
                timeout: self.timeout,
            }),
        }
    }

    /// Free gate slots (diagnostics)
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}
