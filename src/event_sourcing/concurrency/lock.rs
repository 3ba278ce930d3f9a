use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::event_sourcing::error::{EventStoreError, StoreResult};

// ============================================================================
// Exclusive Stream Leases
// ============================================================================
//
// Per-stream mutual exclusion for operations that read and append and must
// not interleave with another writer of the same stream. One lease per stream
// id, never a global lock, held for one logical operation.
//
// ============================================================================

/// Handed out by a provider; releasing it (explicitly or by drop) frees the stream.
pub struct StreamLease {
    stream_id: Uuid,
    acquired_at: Instant,
    _release: Box<dyn Any + Send + Sync>,
}

impl StreamLease {
    pub fn new(stream_id: Uuid, release: Box<dyn Any + Send + Sync>) -> Self {
        Self {
            stream_id,
            acquired_at: Instant::now(),
            _release: release,
        }
    }

    pub fn stream_id(&self) -> Uuid {
        self.stream_id
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    pub fn release(self) {
        tracing::debug!(
            stream_id = %self.stream_id,
            held_ms = self.held_for().as_millis() as u64,
            "Released stream lease"
        );
    }
}

impl std::fmt::Debug for StreamLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamLease")
            .field("stream_id", &self.stream_id)
            .field("held_for", &self.held_for())
            .finish()
    }
}

/// Source of per-stream leases (in-process table, distributed lease service, ...).
#[async_trait]
pub trait StreamLockProvider: Send + Sync {
    /// Wait at most `timeout` for the stream; `LockUnavailable` otherwise.
    async fn acquire(&self, stream_id: Uuid, timeout: Duration) -> StoreResult<StreamLease>;
}

// ============================================================================
// In-Process Implementation
// ============================================================================

type LockTable = Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>;

/// Keyed mutex table for a single process.
///
/// Entries are dropped once nobody holds or waits for them, so the table only
/// ever contains streams with an operation in flight.
#[derive(Default, Clone)]
pub struct InProcessStreamLocks {
    table: LockTable,
}

impl InProcessStreamLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of streams currently held or awaited
    pub fn active(&self) -> usize {
        self.table.lock().map(|table| table.len()).unwrap_or(0)
    }

    fn entry(&self, stream_id: Uuid) -> StoreResult<Arc<tokio::sync::Mutex<()>>> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| EventStoreError::Storage("stream lock table poisoned".to_string()))?;
        Ok(table.entry(stream_id).or_default().clone())
    }

    fn forget_if_idle(table: &LockTable, stream_id: Uuid, mutex: &Arc<tokio::sync::Mutex<()>>) {
        if let Ok(mut table) = table.lock() {
            // One reference in the table, one held by the caller
            if Arc::strong_count(mutex) <= 2 {
                table.remove(&stream_id);
            }
        }
    }
}

/// Guard kept inside a lease; unlocks, then prunes the table entry.
struct InProcessGuard {
    stream_id: Uuid,
    mutex: Arc<tokio::sync::Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    table: LockTable,
}

impl Drop for InProcessGuard {
    fn drop(&mut self) {
        self.guard.take();
        InProcessStreamLocks::forget_if_idle(&self.table, self.stream_id, &self.mutex);
    }
}

#[async_trait]
impl StreamLockProvider for InProcessStreamLocks {
    async fn acquire(&self, stream_id: Uuid, timeout: Duration) -> StoreResult<StreamLease> {
        let mutex = self.entry(stream_id)?;
        let started = Instant::now();

        match tokio::time::timeout(timeout, mutex.clone().lock_owned()).await {
            Ok(guard) => {
                tracing::debug!(
                    stream_id = %stream_id,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Acquired stream lease"
                );
                let release = InProcessGuard {
                    stream_id,
                    mutex,
                    guard: Some(guard),
                    table: self.table.clone(),
                };
                Ok(StreamLease::new(stream_id, Box::new(release)))
            }
            Err(_) => {
                Self::forget_if_idle(&self.table, stream_id, &mutex);
                tracing::warn!(
                    stream_id = %stream_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Stream lease unavailable"
                );
                Err(EventStoreError::LockUnavailable {
                    stream_id,
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
