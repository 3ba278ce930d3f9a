// ============================================================================
// Concurrency Control
// ============================================================================
//
// Optimistic mode lives in the storage backends (expected-version check at
// commit). Exclusive mode is a lease acquired before reading and held until
// the append commits.
//
// ============================================================================

pub mod lock;

pub use lock::{InProcessStreamLocks, StreamLease, StreamLockProvider};
