use uuid::Uuid;

use super::query::PaginationError;
use crate::utils::IsTransient;

// ============================================================================
// Event Store Errors
// ============================================================================
//
// None of these are retried inside the engine. Callers decide.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    #[error("Concurrency conflict on stream {stream_id}: expected version {expected}, but current is {actual}")]
    VersionConflict {
        stream_id: Uuid,
        expected: i64,
        actual: i64,
    },

    #[error("Could not acquire write lock for stream {stream_id} within {waited_ms} ms")]
    LockUnavailable { stream_id: Uuid, waited_ms: u64 },

    #[error("Stream not found: {0}")]
    StreamNotFound(Uuid),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(Uuid),

    /// A payload of another entity reached a fold. Indicates a producer bug.
    #[error("Event {event_type} is not valid for {entity} stream {stream_id}")]
    UnknownEventForEntity {
        stream_id: Uuid,
        entity: String,
        event_type: String,
    },

    #[error("Event {event_type} at version {version} cannot be applied to stream {stream_id}: {reason}")]
    InvalidEventSequence {
        stream_id: Uuid,
        version: i64,
        event_type: String,
        reason: String,
    },

    #[error("Stream {stream_id} holds {actual} entities, not {expected}")]
    StreamTypeMismatch {
        stream_id: Uuid,
        expected: String,
        actual: String,
    },

    #[error("Cannot append empty event list")]
    EmptyAppend,

    #[error("No events to load")]
    EmptyHistory,

    #[error(transparent)]
    InvalidPagination(#[from] PaginationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl EventStoreError {
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, EventStoreError::VersionConflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EventStoreError::StreamNotFound(_) | EventStoreError::SnapshotNotFound(_)
        )
    }
}

/// Only a lost optimistic race is worth another attempt with fresh state.
impl IsTransient for EventStoreError {
    fn is_transient(&self) -> bool {
        self.is_version_conflict()
    }
}

pub type StoreResult<T> = Result<T, EventStoreError>;
