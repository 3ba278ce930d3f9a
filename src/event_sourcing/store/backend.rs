use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::event_sourcing::core::{EntityTag, EventEnvelope, EventPayload, NewEvent};
use crate::event_sourcing::error::{EventStoreError, StoreResult};
use crate::event_sourcing::projection::{AuditFilter, AuditRecord, Projector, Snapshot};
use crate::event_sourcing::query::{OrderBy, Page, PageRequest, SnapshotFilter};

// ============================================================================
// Storage Backend Contract - The Durability Boundary
// ============================================================================
//
// Every method is one atomic unit. In particular `append` writes the events,
// the stream header, the snapshot and the audit records together or not at
// all: a conflict, a fold error or a storage failure leaves nothing behind.
//
// ============================================================================

/// Version a writer expects the stream to be at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// No check; the next versions are assigned at commit
    Any,
    /// The stream must not exist yet
    NoStream,
    /// The stream must be exactly at this version
    Exact(i64),
}

impl ExpectedVersion {
    pub fn from_option(expected: Option<i64>) -> Self {
        match expected {
            None => ExpectedVersion::Any,
            Some(0) => ExpectedVersion::NoStream,
            Some(version) => ExpectedVersion::Exact(version),
        }
    }

    pub fn check(&self, stream_id: Uuid, current: i64) -> StoreResult<()> {
        let expected = match self {
            ExpectedVersion::Any => return Ok(()),
            ExpectedVersion::NoStream => 0,
            ExpectedVersion::Exact(version) => *version,
        };
        if expected != current {
            return Err(EventStoreError::VersionConflict {
                stream_id,
                expected,
                actual: current,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(bound = "")]
pub struct StreamHeader<E: EntityTag> {
    pub stream_id: Uuid,
    pub entity: E,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<E: EntityTag> StreamHeader<E> {
    /// Fail unless the stream holds `expected` entities
    pub fn ensure_entity(&self, expected: E) -> StoreResult<()> {
        if self.entity != expected {
            return Err(EventStoreError::StreamTypeMismatch {
                stream_id: self.stream_id,
                expected: expected.to_string(),
                actual: self.entity.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AppendRequest<P: EventPayload> {
    pub stream_id: Uuid,
    pub entity: P::Entity,
    pub expected: ExpectedVersion,
    pub events: Vec<NewEvent<P>>,
}

/// Everything one append committed.
#[derive(Debug, Clone)]
pub struct AppendOutcome<P: EventPayload> {
    pub stream: StreamHeader<P::Entity>,
    pub events: Vec<EventEnvelope<P>>,
    pub snapshot: Snapshot<P::Entity>,
    pub audit: Vec<AuditRecord<P>>,
}

impl<P: EventPayload> AppendOutcome<P> {
    pub fn new_version(&self) -> i64 {
        self.stream.version
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(bound = "")]
pub struct ResetOutcome<E: EntityTag> {
    pub removed_streams: usize,
    pub preserved: Option<StreamHeader<E>>,
}

#[async_trait]
pub trait EventStorage<P: EventPayload>: Send + Sync {
    /// Append events and their projections atomically.
    async fn append(
        &self,
        request: AppendRequest<P>,
        projector: &dyn Projector<P>,
    ) -> StoreResult<AppendOutcome<P>>;

    async fn stream(&self, stream_id: Uuid) -> StoreResult<Option<StreamHeader<P::Entity>>>;

    async fn list_streams(&self, entity: Option<P::Entity>) -> StoreResult<Vec<StreamHeader<P::Entity>>>;

    /// Events with version greater than `since_version`, ascending.
    async fn fetch(&self, stream_id: Uuid, since_version: i64) -> StoreResult<Vec<EventEnvelope<P>>>;

    async fn load_snapshot(&self, stream_id: Uuid) -> StoreResult<Option<Snapshot<P::Entity>>>;

    async fn query_snapshots(
        &self,
        entity: P::Entity,
        filter: &SnapshotFilter,
        order: Option<&OrderBy>,
        page: PageRequest,
    ) -> StoreResult<Page<Snapshot<P::Entity>>>;

    /// Overwrite snapshots produced by a rebuild. A snapshot is only written
    /// while its stream is still at the snapshot's version; returns how many
    /// were written.
    async fn replace_snapshots(&self, snapshots: Vec<Snapshot<P::Entity>>) -> StoreResult<usize>;

    async fn query_audit(
        &self,
        filter: &AuditFilter<P::Module>,
        order: &OrderBy,
        page: PageRequest,
    ) -> StoreResult<Page<AuditRecord<P>>>;

    /// Highest stream version with an audit record (0 when none).
    async fn last_audited_version(&self, stream_id: Uuid) -> StoreResult<i64>;

    /// Insert audit records, skipping any whose (stream, version) is already
    /// recorded. Returns how many were inserted.
    async fn append_audit(&self, records: Vec<AuditRecord<P>>) -> StoreResult<usize>;

    /// Wipe every stream and projection, re-inserting the full history of
    /// `preserve` (same versions, ids and timestamps) in the same unit.
    async fn reset(
        &self,
        preserve: Option<Uuid>,
        projector: &dyn Projector<P>,
    ) -> StoreResult<ResetOutcome<P::Entity>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_version_from_option() {
        assert_eq!(ExpectedVersion::from_option(None), ExpectedVersion::Any);
        assert_eq!(ExpectedVersion::from_option(Some(0)), ExpectedVersion::NoStream);
        assert_eq!(ExpectedVersion::from_option(Some(4)), ExpectedVersion::Exact(4));
    }

    #[test]
    fn test_expected_version_check() {
        let id = Uuid::new_v4();
        assert!(ExpectedVersion::Any.check(id, 9).is_ok());
        assert!(ExpectedVersion::NoStream.check(id, 0).is_ok());
        assert!(ExpectedVersion::Exact(2).check(id, 2).is_ok());

        let err = ExpectedVersion::NoStream.check(id, 1).unwrap_err();
        assert!(matches!(err, EventStoreError::VersionConflict { expected: 0, actual: 1, .. }));

        let err = ExpectedVersion::Exact(1).check(id, 2).unwrap_err();
        assert!(matches!(err, EventStoreError::VersionConflict { expected: 1, actual: 2, .. }));
    }
}
