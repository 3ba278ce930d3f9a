use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::event_sourcing::core::{Aggregate, EntityOf, EntityTag, EventEnvelope, PayloadOf};
use crate::event_sourcing::error::{EventStoreError, StoreResult};

// ============================================================================
// Snapshot Projection - Current State per Stream
// ============================================================================
//
// One JSON document per stream, folded inline on every append. The document
// is the serde rendering of the aggregate, so replaying the same history
// always yields the same document.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(bound = "")]
pub struct Snapshot<E: EntityTag> {
    pub stream_id: Uuid,
    pub entity: E,
    /// Version of the last event folded into `state`
    pub version: i64,
    pub state: Value,
    /// `occurred_at` of the last folded event
    pub updated_at: DateTime<Utc>,
}

impl<E: EntityTag> Snapshot<E> {
    /// Decode the stored document into its aggregate
    pub fn decode<A>(&self) -> StoreResult<A>
    where
        A: Aggregate,
        EntityOf<A>: PartialEq<E>,
    {
        if A::entity_type() != self.entity {
            return Err(EventStoreError::StreamTypeMismatch {
                stream_id: self.stream_id,
                expected: A::entity_type().to_string(),
                actual: self.entity.to_string(),
            });
        }
        Ok(serde_json::from_value(self.state.clone())?)
    }
}

/// Fold new events into a stream's document.
///
/// `current` is the stored snapshot, or `None` for a new stream (or a full
/// rebuild). The result's version always equals the last event's version.
pub fn fold_document<A: Aggregate>(
    current: Option<&Snapshot<EntityOf<A>>>,
    events: &[EventEnvelope<PayloadOf<A>>],
) -> StoreResult<Snapshot<EntityOf<A>>> {
    let Some(last) = events.last() else {
        return current.cloned().ok_or(EventStoreError::EmptyHistory);
    };

    let state: Option<A> = match current {
        Some(snapshot) => Some(snapshot.decode::<A>()?),
        None => None,
    };

    let aggregate = A::fold_all(state, events)?.ok_or(EventStoreError::EmptyHistory)?;

    Ok(Snapshot {
        stream_id: last.stream_id,
        entity: A::entity_type(),
        version: last.stream_version,
        state: serde_json::to_value(&aggregate)?,
        updated_at: last.occurred_at,
    })
}

/// Outcome of an administrative snapshot rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub streams: usize,
    pub rebuilt: usize,
    /// Streams whose stored snapshot differed from the replayed one
    pub changed: usize,
    /// Streams that moved on while the rebuild ran; their inline snapshot is kept
    pub skipped: usize,
}

/// A stored snapshot that does not match a full replay of its stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotMismatch {
    pub stream_id: Uuid,
    pub stored_version: Option<i64>,
    pub replayed_version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::employee::{
        EmployeeAggregate, EmployeeDeactivated, EmployeeEvent, EmployeeRegistered,
    };
    use crate::domain::{EntityType, MaintenanceEvent};
    use crate::event_sourcing::core::NewEvent;

    fn registered() -> MaintenanceEvent {
        MaintenanceEvent::Employee(EmployeeEvent::Registered(EmployeeRegistered {
            document_id: "1032456789".to_string(),
            first_name: "Luis".to_string(),
            last_name: "Gómez".to_string(),
            position: "Técnico mecánico".to_string(),
            email: None,
        }))
    }

    fn deactivated() -> MaintenanceEvent {
        MaintenanceEvent::Employee(EmployeeEvent::Deactivated(EmployeeDeactivated {
            reason: "Licencia".to_string(),
        }))
    }

    fn commit(stream_id: Uuid, version: i64, payload: MaintenanceEvent) -> EventEnvelope<MaintenanceEvent> {
        EventEnvelope::commit(stream_id, version, version, NewEvent::new(payload), Utc::now())
    }

    #[test]
    fn test_incremental_fold_matches_full_fold() {
        let id = Uuid::new_v4();
        let first = vec![commit(id, 1, registered())];
        let second = vec![commit(id, 2, deactivated())];

        let after_first = fold_document::<EmployeeAggregate>(None, &first).unwrap();
        let incremental = fold_document::<EmployeeAggregate>(Some(&after_first), &second).unwrap();

        let all: Vec<_> = first.into_iter().chain(second).collect();
        let full = fold_document::<EmployeeAggregate>(None, &all).unwrap();

        assert_eq!(incremental, full);
        assert_eq!(full.version, 2);
        assert_eq!(full.entity, EntityType::Employee);
        assert_eq!(full.state["active"], Value::Bool(false));
    }

    #[test]
    fn test_decode_rejects_other_entity() {
        let id = Uuid::new_v4();
        let snapshot = fold_document::<EmployeeAggregate>(None, &[commit(id, 1, registered())]).unwrap();

        let result = snapshot.decode::<crate::domain::routine::RoutineAggregate>();
        assert!(matches!(result, Err(EventStoreError::StreamTypeMismatch { .. })));

        let employee: EmployeeAggregate = snapshot.decode().unwrap();
        assert_eq!(employee.id, id);
    }

    #[test]
    fn test_empty_batch_without_snapshot_fails() {
        let result = fold_document::<EmployeeAggregate>(None, &[]);
        assert!(matches!(result, Err(EventStoreError::EmptyHistory)));
    }
}
