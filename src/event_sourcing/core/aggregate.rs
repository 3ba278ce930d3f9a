use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use uuid::Uuid;

use super::event::{DomainEvent, EventContext, EventEnvelope, EventPayload};
use crate::event_sourcing::error::EventStoreError;

// ============================================================================
// Aggregate Root Pattern - Event Sourcing Core
// ============================================================================
//
// Key Principles:
// 1. State is derived from events (not stored directly)
// 2. Commands are validated before emitting events
// 3. Events represent facts that have already happened
// 4. Folding is pure: time comes from the event, never from the clock
// 5. Snapshots are a cache over the fold, never the source of truth
//
// This is the GENERIC aggregate trait that works for ANY domain aggregate.
//
// ============================================================================

/// Payload type shared by every stream an aggregate lives in.
pub type PayloadOf<A> = <<A as Aggregate>::Event as DomainEvent>::Payload;

/// Entity tag of an aggregate.
pub type EntityOf<A> = <PayloadOf<A> as EventPayload>::Entity;

/// Generic Aggregate trait - all event-sourced aggregates implement this
///
/// Type Parameters:
/// - `Event`: The domain event type for this aggregate
/// - `Command`: The command type for this aggregate
/// - `Error`: The error type for business rule violations
pub trait Aggregate:
    Sized + Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Event: DomainEvent;
    type Command: Debug + Send + Sync;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Entity tag of the streams holding this aggregate
    fn entity_type() -> EntityOf<Self>;

    /// Create new aggregate from first event
    fn apply_first_event(ctx: &EventContext, event: &Self::Event) -> Result<Self, Self::Error>;

    /// Apply subsequent events to update state
    fn apply_event(&mut self, ctx: &EventContext, event: &Self::Event) -> Result<(), Self::Error>;

    /// Handle command and emit events (business logic).
    ///
    /// `state` is `None` when the stream does not exist yet.
    fn handle_command(
        state: Option<&Self>,
        command: &Self::Command,
    ) -> Result<Vec<Self::Event>, Self::Error>;

    /// Get aggregate ID
    fn aggregate_id(&self) -> Uuid;

    /// Get current version (sequence number)
    fn version(&self) -> i64;

    /// Fold one committed event into the state.
    ///
    /// A payload of another entity is `UnknownEventForEntity`; a payload the
    /// state refuses, or one out of version order, is `InvalidEventSequence`.
    fn fold(
        state: Option<Self>,
        envelope: &EventEnvelope<PayloadOf<Self>>,
    ) -> Result<Self, EventStoreError> {
        let event = Self::Event::from_payload(&envelope.payload).ok_or_else(|| {
            EventStoreError::UnknownEventForEntity {
                stream_id: envelope.stream_id,
                entity: Self::entity_type().to_string(),
                event_type: envelope.event_type.clone(),
            }
        })?;

        let ctx = envelope.context();
        let invalid = |reason: String| EventStoreError::InvalidEventSequence {
            stream_id: envelope.stream_id,
            version: envelope.stream_version,
            event_type: envelope.event_type.clone(),
            reason,
        };

        match state {
            None => {
                if envelope.stream_version != 1 {
                    return Err(invalid(format!(
                        "stream must start at version 1, found {}",
                        envelope.stream_version
                    )));
                }
                Self::apply_first_event(&ctx, event).map_err(|e| invalid(e.to_string()))
            }
            Some(mut aggregate) => {
                if envelope.stream_version != aggregate.version() + 1 {
                    return Err(invalid(format!(
                        "expected version {}, found {}",
                        aggregate.version() + 1,
                        envelope.stream_version
                    )));
                }
                aggregate
                    .apply_event(&ctx, event)
                    .map_err(|e| invalid(e.to_string()))?;
                Ok(aggregate)
            }
        }
    }

    /// Fold a batch of events onto an optional starting state
    fn fold_all(
        state: Option<Self>,
        events: &[EventEnvelope<PayloadOf<Self>>],
    ) -> Result<Option<Self>, EventStoreError> {
        events
            .iter()
            .try_fold(state, |state, envelope| Self::fold(state, envelope).map(Some))
    }

    /// Load aggregate from event history (reconstruct from events)
    fn load_from_events(events: &[EventEnvelope<PayloadOf<Self>>]) -> Result<Self, EventStoreError> {
        Self::fold_all(None, events)?.ok_or(EventStoreError::EmptyHistory)
    }
}

// ============================================================================
// Tests
// ============================================================================
