use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;

// ============================================================================
// Event Envelope - Stream Metadata Around a Business Fact
// ============================================================================
//
// Wraps domain payloads with the metadata the log, the projections and the
// audit trail need. GENERIC over the payload type.
//
// ============================================================================

/// Tag identifying which kind of entity a stream holds.
pub trait EntityTag:
    Copy + Eq + Hash + Ord + Debug + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn as_str(&self) -> &'static str;

    fn parse_tag(tag: &str) -> Option<Self>;
}

/// Business module an audit record is filed under.
pub trait ModuleTag:
    Copy + Eq + Hash + Debug + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Module of events the registry cannot resolve
    const UNCLASSIFIED: Self;

    fn as_str(&self) -> &'static str;

    fn parse_tag(tag: &str) -> Option<Self>;
}

/// The tagged payload stored in the log.
///
/// One type covers every entity so that a single log, snapshot table and
/// audit trail can hold all of them. Each variant knows the entity it belongs
/// to and its stable type tag.
pub trait EventPayload:
    Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync + 'static
{
    type Entity: EntityTag;
    type Module: ModuleTag;

    fn entity(&self) -> Self::Entity;

    fn event_type(&self) -> &'static str;
}

/// Per-entity event enum, convertible to and from the shared payload.
pub trait DomainEvent: Clone + Debug + Send + Sync + 'static {
    type Payload: EventPayload;

    fn event_type(&self) -> &'static str;

    fn into_payload(self) -> Self::Payload;

    /// Borrow this entity's event out of a payload; `None` when the payload
    /// belongs to another entity.
    fn from_payload(payload: &Self::Payload) -> Option<&Self>;
}

/// Who caused an event.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Actor {
    pub id: Option<Uuid>,
    pub name: Option<String>,
}

impl Actor {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: Some(name.into()),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// An event as offered by a caller, before the log assigns its position.
#[derive(Clone, Debug)]
pub struct NewEvent<P> {
    pub event_id: Uuid,
    pub payload: P,
    pub actor: Actor,
    pub correlation_id: Option<Uuid>,
    /// Defaults to the commit time when left empty.
    pub occurred_at: Option<DateTime<Utc>>,
    pub metadata: BTreeMap<String, String>,
}

impl<P: EventPayload> NewEvent<P> {
    pub fn new(payload: P) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            payload,
            actor: Actor::anonymous(),
            correlation_id: None,
            occurred_at: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn from_event<E: DomainEvent<Payload = P>>(event: E) -> Self {
        Self::new(event.into_payload())
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }
}

/// A committed event.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(bound = "")]
pub struct EventEnvelope<P: EventPayload> {
    // Event Identity
    pub event_id: Uuid,
    pub stream_id: Uuid,
    pub entity: P::Entity,
    pub stream_version: i64,
    pub global_sequence: i64,

    // Payload
    pub event_type: String,
    pub payload: P,

    // Timing & actor
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub actor_name: Option<String>,

    // Correlation & free-form metadata
    pub correlation_id: Option<Uuid>,
    pub metadata: BTreeMap<String, String>,
}

impl<P: EventPayload> EventEnvelope<P> {
    /// Bind a new event to its position in the log.
    pub fn commit(
        stream_id: Uuid,
        stream_version: i64,
        global_sequence: i64,
        event: NewEvent<P>,
        committed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event.event_id,
            stream_id,
            entity: event.payload.entity(),
            stream_version,
            global_sequence,
            event_type: event.payload.event_type().to_string(),
            payload: event.payload,
            occurred_at: event.occurred_at.unwrap_or(committed_at),
            actor_id: event.actor.id,
            actor_name: event.actor.name,
            correlation_id: event.correlation_id,
            metadata: event.metadata,
        }
    }

    pub fn context(&self) -> EventContext {
        EventContext {
            stream_id: self.stream_id,
            stream_version: self.stream_version,
            occurred_at: self.occurred_at,
        }
    }

    /// Turn a committed event back into an appendable one, keeping its
    /// identity and timestamp. Used when history is re-inserted.
    pub fn to_new_event(&self) -> NewEvent<P> {
        NewEvent {
            event_id: self.event_id,
            payload: self.payload.clone(),
            actor: Actor {
                id: self.actor_id,
                name: self.actor_name.clone(),
            },
            correlation_id: self.correlation_id,
            occurred_at: Some(self.occurred_at),
            metadata: self.metadata.clone(),
        }
    }
}

/// The part of an envelope a fold is allowed to see.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub stream_id: Uuid,
    pub stream_version: i64,
    pub occurred_at: DateTime<Utc>,
}

// ============================================================================
// Event Serialization Helpers
// ============================================================================

pub fn serialize_payload<P: EventPayload>(payload: &P) -> serde_json::Result<serde_json::Value> {
    serde_json::to_value(payload)
}

pub fn deserialize_payload<P: EventPayload>(json: serde_json::Value) -> serde_json::Result<P> {
    serde_json::from_value(json)
}

// ============================================================================
// Tests
// ============================================================================
