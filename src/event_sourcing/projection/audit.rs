use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::event_sourcing::core::{EventEnvelope, EventPayload, ModuleTag};
use crate::event_sourcing::query::{contains_ignore_case, OrderBy};

// ============================================================================
// Audit Trail Projection
// ============================================================================
//
// One record per committed event, classified into a business module.
// Classification never fails: a payload the registry cannot resolve is
// recorded under the payload's unclassified module.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(bound = "")]
pub struct AuditRecord<P: EventPayload> {
    pub id: Uuid,
    pub global_sequence: i64,
    pub stream_id: Uuid,
    pub entity: P::Entity,
    pub event_type: String,
    pub module: P::Module,
    pub stream_version: i64,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub actor_name: Option<String>,
    pub detail: BTreeMap<String, Value>,
}

impl<P: EventPayload> AuditRecord<P> {
    /// Build the record for a committed event.
    ///
    /// Actor and time come from the envelope; `detail` is whatever the
    /// payload declares for its event type.
    pub fn from_envelope(
        envelope: &EventEnvelope<P>,
        module: Option<P::Module>,
        detail: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            global_sequence: envelope.global_sequence,
            stream_id: envelope.stream_id,
            entity: envelope.entity,
            event_type: envelope.event_type.clone(),
            module: module.unwrap_or(<P::Module as ModuleTag>::UNCLASSIFIED),
            stream_version: envelope.stream_version,
            occurred_at: envelope.occurred_at,
            actor_id: envelope.actor_id,
            actor_name: envelope.actor_name.clone(),
            detail,
        }
    }

    pub fn is_unclassified(&self) -> bool {
        self.module == <P::Module as ModuleTag>::UNCLASSIFIED
    }
}

/// Search criteria over the audit trail. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct AuditFilter<M: ModuleTag> {
    pub module: Option<M>,
    pub event_type: Option<String>,
    /// Case-insensitive substring of the actor name
    pub actor_name: Option<String>,
    pub stream_id: Option<Uuid>,
    /// Inclusive lower bound on `occurred_at`
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `occurred_at`
    pub to: Option<DateTime<Utc>>,
}

impl<M: ModuleTag> Default for AuditFilter<M> {
    fn default() -> Self {
        Self {
            module: None,
            event_type: None,
            actor_name: None,
            stream_id: None,
            from: None,
            to: None,
        }
    }
}

impl<M: ModuleTag> AuditFilter<M> {
    pub fn for_module(module: M) -> Self {
        Self {
            module: Some(module),
            ..Self::default()
        }
    }

    pub fn for_stream(stream_id: Uuid) -> Self {
        Self {
            stream_id: Some(stream_id),
            ..Self::default()
        }
    }

    pub fn matches<P: EventPayload<Module = M>>(&self, record: &AuditRecord<P>) -> bool {
        if let Some(module) = self.module {
            if record.module != module {
                return false;
            }
        }
        if let Some(event_type) = &self.event_type {
            if &record.event_type != event_type {
                return false;
            }
        }
        if let Some(actor) = &self.actor_name {
            match &record.actor_name {
                Some(name) if contains_ignore_case(name, actor) => {}
                _ => return false,
            }
        }
        if let Some(stream_id) = self.stream_id {
            if record.stream_id != stream_id {
                return false;
            }
        }
        if let Some(from) = self.from {
            if record.occurred_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.occurred_at > to {
                return false;
            }
        }
        true
    }
}

/// Sortable audit columns. Unknown names fall back to `occurred_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSortField {
    OccurredAt,
    GlobalSequence,
    EventType,
    Module,
    ActorName,
    StreamVersion,
}

impl AuditSortField {
    pub fn parse(field: &str) -> Self {
        match field.to_ascii_lowercase().as_str() {
            "global_sequence" | "sequence" => AuditSortField::GlobalSequence,
            "event_type" | "type" => AuditSortField::EventType,
            "module" => AuditSortField::Module,
            "actor_name" | "actor" => AuditSortField::ActorName,
            "stream_version" | "version" => AuditSortField::StreamVersion,
            _ => AuditSortField::OccurredAt,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            AuditSortField::OccurredAt => "occurred_at",
            AuditSortField::GlobalSequence => "global_sequence",
            AuditSortField::EventType => "event_type",
            AuditSortField::Module => "module",
            AuditSortField::ActorName => "actor_name",
            AuditSortField::StreamVersion => "stream_version",
        }
    }
}

/// Newest first.
pub fn default_audit_order() -> OrderBy {
    OrderBy::desc("occurred_at")
}

/// Compare two records under `order`; ties are broken by global sequence in
/// the same direction so paging is stable.
pub fn compare_audit<P: EventPayload>(a: &AuditRecord<P>, b: &AuditRecord<P>, order: &OrderBy) -> Ordering {
    let primary = match AuditSortField::parse(&order.field) {
        AuditSortField::OccurredAt => a.occurred_at.cmp(&b.occurred_at),
        AuditSortField::GlobalSequence => a.global_sequence.cmp(&b.global_sequence),
        AuditSortField::EventType => a.event_type.cmp(&b.event_type),
        AuditSortField::Module => a.module.as_str().cmp(b.module.as_str()),
        AuditSortField::ActorName => a.actor_name.cmp(&b.actor_name),
        AuditSortField::StreamVersion => a.stream_version.cmp(&b.stream_version),
    };
    let direction = order.direction;
    direction
        .apply(primary)
        .then_with(|| direction.apply(a.global_sequence.cmp(&b.global_sequence)))
}
