use serde_json::Value;
use std::collections::BTreeMap;

use super::core::{EventEnvelope, EventPayload};
use super::error::StoreResult;
use super::projection::Snapshot;

// ============================================================================
// Domain Registry - The Seam Between Generic Engine and Business Domain
// ============================================================================
//
// The engine knows nothing about work orders or equipment. A domain plugs in
// by naming its payload type and answering three questions:
// - how to fold a stream of a given entity type into its document
// - which business module a payload belongs to
// - which fields of a payload the audit trail records
//
// ============================================================================

/// Entity tag of a registry's payload.
pub type RegistryEntity<R> = <<R as DomainRegistry>::Payload as EventPayload>::Entity;

/// Module tag of a registry's payload.
pub type RegistryModule<R> = <<R as DomainRegistry>::Payload as EventPayload>::Module;

pub trait DomainRegistry: Send + Sync + 'static {
    type Payload: EventPayload;

    /// Fold `events` into the document of a stream of `entity`.
    fn fold(
        entity: RegistryEntity<Self>,
        current: Option<&Snapshot<RegistryEntity<Self>>>,
        events: &[EventEnvelope<Self::Payload>],
    ) -> StoreResult<Snapshot<RegistryEntity<Self>>>;

    /// Business module of a payload; `None` files it as unclassified.
    fn classify(payload: &Self::Payload) -> Option<RegistryModule<Self>>;

    /// Declared audit detail of one payload.
    fn audit_detail(payload: &Self::Payload) -> BTreeMap<String, Value>;
}
