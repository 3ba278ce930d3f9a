// ============================================================================
// Inline Projections
// ============================================================================
//
// Both projections are computed inside the append's durability boundary:
// the backend hands the envelopes it is about to commit to the projector and
// writes whatever comes back in the same unit. Projection is pure; it never
// touches storage.
//
// ============================================================================

pub mod audit;
pub mod snapshot;

use std::marker::PhantomData;

pub use audit::{compare_audit, default_audit_order, AuditFilter, AuditRecord, AuditSortField};
pub use snapshot::{fold_document, RebuildReport, Snapshot, SnapshotMismatch};

use super::core::{EventEnvelope, EventPayload};
use super::error::StoreResult;
use super::registry::{DomainRegistry, RegistryEntity};

/// What one append adds to the derived views.
#[derive(Debug, Clone)]
pub struct Projection<P: EventPayload> {
    pub snapshot: Snapshot<P::Entity>,
    pub audit: Vec<AuditRecord<P>>,
}

pub trait Projector<P: EventPayload>: Send + Sync {
    fn project(
        &self,
        entity: P::Entity,
        current: Option<&Snapshot<P::Entity>>,
        events: &[EventEnvelope<P>],
    ) -> StoreResult<Projection<P>>;
}

/// Snapshot + audit projector driven by a domain registry.
pub struct InlineProjector<R> {
    _registry: PhantomData<R>,
}

impl<R> InlineProjector<R> {
    pub fn new() -> Self {
        Self {
            _registry: PhantomData,
        }
    }
}

impl<R> Default for InlineProjector<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: DomainRegistry> InlineProjector<R> {
    pub fn audit_records(events: &[EventEnvelope<R::Payload>]) -> Vec<AuditRecord<R::Payload>> {
        events
            .iter()
            .map(|envelope| {
                AuditRecord::from_envelope(
                    envelope,
                    R::classify(&envelope.payload),
                    R::audit_detail(&envelope.payload),
                )
            })
            .collect()
    }
}

impl<R: DomainRegistry> Projector<R::Payload> for InlineProjector<R> {
    fn project(
        &self,
        entity: RegistryEntity<R>,
        current: Option<&Snapshot<RegistryEntity<R>>>,
        events: &[EventEnvelope<R::Payload>],
    ) -> StoreResult<Projection<R::Payload>> {
        let snapshot = R::fold(entity, current, events)?;
        Ok(Projection {
            snapshot,
            audit: Self::audit_records(events),
        })
    }
}
