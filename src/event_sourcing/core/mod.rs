// ============================================================================
// Event Sourcing Core - Generic Infrastructure Abstractions
// ============================================================================
//
// This module contains GENERIC, reusable event sourcing infrastructure
// that works with ANY domain aggregate.
//
// Key Principles:
// - No domain-specific code (no WorkOrder, Equipment, User, etc.)
// - Generic over payload and aggregate types
// - Reusable across all aggregates
//
// ============================================================================

pub mod aggregate;
pub mod event;

// Re-export core types for convenience
pub use aggregate::{Aggregate, EntityOf, PayloadOf};
pub use event::{
    deserialize_payload, serialize_payload, Actor, DomainEvent, EntityTag, EventContext,
    EventEnvelope, EventPayload, ModuleTag, NewEvent,
};
