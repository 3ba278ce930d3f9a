// ============================================================================
// Event Sourcing Store - Generic Persistence Layer
// ============================================================================
//
// This module contains GENERIC persistence infrastructure for event sourcing.
// All components work with ANY domain registry / payload type.
//
// ============================================================================

pub mod backend;
pub mod event_store;
pub mod memory;
pub mod postgres;

pub use backend::{AppendOutcome, AppendRequest, EventStorage, ExpectedVersion, ResetOutcome, StreamHeader};
pub use event_store::EventStore;
pub use memory::InMemoryStorage;
pub use postgres::PostgresStorage;
