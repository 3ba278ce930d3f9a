// ============================================================================
// Event Sourcing Infrastructure
// ============================================================================
//
// Generic, reusable event sourcing infrastructure.
// Domain-specific code is in src/domain/
//
// ============================================================================

// Core abstractions (GENERIC - works with any aggregate)
pub mod concurrency;
pub mod core;
pub mod error;
pub mod projection;
pub mod query;
pub mod registry;
pub mod store;

// Re-export core infrastructure
pub use self::core::*;
pub use concurrency::{InProcessStreamLocks, StreamLease, StreamLockProvider};
pub use error::{EventStoreError, StoreResult};
pub use projection::{AuditFilter, AuditRecord, InlineProjector, Projector, RebuildReport, Snapshot};
pub use query::{OrderBy, Page, PageRequest, PaginationError, SnapshotFilter, SortDirection};
pub use registry::DomainRegistry;
pub use store::*;
