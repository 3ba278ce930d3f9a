// ============================================================================
// Machinery Maintenance Event Store
// ============================================================================
//
// - event_sourcing: GENERIC log, folding, projections, concurrency, queries
// - domain: maintenance aggregates, business modules, command handling
// - metrics: Prometheus instrumentation and the /metrics endpoint
//
// ============================================================================

pub mod config;
pub mod domain;
pub mod event_sourcing;
pub mod metrics;
pub mod utils;

pub use config::StoreConfig;
pub use domain::{EntityType, MaintenanceDomain, MaintenanceEvent, MaintenanceStore};
pub use event_sourcing::error::{EventStoreError, StoreResult};
