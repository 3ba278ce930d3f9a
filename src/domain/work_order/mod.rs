// ============================================================================
// Work Order Domain - Business Logic for Work Order Aggregate
// ============================================================================
//
// This module contains ALL work-order-specific code:
// - Value objects (WorkOrderStatus)
// - Events (WorkOrderCreated, ProgressRecorded, etc.)
// - Commands (CreateWorkOrder, RecordProgress, etc.)
// - Errors (WorkOrderError enum)
// - Aggregate (WorkOrderAggregate with business logic)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
