// ============================================================================
// Routine Domain - Recurring Maintenance Plans
// ============================================================================
//
// A routine is a named task list repeated every `frequency_days`, linked to
// the equipment it applies to.
//
// ============================================================================

pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;

// Re-export for convenience
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
