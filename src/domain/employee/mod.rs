// ============================================================================
// Employee Domain - Maintenance Staff
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
