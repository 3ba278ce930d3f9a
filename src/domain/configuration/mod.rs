// ============================================================================
// Configuration Domain - Global Settings of the Installation
// ============================================================================
//
// A single well-known stream holds the company name and free-form settings.
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

use uuid::Uuid;

/// Stream id of the one configuration aggregate
pub const CONFIGURATION_STREAM_ID: Uuid = Uuid::from_u128(0x00000000_0000_4000_8000_00000000c0f1);
