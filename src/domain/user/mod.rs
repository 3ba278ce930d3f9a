// ============================================================================
// User Domain - Accounts and Access Credentials
// ============================================================================
//
// Password hashes and credentials are opaque values produced by the caller.
// A user holds at most one current credential; issuing a new one replaces it.
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
