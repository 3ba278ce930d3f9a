use uuid::Uuid;

use super::value_objects::UserRole;

// ============================================================================
// User Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UserError {
    #[error("User already exists")]
    AlreadyExists,

    #[error("User does not exist")]
    NotFound,

    #[error("User is deleted")]
    Deleted,

    #[error("User is disabled")]
    Disabled,

    #[error("User is already enabled")]
    AlreadyEnabled,

    #[error("Username cannot be empty")]
    EmptyUsername,

    #[error("Username '{0}' contains whitespace")]
    InvalidUsername(String),

    #[error("Password hash cannot be empty")]
    EmptyPasswordHash,

    #[error("User already has role {0:?}")]
    RoleUnchanged(UserRole),

    #[error("Credential {0} is already the current credential")]
    CredentialAlreadyIssued(Uuid),

    #[error("Credential {0} is not the current credential")]
    UnknownCredential(Uuid),

    #[error("Aggregate not initialized")]
    NotInitialized,
}
