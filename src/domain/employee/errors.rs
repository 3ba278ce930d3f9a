// ============================================================================
// Employee Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmployeeError {
    #[error("Employee already exists")]
    AlreadyExists,

    #[error("Employee does not exist")]
    NotFound,

    #[error("Employee is deleted")]
    Deleted,

    #[error("Employee is already inactive")]
    AlreadyInactive,

    #[error("Employee is already active")]
    AlreadyActive,

    #[error("Field '{0}' cannot be empty")]
    EmptyField(&'static str),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Update does not change anything")]
    NothingToUpdate,

    #[error("Aggregate not initialized")]
    NotInitialized,
}
