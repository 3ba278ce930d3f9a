use uuid::Uuid;

// ============================================================================
// Routine Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoutineError {
    #[error("Routine already exists")]
    AlreadyExists,

    #[error("Routine does not exist")]
    NotFound,

    #[error("Routine is deleted")]
    Deleted,

    #[error("Routine name cannot be empty")]
    EmptyName,

    #[error("Frequency must be at least one day, got {0}")]
    InvalidFrequency(u32),

    #[error("Equipment {0} is already linked")]
    AlreadyLinked(Uuid),

    #[error("Equipment {0} is not linked")]
    NotLinked(Uuid),

    #[error("Update does not change anything")]
    NothingToUpdate,

    #[error("Aggregate not initialized")]
    NotInitialized,
}
