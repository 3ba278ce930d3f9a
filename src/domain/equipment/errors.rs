use super::value_objects::EquipmentStatus;

// ============================================================================
// Equipment Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EquipmentError {
    #[error("Equipment already exists")]
    AlreadyExists,

    #[error("Equipment does not exist")]
    NotFound,

    #[error("Equipment is deleted")]
    Deleted,

    #[error("Equipment is already {0:?}")]
    StatusUnchanged(EquipmentStatus),

    #[error("Field '{0}' cannot be empty")]
    EmptyField(&'static str),

    #[error("Update does not change anything")]
    NothingToUpdate,

    #[error("Aggregate not initialized")]
    NotInitialized,
}
