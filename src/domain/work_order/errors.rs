use super::value_objects::WorkOrderStatus;

// ============================================================================
// Work Order Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkOrderError {
    #[error("Work order already exists")]
    AlreadyExists,

    #[error("Work order does not exist")]
    NotFound,

    #[error("Work order is deleted")]
    Deleted,

    #[error("Work order execution is already completed")]
    AlreadyCompleted,

    #[error("Cannot {action} a work order in status {status:?}")]
    InvalidStatusTransition {
        action: &'static str,
        status: WorkOrderStatus,
    },

    #[error("Progress must be between 0 and 100, got {0}")]
    InvalidProgress(u8),

    #[error("Progress cannot go back from {current}% to {requested}%")]
    ProgressDecreased { current: u8, requested: u8 },

    #[error("Field '{0}' cannot be empty")]
    EmptyField(&'static str),

    #[error("At least one employee must be assigned")]
    NoEmployees,

    #[error("Update does not change anything")]
    NothingToUpdate,

    #[error("Aggregate not initialized")]
    NotInitialized,
}
