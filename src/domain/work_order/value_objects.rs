use serde::{Deserialize, Serialize};

// ============================================================================
// Work Order Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkOrderStatus {
    Activa,
    EnProceso,
    EjecucionCompleta,
    Eliminada,
}

impl WorkOrderStatus {
    /// Execution is finished; only deletion is still accepted
    pub fn is_completed(&self) -> bool {
        matches!(self, WorkOrderStatus::EjecucionCompleta)
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, WorkOrderStatus::Eliminada)
    }
}

/// Progress of a work order, in percent
pub const MAX_PROGRESS: u8 = 100;

// ============================================================================
// Unit Tests
// ============================================================================
