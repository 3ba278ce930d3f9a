use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Equipment Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquipmentStatus {
    Operativo,
    EnMantenimiento,
    FueraDeServicio,
}

/// Last maintenance performed on a piece of equipment
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MaintenanceEntry {
    pub work_order_id: Uuid,
    pub performed_at: DateTime<Utc>,
}
