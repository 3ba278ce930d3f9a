use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::value_objects::EquipmentStatus;

// ============================================================================
// Equipment Commands
// ============================================================================

#[derive(Debug, Clone)]
pub enum EquipmentCommand {
    RegisterEquipment {
        code: String,
        name: String,
        area: String,
        manufacturer: Option<String>,
        model: Option<String>,
        serial_number: Option<String>,
    },
    UpdateDetails {
        name: Option<String>,
        area: Option<String>,
        manufacturer: Option<String>,
        model: Option<String>,
        serial_number: Option<String>,
    },
    ChangeStatus {
        status: EquipmentStatus,
    },
    RecordMaintenance {
        work_order_id: Uuid,
        performed_at: DateTime<Utc>,
    },
    DeleteEquipment {
        reason: Option<String>,
    },
}
