use chrono::{DateTime, Utc};
use uuid::Uuid;

// ============================================================================
// Work Order Commands - Represent user intent
// ============================================================================

#[derive(Debug, Clone)]
pub enum WorkOrderCommand {
    CreateWorkOrder {
        code: String,
        title: String,
        description: Option<String>,
        equipment_id: Uuid,
        routine_id: Option<Uuid>,
        scheduled_for: Option<DateTime<Utc>>,
    },
    UpdateDetails {
        title: Option<String>,
        description: Option<String>,
        scheduled_for: Option<DateTime<Utc>>,
    },
    AssignEmployees {
        employee_ids: Vec<Uuid>,
    },
    StartWork,
    RecordProgress {
        percentage: u8,
        note: Option<String>,
    },
    CompleteExecution {
        observations: Option<String>,
    },
    DeleteWorkOrder {
        reason: Option<String>,
    },
}
