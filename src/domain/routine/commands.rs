use uuid::Uuid;

// ============================================================================
// Routine Commands
// ============================================================================

#[derive(Debug, Clone)]
pub enum RoutineCommand {
    CreateRoutine {
        name: String,
        description: Option<String>,
        frequency_days: u32,
        tasks: Vec<String>,
    },
    UpdateRoutine {
        name: Option<String>,
        description: Option<String>,
        frequency_days: Option<u32>,
        tasks: Option<Vec<String>>,
    },
    LinkEquipment {
        equipment_id: Uuid,
    },
    UnlinkEquipment {
        equipment_id: Uuid,
    },
    DeleteRoutine,
}
