use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::modules::detail;
use crate::domain::MaintenanceEvent;
use crate::event_sourcing::core::DomainEvent;

// ============================================================================
// Routine Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RoutineEvent {
    #[serde(rename = "RoutineCreated")]
    Created(RoutineCreated),
    #[serde(rename = "RoutineUpdated")]
    Updated(RoutineUpdated),
    #[serde(rename = "EquipmentLinked")]
    EquipmentLinked(EquipmentLinked),
    #[serde(rename = "EquipmentUnlinked")]
    EquipmentUnlinked(EquipmentUnlinked),
    #[serde(rename = "RoutineDeleted")]
    Deleted(RoutineDeleted),
}

pub const EVENT_TYPES: &[&str] = &[
    "RoutineCreated",
    "RoutineUpdated",
    "EquipmentLinked",
    "EquipmentUnlinked",
    "RoutineDeleted",
];

impl RoutineEvent {
    pub fn audit_detail(&self) -> BTreeMap<String, Value> {
        match self {
            RoutineEvent::Created(e) => detail([
                ("name", json!(e.name)),
                ("frequency_days", json!(e.frequency_days)),
                ("task_count", json!(e.tasks.len())),
            ]),
            RoutineEvent::Updated(e) => detail([
                ("name", json!(e.name)),
                ("description", json!(e.description)),
                ("frequency_days", json!(e.frequency_days)),
                ("task_count", json!(e.tasks.as_ref().map(Vec::len))),
            ]),
            RoutineEvent::EquipmentLinked(e) => detail([("equipment_id", json!(e.equipment_id))]),
            RoutineEvent::EquipmentUnlinked(e) => detail([("equipment_id", json!(e.equipment_id))]),
            RoutineEvent::Deleted(_) => BTreeMap::new(),
        }
    }
}

impl DomainEvent for RoutineEvent {
    type Payload = MaintenanceEvent;

    fn event_type(&self) -> &'static str {
        match self {
            RoutineEvent::Created(_) => "RoutineCreated",
            RoutineEvent::Updated(_) => "RoutineUpdated",
            RoutineEvent::EquipmentLinked(_) => "EquipmentLinked",
            RoutineEvent::EquipmentUnlinked(_) => "EquipmentUnlinked",
            RoutineEvent::Deleted(_) => "RoutineDeleted",
        }
    }

    fn into_payload(self) -> MaintenanceEvent {
        MaintenanceEvent::Routine(self)
    }

    fn from_payload(payload: &MaintenanceEvent) -> Option<&Self> {
        match payload {
            MaintenanceEvent::Routine(event) => Some(event),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RoutineCreated {
    pub name: String,
    pub description: Option<String>,
    pub frequency_days: u32,
    pub tasks: Vec<String>,
}

/// Routine Updated - Only the given fields change
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RoutineUpdated {
    pub name: Option<String>,
    pub description: Option<String>,
    pub frequency_days: Option<u32>,
    pub tasks: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EquipmentLinked {
    pub equipment_id: Uuid,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EquipmentUnlinked {
    pub equipment_id: Uuid,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RoutineDeleted {}
