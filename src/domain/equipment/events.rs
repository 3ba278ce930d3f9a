use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::value_objects::EquipmentStatus;
use crate::domain::modules::detail;
use crate::domain::MaintenanceEvent;
use crate::event_sourcing::core::DomainEvent;

// ============================================================================
// Equipment Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EquipmentEvent {
    #[serde(rename = "EquipmentRegistered")]
    Registered(EquipmentRegistered),
    #[serde(rename = "EquipmentDetailsUpdated")]
    DetailsUpdated(EquipmentDetailsUpdated),
    #[serde(rename = "EquipmentStatusChanged")]
    StatusChanged(EquipmentStatusChanged),
    #[serde(rename = "MaintenanceRecorded")]
    MaintenanceRecorded(MaintenanceRecorded),
    #[serde(rename = "EquipmentDeleted")]
    Deleted(EquipmentDeleted),
}

pub const EVENT_TYPES: &[&str] = &[
    "EquipmentRegistered",
    "EquipmentDetailsUpdated",
    "EquipmentStatusChanged",
    "MaintenanceRecorded",
    "EquipmentDeleted",
];

impl EquipmentEvent {
    pub fn audit_detail(&self) -> BTreeMap<String, Value> {
        match self {
            EquipmentEvent::Registered(e) => detail([
                ("code", json!(e.code)),
                ("name", json!(e.name)),
                ("area", json!(e.area)),
            ]),
            EquipmentEvent::DetailsUpdated(e) => detail([
                ("name", json!(e.name)),
                ("area", json!(e.area)),
                ("manufacturer", json!(e.manufacturer)),
                ("model", json!(e.model)),
                ("serial_number", json!(e.serial_number)),
            ]),
            EquipmentEvent::StatusChanged(e) => detail([("status", json!(e.status))]),
            EquipmentEvent::MaintenanceRecorded(e) => detail([
                ("work_order_id", json!(e.work_order_id)),
                ("performed_at", json!(e.performed_at)),
            ]),
            EquipmentEvent::Deleted(e) => detail([("reason", json!(e.reason))]),
        }
    }
}

impl DomainEvent for EquipmentEvent {
    type Payload = MaintenanceEvent;

    fn event_type(&self) -> &'static str {
        match self {
            EquipmentEvent::Registered(_) => "EquipmentRegistered",
            EquipmentEvent::DetailsUpdated(_) => "EquipmentDetailsUpdated",
            EquipmentEvent::StatusChanged(_) => "EquipmentStatusChanged",
            EquipmentEvent::MaintenanceRecorded(_) => "MaintenanceRecorded",
            EquipmentEvent::Deleted(_) => "EquipmentDeleted",
        }
    }

    fn into_payload(self) -> MaintenanceEvent {
        MaintenanceEvent::Equipment(self)
    }

    fn from_payload(payload: &MaintenanceEvent) -> Option<&Self> {
        match payload {
            MaintenanceEvent::Equipment(event) => Some(event),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EquipmentRegistered {
    pub code: String,
    pub name: String,
    pub area: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
}

/// Equipment Details Updated - Only the given fields change
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EquipmentDetailsUpdated {
    pub name: Option<String>,
    pub area: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EquipmentStatusChanged {
    pub status: EquipmentStatus,
}

/// Maintenance Recorded - A completed work order was performed on this equipment
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MaintenanceRecorded {
    pub work_order_id: Uuid,
    pub performed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EquipmentDeleted {
    pub reason: Option<String>,
}
