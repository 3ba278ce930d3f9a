use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::domain::modules::detail;
use crate::domain::MaintenanceEvent;
use crate::event_sourcing::core::DomainEvent;

// ============================================================================
// Employee Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EmployeeEvent {
    #[serde(rename = "EmployeeRegistered")]
    Registered(EmployeeRegistered),
    #[serde(rename = "EmployeeProfileUpdated")]
    ProfileUpdated(EmployeeProfileUpdated),
    #[serde(rename = "EmployeeDeactivated")]
    Deactivated(EmployeeDeactivated),
    #[serde(rename = "EmployeeReactivated")]
    Reactivated(EmployeeReactivated),
    #[serde(rename = "EmployeeDeleted")]
    Deleted(EmployeeDeleted),
}

pub const EVENT_TYPES: &[&str] = &[
    "EmployeeRegistered",
    "EmployeeProfileUpdated",
    "EmployeeDeactivated",
    "EmployeeReactivated",
    "EmployeeDeleted",
];

impl EmployeeEvent {
    pub fn audit_detail(&self) -> BTreeMap<String, Value> {
        match self {
            EmployeeEvent::Registered(e) => detail([
                ("document_id", json!(e.document_id)),
                ("name", json!(format!("{} {}", e.first_name, e.last_name))),
                ("position", json!(e.position)),
            ]),
            EmployeeEvent::ProfileUpdated(e) => detail([
                ("first_name", json!(e.first_name)),
                ("last_name", json!(e.last_name)),
                ("position", json!(e.position)),
                ("email", json!(e.email)),
            ]),
            EmployeeEvent::Deactivated(e) => detail([("reason", json!(e.reason))]),
            EmployeeEvent::Reactivated(_) | EmployeeEvent::Deleted(_) => BTreeMap::new(),
        }
    }
}

impl DomainEvent for EmployeeEvent {
    type Payload = MaintenanceEvent;

    fn event_type(&self) -> &'static str {
        match self {
            EmployeeEvent::Registered(_) => "EmployeeRegistered",
            EmployeeEvent::ProfileUpdated(_) => "EmployeeProfileUpdated",
            EmployeeEvent::Deactivated(_) => "EmployeeDeactivated",
            EmployeeEvent::Reactivated(_) => "EmployeeReactivated",
            EmployeeEvent::Deleted(_) => "EmployeeDeleted",
        }
    }

    fn into_payload(self) -> MaintenanceEvent {
        MaintenanceEvent::Employee(self)
    }

    fn from_payload(payload: &MaintenanceEvent) -> Option<&Self> {
        match payload {
            MaintenanceEvent::Employee(event) => Some(event),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EmployeeRegistered {
    pub document_id: String,
    pub first_name: String,
    pub last_name: String,
    pub position: String,
    pub email: Option<String>,
}

/// Employee Profile Updated - Only the given fields change
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EmployeeProfileUpdated {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
    pub email: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EmployeeDeactivated {
    pub reason: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EmployeeReactivated {}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EmployeeDeleted {}
