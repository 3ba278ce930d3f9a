use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::modules::detail;
use crate::domain::MaintenanceEvent;
use crate::event_sourcing::core::DomainEvent;

// ============================================================================
// Work Order Events - Domain Events for Work Order Aggregate
// ============================================================================

/// Work Order Event - Union type for all work order events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WorkOrderEvent {
    #[serde(rename = "WorkOrderCreated")]
    Created(WorkOrderCreated),
    #[serde(rename = "WorkOrderDetailsUpdated")]
    DetailsUpdated(WorkOrderDetailsUpdated),
    #[serde(rename = "EmployeesAssigned")]
    EmployeesAssigned(EmployeesAssigned),
    #[serde(rename = "WorkStarted")]
    Started(WorkStarted),
    #[serde(rename = "ProgressRecorded")]
    ProgressRecorded(ProgressRecorded),
    #[serde(rename = "ExecutionCompleted")]
    ExecutionCompleted(ExecutionCompleted),
    #[serde(rename = "WorkOrderDeleted")]
    Deleted(WorkOrderDeleted),
}

/// Every type tag a work order stream can hold
pub const EVENT_TYPES: &[&str] = &[
    "WorkOrderCreated",
    "WorkOrderDetailsUpdated",
    "EmployeesAssigned",
    "WorkStarted",
    "ProgressRecorded",
    "ExecutionCompleted",
    "WorkOrderDeleted",
];

impl WorkOrderEvent {
    pub fn audit_detail(&self) -> BTreeMap<String, Value> {
        match self {
            WorkOrderEvent::Created(e) => detail([
                ("code", json!(e.code)),
                ("title", json!(e.title)),
                ("equipment_id", json!(e.equipment_id)),
                ("routine_id", json!(e.routine_id)),
                ("scheduled_for", json!(e.scheduled_for)),
            ]),
            WorkOrderEvent::DetailsUpdated(e) => detail([
                ("title", json!(e.title)),
                ("description", json!(e.description)),
                ("scheduled_for", json!(e.scheduled_for)),
            ]),
            WorkOrderEvent::EmployeesAssigned(e) => detail([
                ("employee_ids", json!(e.employee_ids)),
                ("count", json!(e.employee_ids.len())),
            ]),
            WorkOrderEvent::Started(_) => BTreeMap::new(),
            WorkOrderEvent::ProgressRecorded(e) => detail([
                ("percentage", json!(e.percentage)),
                ("note", json!(e.note)),
            ]),
            WorkOrderEvent::ExecutionCompleted(e) => detail([("observations", json!(e.observations))]),
            WorkOrderEvent::Deleted(e) => detail([("reason", json!(e.reason))]),
        }
    }
}

impl DomainEvent for WorkOrderEvent {
    type Payload = MaintenanceEvent;

    fn event_type(&self) -> &'static str {
        match self {
            WorkOrderEvent::Created(_) => "WorkOrderCreated",
            WorkOrderEvent::DetailsUpdated(_) => "WorkOrderDetailsUpdated",
            WorkOrderEvent::EmployeesAssigned(_) => "EmployeesAssigned",
            WorkOrderEvent::Started(_) => "WorkStarted",
            WorkOrderEvent::ProgressRecorded(_) => "ProgressRecorded",
            WorkOrderEvent::ExecutionCompleted(_) => "ExecutionCompleted",
            WorkOrderEvent::Deleted(_) => "WorkOrderDeleted",
        }
    }

    fn into_payload(self) -> MaintenanceEvent {
        MaintenanceEvent::WorkOrder(self)
    }

    fn from_payload(payload: &MaintenanceEvent) -> Option<&Self> {
        match payload {
            MaintenanceEvent::WorkOrder(event) => Some(event),
            _ => None,
        }
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

/// Work Order Created - Initial event in work order lifecycle
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WorkOrderCreated {
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub equipment_id: Uuid,
    pub routine_id: Option<Uuid>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// Work Order Details Updated - Only the given fields change
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WorkOrderDetailsUpdated {
    pub title: Option<String>,
    pub description: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// Employees Assigned - Added to the crew of the order
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EmployeesAssigned {
    pub employee_ids: Vec<Uuid>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WorkStarted {}

/// Progress Recorded - Percentage of execution reached
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProgressRecorded {
    pub percentage: u8,
    pub note: Option<String>,
}

/// Execution Completed - Work finished on site
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExecutionCompleted {
    pub observations: Option<String>,
}

/// Work Order Deleted - Logical deletion, terminal
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WorkOrderDeleted {
    pub reason: Option<String>,
}
