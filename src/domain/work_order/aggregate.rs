use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::commands::WorkOrderCommand;
use super::errors::WorkOrderError;
use super::events::*;
use super::value_objects::{WorkOrderStatus, MAX_PROGRESS};
use crate::domain::EntityType;
use crate::event_sourcing::core::{Aggregate, EventContext};

// ============================================================================
// Work Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderAggregate {
    // Identity
    pub id: Uuid,
    pub version: i64,

    // Current State (derived from events)
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub equipment_id: Uuid,
    pub routine_id: Option<Uuid>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub assigned_employees: BTreeSet<Uuid>,
    pub status: WorkOrderStatus,
    pub progress: u8,
    pub observations: Option<String>,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    // Optional fields
    pub deleted_reason: Option<String>,
}

impl WorkOrderAggregate {
    /// Orders that still accept changes other than deletion
    fn ensure_open(&self, action: &'static str) -> Result<(), WorkOrderError> {
        match self.status {
            WorkOrderStatus::Eliminada => Err(WorkOrderError::Deleted),
            WorkOrderStatus::EjecucionCompleta if action == "complete" => Err(WorkOrderError::AlreadyCompleted),
            WorkOrderStatus::EjecucionCompleta => Err(WorkOrderError::InvalidStatusTransition {
                action,
                status: self.status,
            }),
            WorkOrderStatus::Activa | WorkOrderStatus::EnProceso => Ok(()),
        }
    }

    fn validate_progress(&self, percentage: u8) -> Result<(), WorkOrderError> {
        if percentage > MAX_PROGRESS {
            return Err(WorkOrderError::InvalidProgress(percentage));
        }
        if percentage < self.progress {
            return Err(WorkOrderError::ProgressDecreased {
                current: self.progress,
                requested: percentage,
            });
        }
        Ok(())
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<(), WorkOrderError> {
    if value.trim().is_empty() {
        return Err(WorkOrderError::EmptyField(field));
    }
    Ok(())
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for WorkOrderAggregate {
    type Event = WorkOrderEvent;
    type Command = WorkOrderCommand;
    type Error = WorkOrderError;

    fn entity_type() -> EntityType {
        EntityType::WorkOrder
    }

    fn apply_first_event(ctx: &EventContext, event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            WorkOrderEvent::Created(e) => Ok(Self {
                id: ctx.stream_id,
                version: ctx.stream_version,
                code: e.code.clone(),
                title: e.title.clone(),
                description: e.description.clone(),
                equipment_id: e.equipment_id,
                routine_id: e.routine_id,
                scheduled_for: e.scheduled_for,
                assigned_employees: BTreeSet::new(),
                status: WorkOrderStatus::Activa,
                progress: 0,
                observations: None,
                created_at: ctx.occurred_at,
                updated_at: ctx.occurred_at,
                started_at: None,
                completed_at: None,
                deleted_reason: None,
            }),
            _ => Err(WorkOrderError::NotInitialized),
        }
    }

    fn apply_event(&mut self, ctx: &EventContext, event: &Self::Event) -> Result<(), Self::Error> {
        if self.status.is_deleted() {
            return Err(WorkOrderError::Deleted);
        }

        match event {
            WorkOrderEvent::Created(_) => return Err(WorkOrderError::AlreadyExists),
            WorkOrderEvent::DetailsUpdated(e) => {
                self.ensure_open("update")?;
                if let Some(title) = &e.title {
                    self.title = title.clone();
                }
                if let Some(description) = &e.description {
                    self.description = Some(description.clone());
                }
                if let Some(scheduled_for) = e.scheduled_for {
                    self.scheduled_for = Some(scheduled_for);
                }
            }
            WorkOrderEvent::EmployeesAssigned(e) => {
                self.ensure_open("assign")?;
                self.assigned_employees.extend(e.employee_ids.iter().copied());
            }
            WorkOrderEvent::Started(_) => {
                self.ensure_open("start")?;
                if self.status != WorkOrderStatus::Activa {
                    return Err(WorkOrderError::InvalidStatusTransition {
                        action: "start",
                        status: self.status,
                    });
                }
                self.status = WorkOrderStatus::EnProceso;
                self.started_at = Some(ctx.occurred_at);
            }
            WorkOrderEvent::ProgressRecorded(e) => {
                self.ensure_open("record progress on")?;
                self.validate_progress(e.percentage)?;
                self.progress = e.percentage;
                if self.status == WorkOrderStatus::Activa {
                    self.status = WorkOrderStatus::EnProceso;
                    self.started_at.get_or_insert(ctx.occurred_at);
                }
            }
            WorkOrderEvent::ExecutionCompleted(e) => {
                if self.status.is_completed() {
                    return Err(WorkOrderError::AlreadyCompleted);
                }
                self.status = WorkOrderStatus::EjecucionCompleta;
                self.progress = MAX_PROGRESS;
                self.observations = e.observations.clone();
                self.completed_at = Some(ctx.occurred_at);
            }
            WorkOrderEvent::Deleted(e) => {
                self.status = WorkOrderStatus::Eliminada;
                self.deleted_reason = e.reason.clone();
            }
        }

        self.version = ctx.stream_version;
        self.updated_at = ctx.occurred_at;
        Ok(())
    }

    fn handle_command(
        state: Option<&Self>,
        command: &Self::Command,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        let order = match (state, command) {
            (
                None,
                WorkOrderCommand::CreateWorkOrder {
                    code,
                    title,
                    description,
                    equipment_id,
                    routine_id,
                    scheduled_for,
                },
            ) => {
                non_empty("code", code)?;
                non_empty("title", title)?;

                return Ok(vec![WorkOrderEvent::Created(WorkOrderCreated {
                    code: code.trim().to_string(),
                    title: title.trim().to_string(),
                    description: description.clone(),
                    equipment_id: *equipment_id,
                    routine_id: *routine_id,
                    scheduled_for: *scheduled_for,
                })]);
            }
            (Some(_), WorkOrderCommand::CreateWorkOrder { .. }) => return Err(WorkOrderError::AlreadyExists),
            (None, _) => return Err(WorkOrderError::NotFound),
            (Some(order), _) => order,
        };

        match command {
            WorkOrderCommand::CreateWorkOrder { .. } => Err(WorkOrderError::AlreadyExists),

            WorkOrderCommand::UpdateDetails { title, description, scheduled_for } => {
                order.ensure_open("update")?;
                if let Some(title) = title {
                    non_empty("title", title)?;
                }
                if title.is_none() && description.is_none() && scheduled_for.is_none() {
                    return Err(WorkOrderError::NothingToUpdate);
                }

                Ok(vec![WorkOrderEvent::DetailsUpdated(WorkOrderDetailsUpdated {
                    title: title.as_ref().map(|t| t.trim().to_string()),
                    description: description.clone(),
                    scheduled_for: *scheduled_for,
                })])
            }

            WorkOrderCommand::AssignEmployees { employee_ids } => {
                order.ensure_open("assign")?;
                let new_ids: BTreeSet<Uuid> = employee_ids
                    .iter()
                    .copied()
                    .filter(|id| !order.assigned_employees.contains(id))
                    .collect();
                if employee_ids.is_empty() {
                    return Err(WorkOrderError::NoEmployees);
                }
                if new_ids.is_empty() {
                    return Err(WorkOrderError::NothingToUpdate);
                }

                Ok(vec![WorkOrderEvent::EmployeesAssigned(EmployeesAssigned {
                    employee_ids: new_ids.into_iter().collect(),
                })])
            }

            WorkOrderCommand::StartWork => {
                order.ensure_open("start")?;
                if order.status != WorkOrderStatus::Activa {
                    return Err(WorkOrderError::InvalidStatusTransition {
                        action: "start",
                        status: order.status,
                    });
                }

                Ok(vec![WorkOrderEvent::Started(WorkStarted {})])
            }

            WorkOrderCommand::RecordProgress { percentage, note } => {
                order.ensure_open("record progress on")?;
                order.validate_progress(*percentage)?;

                Ok(vec![WorkOrderEvent::ProgressRecorded(ProgressRecorded {
                    percentage: *percentage,
                    note: note.clone(),
                })])
            }

            WorkOrderCommand::CompleteExecution { observations } => {
                order.ensure_open("complete")?;

                Ok(vec![WorkOrderEvent::ExecutionCompleted(ExecutionCompleted {
                    observations: observations.clone(),
                })])
            }

            WorkOrderCommand::DeleteWorkOrder { reason } => {
                if order.status.is_deleted() {
                    return Err(WorkOrderError::Deleted);
                }

                Ok(vec![WorkOrderEvent::Deleted(WorkOrderDeleted {
                    reason: reason.clone(),
                })])
            }
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
