use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::EmployeeCommand;
use super::errors::EmployeeError;
use super::events::*;
use crate::domain::EntityType;
use crate::event_sourcing::core::{Aggregate, EventContext};

// ============================================================================
// Employee Aggregate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeAggregate {
    pub id: Uuid,
    pub version: i64,

    pub document_id: String,
    pub first_name: String,
    pub last_name: String,
    pub position: String,
    pub email: Option<String>,

    pub active: bool,
    pub deactivation_reason: Option<String>,
    pub deleted: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmployeeAggregate {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

fn required(field: &'static str, value: &str) -> Result<String, EmployeeError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EmployeeError::EmptyField(field));
    }
    Ok(value.to_string())
}

fn validate_email(email: &str) -> Result<String, EmployeeError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((user, domain)) if !user.is_empty() && domain.contains('.') => Ok(email.to_lowercase()),
        _ => Err(EmployeeError::InvalidEmail(email.to_string())),
    }
}

impl Aggregate for EmployeeAggregate {
    type Event = EmployeeEvent;
    type Command = EmployeeCommand;
    type Error = EmployeeError;

    fn entity_type() -> EntityType {
        EntityType::Employee
    }

    fn apply_first_event(ctx: &EventContext, event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            EmployeeEvent::Registered(e) => Ok(Self {
                id: ctx.stream_id,
                version: ctx.stream_version,
                document_id: e.document_id.clone(),
                first_name: e.first_name.clone(),
                last_name: e.last_name.clone(),
                position: e.position.clone(),
                email: e.email.clone(),
                active: true,
                deactivation_reason: None,
                deleted: false,
                created_at: ctx.occurred_at,
                updated_at: ctx.occurred_at,
            }),
            _ => Err(EmployeeError::NotInitialized),
        }
    }

    fn apply_event(&mut self, ctx: &EventContext, event: &Self::Event) -> Result<(), Self::Error> {
        if self.deleted {
            return Err(EmployeeError::Deleted);
        }

        match event {
            EmployeeEvent::Registered(_) => return Err(EmployeeError::AlreadyExists),
            EmployeeEvent::ProfileUpdated(e) => {
                if let Some(first_name) = &e.first_name {
                    self.first_name = first_name.clone();
                }
                if let Some(last_name) = &e.last_name {
                    self.last_name = last_name.clone();
                }
                if let Some(position) = &e.position {
                    self.position = position.clone();
                }
                if let Some(email) = &e.email {
                    self.email = Some(email.clone());
                }
            }
            EmployeeEvent::Deactivated(e) => {
                self.active = false;
                self.deactivation_reason = Some(e.reason.clone());
            }
            EmployeeEvent::Reactivated(_) => {
                self.active = true;
                self.deactivation_reason = None;
            }
            EmployeeEvent::Deleted(_) => {
                self.active = false;
                self.deleted = true;
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
        let employee = match (state, command) {
            (
                None,
                EmployeeCommand::RegisterEmployee {
                    document_id,
                    first_name,
                    last_name,
                    position,
                    email,
                },
            ) => {
                return Ok(vec![EmployeeEvent::Registered(EmployeeRegistered {
                    document_id: required("document_id", document_id)?,
                    first_name: required("first_name", first_name)?,
                    last_name: required("last_name", last_name)?,
                    position: required("position", position)?,
                    email: email.as_deref().map(validate_email).transpose()?,
                })]);
            }
            (Some(_), EmployeeCommand::RegisterEmployee { .. }) => return Err(EmployeeError::AlreadyExists),
            (None, _) => return Err(EmployeeError::NotFound),
            (Some(employee), _) => employee,
        };

        if employee.deleted {
            return Err(EmployeeError::Deleted);
        }

        match command {
            EmployeeCommand::RegisterEmployee { .. } => Err(EmployeeError::AlreadyExists),

            EmployeeCommand::UpdateProfile { first_name, last_name, position, email } => {
                if first_name.is_none() && last_name.is_none() && position.is_none() && email.is_none() {
                    return Err(EmployeeError::NothingToUpdate);
                }

                Ok(vec![EmployeeEvent::ProfileUpdated(EmployeeProfileUpdated {
                    first_name: first_name.as_deref().map(|v| required("first_name", v)).transpose()?,
                    last_name: last_name.as_deref().map(|v| required("last_name", v)).transpose()?,
                    position: position.as_deref().map(|v| required("position", v)).transpose()?,
                    email: email.as_deref().map(validate_email).transpose()?,
                })])
            }

            EmployeeCommand::Deactivate { reason } => {
                if !employee.active {
                    return Err(EmployeeError::AlreadyInactive);
                }
                Ok(vec![EmployeeEvent::Deactivated(EmployeeDeactivated {
                    reason: required("reason", reason)?,
                })])
            }

            EmployeeCommand::Reactivate => {
                if employee.active {
                    return Err(EmployeeError::AlreadyActive);
                }
                Ok(vec![EmployeeEvent::Reactivated(EmployeeReactivated {})])
            }

            EmployeeCommand::DeleteEmployee => Ok(vec![EmployeeEvent::Deleted(EmployeeDeleted {})]),
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}
