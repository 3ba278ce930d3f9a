use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::commands::RoutineCommand;
use super::errors::RoutineError;
use super::events::*;
use crate::domain::EntityType;
use crate::event_sourcing::core::{Aggregate, EventContext};

// ============================================================================
// Routine Aggregate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineAggregate {
    pub id: Uuid,
    pub version: i64,

    pub name: String,
    pub description: Option<String>,
    pub frequency_days: u32,
    pub tasks: Vec<String>,
    pub equipment_ids: BTreeSet<Uuid>,
    pub deleted: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn validate_frequency(days: u32) -> Result<(), RoutineError> {
    if days < 1 {
        return Err(RoutineError::InvalidFrequency(days));
    }
    Ok(())
}

fn clean_tasks(tasks: &[String]) -> Vec<String> {
    tasks
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl Aggregate for RoutineAggregate {
    type Event = RoutineEvent;
    type Command = RoutineCommand;
    type Error = RoutineError;

    fn entity_type() -> EntityType {
        EntityType::Routine
    }

    fn apply_first_event(ctx: &EventContext, event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            RoutineEvent::Created(e) => Ok(Self {
                id: ctx.stream_id,
                version: ctx.stream_version,
                name: e.name.clone(),
                description: e.description.clone(),
                frequency_days: e.frequency_days,
                tasks: e.tasks.clone(),
                equipment_ids: BTreeSet::new(),
                deleted: false,
                created_at: ctx.occurred_at,
                updated_at: ctx.occurred_at,
            }),
            _ => Err(RoutineError::NotInitialized),
        }
    }

    fn apply_event(&mut self, ctx: &EventContext, event: &Self::Event) -> Result<(), Self::Error> {
        if self.deleted {
            return Err(RoutineError::Deleted);
        }

        match event {
            RoutineEvent::Created(_) => return Err(RoutineError::AlreadyExists),
            RoutineEvent::Updated(e) => {
                if let Some(name) = &e.name {
                    self.name = name.clone();
                }
                if let Some(description) = &e.description {
                    self.description = Some(description.clone());
                }
                if let Some(days) = e.frequency_days {
                    self.frequency_days = days;
                }
                if let Some(tasks) = &e.tasks {
                    self.tasks = tasks.clone();
                }
            }
            RoutineEvent::EquipmentLinked(e) => {
                self.equipment_ids.insert(e.equipment_id);
            }
            RoutineEvent::EquipmentUnlinked(e) => {
                self.equipment_ids.remove(&e.equipment_id);
            }
            RoutineEvent::Deleted(_) => {
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
        let routine = match (state, command) {
            (None, RoutineCommand::CreateRoutine { name, description, frequency_days, tasks }) => {
                if name.trim().is_empty() {
                    return Err(RoutineError::EmptyName);
                }
                validate_frequency(*frequency_days)?;

                return Ok(vec![RoutineEvent::Created(RoutineCreated {
                    name: name.trim().to_string(),
                    description: description.clone(),
                    frequency_days: *frequency_days,
                    tasks: clean_tasks(tasks),
                })]);
            }
            (Some(_), RoutineCommand::CreateRoutine { .. }) => return Err(RoutineError::AlreadyExists),
            (None, _) => return Err(RoutineError::NotFound),
            (Some(routine), _) => routine,
        };

        if routine.deleted {
            return Err(RoutineError::Deleted);
        }

        match command {
            RoutineCommand::CreateRoutine { .. } => Err(RoutineError::AlreadyExists),

            RoutineCommand::UpdateRoutine { name, description, frequency_days, tasks } => {
                if let Some(name) = name {
                    if name.trim().is_empty() {
                        return Err(RoutineError::EmptyName);
                    }
                }
                if let Some(days) = frequency_days {
                    validate_frequency(*days)?;
                }
                if name.is_none() && description.is_none() && frequency_days.is_none() && tasks.is_none() {
                    return Err(RoutineError::NothingToUpdate);
                }

                Ok(vec![RoutineEvent::Updated(RoutineUpdated {
                    name: name.as_ref().map(|n| n.trim().to_string()),
                    description: description.clone(),
                    frequency_days: *frequency_days,
                    tasks: tasks.as_deref().map(clean_tasks),
                })])
            }

            RoutineCommand::LinkEquipment { equipment_id } => {
                if routine.equipment_ids.contains(equipment_id) {
                    return Err(RoutineError::AlreadyLinked(*equipment_id));
                }
                Ok(vec![RoutineEvent::EquipmentLinked(EquipmentLinked {
                    equipment_id: *equipment_id,
                })])
            }

            RoutineCommand::UnlinkEquipment { equipment_id } => {
                if !routine.equipment_ids.contains(equipment_id) {
                    return Err(RoutineError::NotLinked(*equipment_id));
                }
                Ok(vec![RoutineEvent::EquipmentUnlinked(EquipmentUnlinked {
                    equipment_id: *equipment_id,
                })])
            }

            RoutineCommand::DeleteRoutine => Ok(vec![RoutineEvent::Deleted(RoutineDeleted {})]),
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}
