use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::EquipmentCommand;
use super::errors::EquipmentError;
use super::events::*;
use super::value_objects::{EquipmentStatus, MaintenanceEntry};
use crate::domain::EntityType;
use crate::event_sourcing::core::{Aggregate, EventContext};

// ============================================================================
// Equipment Aggregate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentAggregate {
    // Identity
    pub id: Uuid,
    pub version: i64,

    // Current State (derived from events)
    pub code: String,
    pub name: String,
    pub area: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub status: EquipmentStatus,
    pub last_maintenance: Option<MaintenanceEntry>,
    pub maintenance_count: u32,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub deleted: bool,
    pub deleted_reason: Option<String>,
}

fn required(field: &'static str, value: &str) -> Result<String, EquipmentError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EquipmentError::EmptyField(field));
    }
    Ok(value.to_string())
}

impl Aggregate for EquipmentAggregate {
    type Event = EquipmentEvent;
    type Command = EquipmentCommand;
    type Error = EquipmentError;

    fn entity_type() -> EntityType {
        EntityType::Equipment
    }

    fn apply_first_event(ctx: &EventContext, event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            EquipmentEvent::Registered(e) => Ok(Self {
                id: ctx.stream_id,
                version: ctx.stream_version,
                code: e.code.clone(),
                name: e.name.clone(),
                area: e.area.clone(),
                manufacturer: e.manufacturer.clone(),
                model: e.model.clone(),
                serial_number: e.serial_number.clone(),
                status: EquipmentStatus::Operativo,
                last_maintenance: None,
                maintenance_count: 0,
                created_at: ctx.occurred_at,
                updated_at: ctx.occurred_at,
                deleted: false,
                deleted_reason: None,
            }),
            _ => Err(EquipmentError::NotInitialized),
        }
    }

    fn apply_event(&mut self, ctx: &EventContext, event: &Self::Event) -> Result<(), Self::Error> {
        if self.deleted {
            return Err(EquipmentError::Deleted);
        }

        match event {
            EquipmentEvent::Registered(_) => return Err(EquipmentError::AlreadyExists),
            EquipmentEvent::DetailsUpdated(e) => {
                if let Some(name) = &e.name {
                    self.name = name.clone();
                }
                if let Some(area) = &e.area {
                    self.area = area.clone();
                }
                if let Some(manufacturer) = &e.manufacturer {
                    self.manufacturer = Some(manufacturer.clone());
                }
                if let Some(model) = &e.model {
                    self.model = Some(model.clone());
                }
                if let Some(serial_number) = &e.serial_number {
                    self.serial_number = Some(serial_number.clone());
                }
            }
            EquipmentEvent::StatusChanged(e) => {
                self.status = e.status;
            }
            EquipmentEvent::MaintenanceRecorded(e) => {
                // Records may arrive out of order; keep the latest one
                let newer = self
                    .last_maintenance
                    .as_ref()
                    .map_or(true, |last| e.performed_at >= last.performed_at);
                if newer {
                    self.last_maintenance = Some(MaintenanceEntry {
                        work_order_id: e.work_order_id,
                        performed_at: e.performed_at,
                    });
                }
                self.maintenance_count += 1;
            }
            EquipmentEvent::Deleted(e) => {
                self.deleted = true;
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
        let equipment = match (state, command) {
            (
                None,
                EquipmentCommand::RegisterEquipment {
                    code,
                    name,
                    area,
                    manufacturer,
                    model,
                    serial_number,
                },
            ) => {
                return Ok(vec![EquipmentEvent::Registered(EquipmentRegistered {
                    code: required("code", code)?.to_uppercase(),
                    name: required("name", name)?,
                    area: required("area", area)?,
                    manufacturer: manufacturer.clone(),
                    model: model.clone(),
                    serial_number: serial_number.clone(),
                })]);
            }
            (Some(_), EquipmentCommand::RegisterEquipment { .. }) => return Err(EquipmentError::AlreadyExists),
            (None, _) => return Err(EquipmentError::NotFound),
            (Some(equipment), _) => equipment,
        };

        if equipment.deleted {
            return Err(EquipmentError::Deleted);
        }

        match command {
            EquipmentCommand::RegisterEquipment { .. } => Err(EquipmentError::AlreadyExists),

            EquipmentCommand::UpdateDetails { name, area, manufacturer, model, serial_number } => {
                if name.is_none()
                    && area.is_none()
                    && manufacturer.is_none()
                    && model.is_none()
                    && serial_number.is_none()
                {
                    return Err(EquipmentError::NothingToUpdate);
                }

                Ok(vec![EquipmentEvent::DetailsUpdated(EquipmentDetailsUpdated {
                    name: name.as_deref().map(|v| required("name", v)).transpose()?,
                    area: area.as_deref().map(|v| required("area", v)).transpose()?,
                    manufacturer: manufacturer.clone(),
                    model: model.clone(),
                    serial_number: serial_number.clone(),
                })])
            }

            EquipmentCommand::ChangeStatus { status } => {
                if equipment.status == *status {
                    return Err(EquipmentError::StatusUnchanged(*status));
                }
                Ok(vec![EquipmentEvent::StatusChanged(EquipmentStatusChanged { status: *status })])
            }

            EquipmentCommand::RecordMaintenance { work_order_id, performed_at } => {
                Ok(vec![EquipmentEvent::MaintenanceRecorded(MaintenanceRecorded {
                    work_order_id: *work_order_id,
                    performed_at: *performed_at,
                })])
            }

            EquipmentCommand::DeleteEquipment { reason } => {
                Ok(vec![EquipmentEvent::Deleted(EquipmentDeleted { reason: reason.clone() })])
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ctx(id: Uuid, version: i64) -> EventContext {
        EventContext {
            stream_id: id,
            stream_version: version,
            occurred_at: Utc.with_ymd_and_hms(2024, 5, 2, 14, 30, 0).unwrap(),
        }
    }

    fn registered() -> EquipmentAggregate {
        let command = EquipmentCommand::RegisterEquipment {
            code: "cmp-01".to_string(),
            name: "Compresor de tornillo".to_string(),
            area: "Sala de máquinas".to_string(),
            manufacturer: Some("Atlas Copco".to_string()),
            model: None,
            serial_number: None,
        };
        let events = EquipmentAggregate::handle_command(None, &command).unwrap();
        EquipmentAggregate::apply_first_event(&ctx(Uuid::new_v4(), 1), &events[0]).unwrap()
    }

    fn apply(equipment: &mut EquipmentAggregate, command: EquipmentCommand) -> Result<(), EquipmentError> {
        for event in EquipmentAggregate::handle_command(Some(&*equipment), &command)? {
            let next = equipment.version + 1;
            equipment.apply_event(&ctx(equipment.id, next), &event)?;
        }
        Ok(())
    }

    #[test]
    fn test_register_equipment() {
        let equipment = registered();
        assert_eq!(equipment.code, "CMP-01");
        assert_eq!(equipment.status, EquipmentStatus::Operativo);
        assert_eq!(equipment.maintenance_count, 0);
    }

    #[test]
    fn test_status_change_must_change_something() {
        let mut equipment = registered();
        apply(&mut equipment, EquipmentCommand::ChangeStatus { status: EquipmentStatus::EnMantenimiento }).unwrap();
        assert_eq!(equipment.status, EquipmentStatus::EnMantenimiento);

        assert_eq!(
            apply(&mut equipment, EquipmentCommand::ChangeStatus { status: EquipmentStatus::EnMantenimiento }),
            Err(EquipmentError::StatusUnchanged(EquipmentStatus::EnMantenimiento))
        );
    }

    #[test]
    fn test_latest_maintenance_wins() {
        let mut equipment = registered();
        let recent = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let older = recent - Duration::days(30);
        let recent_order = Uuid::new_v4();

        apply(
            &mut equipment,
            EquipmentCommand::RecordMaintenance { work_order_id: recent_order, performed_at: recent },
        )
        .unwrap();
        apply(
            &mut equipment,
            EquipmentCommand::RecordMaintenance { work_order_id: Uuid::new_v4(), performed_at: older },
        )
        .unwrap();

        assert_eq!(equipment.maintenance_count, 2);
        assert_eq!(
            equipment.last_maintenance,
            Some(MaintenanceEntry { work_order_id: recent_order, performed_at: recent })
        );
    }

    #[test]
    fn test_deleted_equipment_rejects_changes() {
        let mut equipment = registered();
        apply(&mut equipment, EquipmentCommand::DeleteEquipment { reason: Some("Dado de baja".to_string()) }).unwrap();
        assert!(equipment.deleted);
        assert_eq!(
            apply(&mut equipment, EquipmentCommand::ChangeStatus { status: EquipmentStatus::Operativo }),
            Err(EquipmentError::Deleted)
        );
    }

    #[test]
    fn test_blank_update_field_is_rejected() {
        let equipment = registered();
        let result = EquipmentAggregate::handle_command(
            Some(&equipment),
            &EquipmentCommand::UpdateDetails {
                name: Some(" ".to_string()),
                area: None,
                manufacturer: None,
                model: None,
                serial_number: None,
            },
        );
        assert_eq!(result, Err(EquipmentError::EmptyField("name")));
    }
}
