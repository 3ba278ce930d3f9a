// ============================================================================
// Domain Layer - Machinery Maintenance Business Logic
// ============================================================================
//
// This module contains domain-specific aggregates and business logic.
// Each aggregate has its own subdirectory with:
// - Value objects
// - Events
// - Commands
// - Errors
// - Aggregate implementation
//
// The tagged payload, the entity tags and the registry plugging this domain
// into the generic engine live here.
//
// ============================================================================

pub mod command_handler;
pub mod configuration;
pub mod employee;
pub mod equipment;
pub mod modules;
pub mod routine;
pub mod user;
pub mod work_order;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::event_sourcing::core::{DomainEvent, EntityTag, EventEnvelope, EventPayload};
use crate::event_sourcing::error::StoreResult;
use crate::event_sourcing::projection::{fold_document, Snapshot};
use crate::event_sourcing::registry::DomainRegistry;
use crate::event_sourcing::store::EventStore;

pub use command_handler::{CommandError, CommandHandler, CommandMetadata, CommandOutcome, CommandResult};
pub use modules::BusinessModule;

use configuration::{ConfigurationAggregate, ConfigurationEvent};
use employee::{EmployeeAggregate, EmployeeEvent};
use equipment::{EquipmentAggregate, EquipmentEvent};
use routine::{RoutineAggregate, RoutineEvent};
use user::{UserAggregate, UserEvent};
use work_order::{WorkOrderAggregate, WorkOrderEvent};

/// The engine wired to this domain
pub type MaintenanceStore = EventStore<MaintenanceDomain>;

// ============================================================================
// Entity Tags
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    WorkOrder,
    Equipment,
    Routine,
    Employee,
    User,
    Configuration,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::WorkOrder,
        EntityType::Equipment,
        EntityType::Routine,
        EntityType::Employee,
        EntityType::User,
        EntityType::Configuration,
    ];
}

impl EntityTag for EntityType {
    fn as_str(&self) -> &'static str {
        match self {
            EntityType::WorkOrder => "WorkOrder",
            EntityType::Equipment => "Equipment",
            EntityType::Routine => "Routine",
            EntityType::Employee => "Employee",
            EntityType::User => "User",
            EntityType::Configuration => "Configuration",
        }
    }

    fn parse_tag(tag: &str) -> Option<Self> {
        EntityType::ALL.into_iter().find(|entity| entity.as_str() == tag)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tagged Payload - One Variant per Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "event")]
pub enum MaintenanceEvent {
    WorkOrder(WorkOrderEvent),
    Equipment(EquipmentEvent),
    Routine(RoutineEvent),
    Employee(EmployeeEvent),
    User(UserEvent),
    Configuration(ConfigurationEvent),
}

impl MaintenanceEvent {
    /// Fields this event contributes to its audit record
    pub fn audit_detail(&self) -> BTreeMap<String, Value> {
        match self {
            MaintenanceEvent::WorkOrder(e) => e.audit_detail(),
            MaintenanceEvent::Equipment(e) => e.audit_detail(),
            MaintenanceEvent::Routine(e) => e.audit_detail(),
            MaintenanceEvent::Employee(e) => e.audit_detail(),
            MaintenanceEvent::User(e) => e.audit_detail(),
            MaintenanceEvent::Configuration(e) => e.audit_detail(),
        }
    }
}

impl EventPayload for MaintenanceEvent {
    type Entity = EntityType;
    type Module = BusinessModule;

    fn entity(&self) -> EntityType {
        match self {
            MaintenanceEvent::WorkOrder(_) => EntityType::WorkOrder,
            MaintenanceEvent::Equipment(_) => EntityType::Equipment,
            MaintenanceEvent::Routine(_) => EntityType::Routine,
            MaintenanceEvent::Employee(_) => EntityType::Employee,
            MaintenanceEvent::User(_) => EntityType::User,
            MaintenanceEvent::Configuration(_) => EntityType::Configuration,
        }
    }

    fn event_type(&self) -> &'static str {
        match self {
            MaintenanceEvent::WorkOrder(e) => e.event_type(),
            MaintenanceEvent::Equipment(e) => e.event_type(),
            MaintenanceEvent::Routine(e) => e.event_type(),
            MaintenanceEvent::Employee(e) => e.event_type(),
            MaintenanceEvent::User(e) => e.event_type(),
            MaintenanceEvent::Configuration(e) => e.event_type(),
        }
    }
}

// ============================================================================
// Domain Registry
// ============================================================================

/// Plugs the maintenance aggregates and their business modules into the engine.
pub struct MaintenanceDomain;

impl DomainRegistry for MaintenanceDomain {
    type Payload = MaintenanceEvent;

    fn fold(
        entity: EntityType,
        current: Option<&Snapshot<EntityType>>,
        events: &[EventEnvelope<MaintenanceEvent>],
    ) -> StoreResult<Snapshot<EntityType>> {
        match entity {
            EntityType::WorkOrder => fold_document::<WorkOrderAggregate>(current, events),
            EntityType::Equipment => fold_document::<EquipmentAggregate>(current, events),
            EntityType::Routine => fold_document::<RoutineAggregate>(current, events),
            EntityType::Employee => fold_document::<EmployeeAggregate>(current, events),
            EntityType::User => fold_document::<UserAggregate>(current, events),
            EntityType::Configuration => fold_document::<ConfigurationAggregate>(current, events),
        }
    }

    fn classify(payload: &MaintenanceEvent) -> Option<BusinessModule> {
        Some(payload.module())
    }

    fn audit_detail(payload: &MaintenanceEvent) -> BTreeMap<String, Value> {
        payload.audit_detail()
    }
}
