use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::{EntityType, MaintenanceEvent};
use crate::event_sourcing::core::ModuleTag;

// ============================================================================
// Business Modules - Audit Classification
// ============================================================================
//
// Every payload variant belongs to exactly one business module. The mapping
// is an exhaustive match, so a new entity cannot compile without one.
// `Unclassified` is only produced for payloads a registry declines to
// classify, never dropped.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusinessModule {
    #[serde(rename = "work_orders")]
    OrdenesDeTrabajo,
    #[serde(rename = "equipment")]
    Equipos,
    #[serde(rename = "employees")]
    Empleados,
    #[serde(rename = "configuration")]
    Configuracion,
    #[serde(rename = "users")]
    Usuarios,
    #[serde(rename = "routines")]
    Rutinas,
    #[serde(rename = "unclassified")]
    Unclassified,
}

impl BusinessModule {
    pub const ALL: [BusinessModule; 7] = [
        BusinessModule::OrdenesDeTrabajo,
        BusinessModule::Equipos,
        BusinessModule::Empleados,
        BusinessModule::Configuracion,
        BusinessModule::Usuarios,
        BusinessModule::Rutinas,
        BusinessModule::Unclassified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessModule::OrdenesDeTrabajo => "work_orders",
            BusinessModule::Equipos => "equipment",
            BusinessModule::Empleados => "employees",
            BusinessModule::Configuracion => "configuration",
            BusinessModule::Usuarios => "users",
            BusinessModule::Rutinas => "routines",
            BusinessModule::Unclassified => "unclassified",
        }
    }

    /// Module owning every event of an entity's streams
    pub fn for_entity(entity: EntityType) -> Self {
        match entity {
            EntityType::WorkOrder => BusinessModule::OrdenesDeTrabajo,
            EntityType::Equipment => BusinessModule::Equipos,
            EntityType::Routine => BusinessModule::Rutinas,
            EntityType::Employee => BusinessModule::Empleados,
            EntityType::User => BusinessModule::Usuarios,
            EntityType::Configuration => BusinessModule::Configuracion,
        }
    }
}

impl ModuleTag for BusinessModule {
    const UNCLASSIFIED: Self = BusinessModule::Unclassified;

    fn as_str(&self) -> &'static str {
        BusinessModule::as_str(self)
    }

    fn parse_tag(tag: &str) -> Option<Self> {
        BusinessModule::ALL.into_iter().find(|module| module.as_str() == tag)
    }
}

impl fmt::Display for BusinessModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MaintenanceEvent {
    /// Business module this event is audited under
    pub fn module(&self) -> BusinessModule {
        match self {
            MaintenanceEvent::WorkOrder(_) => BusinessModule::OrdenesDeTrabajo,
            MaintenanceEvent::Equipment(_) => BusinessModule::Equipos,
            MaintenanceEvent::Routine(_) => BusinessModule::Rutinas,
            MaintenanceEvent::Employee(_) => BusinessModule::Empleados,
            MaintenanceEvent::User(_) => BusinessModule::Usuarios,
            MaintenanceEvent::Configuration(_) => BusinessModule::Configuracion,
        }
    }
}

/// Build an audit detail map; `null` values are left out
pub(crate) fn detail<const N: usize>(fields: [(&str, Value); N]) -> BTreeMap<String, Value> {
    fields
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
