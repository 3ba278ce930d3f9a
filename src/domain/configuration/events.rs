use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::domain::modules::detail;
use crate::domain::MaintenanceEvent;
use crate::event_sourcing::core::DomainEvent;

// ============================================================================
// Configuration Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ConfigurationEvent {
    #[serde(rename = "ConfigurationInitialized")]
    Initialized(ConfigurationInitialized),
    #[serde(rename = "SettingChanged")]
    SettingChanged(SettingChanged),
    #[serde(rename = "SettingRemoved")]
    SettingRemoved(SettingRemoved),
}

pub const EVENT_TYPES: &[&str] = &["ConfigurationInitialized", "SettingChanged", "SettingRemoved"];

impl ConfigurationEvent {
    pub fn audit_detail(&self) -> BTreeMap<String, Value> {
        match self {
            ConfigurationEvent::Initialized(e) => detail([
                ("company_name", json!(e.company_name)),
                ("settings", json!(e.settings)),
            ]),
            ConfigurationEvent::SettingChanged(e) => detail([
                ("key", json!(e.key)),
                ("value", json!(e.value)),
            ]),
            ConfigurationEvent::SettingRemoved(e) => detail([("key", json!(e.key))]),
        }
    }
}

impl DomainEvent for ConfigurationEvent {
    type Payload = MaintenanceEvent;

    fn event_type(&self) -> &'static str {
        match self {
            ConfigurationEvent::Initialized(_) => "ConfigurationInitialized",
            ConfigurationEvent::SettingChanged(_) => "SettingChanged",
            ConfigurationEvent::SettingRemoved(_) => "SettingRemoved",
        }
    }

    fn into_payload(self) -> MaintenanceEvent {
        MaintenanceEvent::Configuration(self)
    }

    fn from_payload(payload: &MaintenanceEvent) -> Option<&Self> {
        match payload {
            MaintenanceEvent::Configuration(event) => Some(event),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConfigurationInitialized {
    pub company_name: String,
    pub settings: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SettingChanged {
    pub key: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SettingRemoved {
    pub key: String,
}
