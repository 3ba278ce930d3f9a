use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::commands::ConfigurationCommand;
use super::errors::ConfigurationError;
use super::events::*;
use crate::domain::EntityType;
use crate::event_sourcing::core::{Aggregate, EventContext};

// ============================================================================
// Configuration Aggregate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationAggregate {
    pub id: Uuid,
    pub version: i64,

    pub company_name: String,
    pub settings: BTreeMap<String, String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConfigurationAggregate {
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}

impl Aggregate for ConfigurationAggregate {
    type Event = ConfigurationEvent;
    type Command = ConfigurationCommand;
    type Error = ConfigurationError;

    fn entity_type() -> EntityType {
        EntityType::Configuration
    }

    fn apply_first_event(ctx: &EventContext, event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            ConfigurationEvent::Initialized(e) => Ok(Self {
                id: ctx.stream_id,
                version: ctx.stream_version,
                company_name: e.company_name.clone(),
                settings: e.settings.clone(),
                created_at: ctx.occurred_at,
                updated_at: ctx.occurred_at,
            }),
            _ => Err(ConfigurationError::NotInitialized),
        }
    }

    fn apply_event(&mut self, ctx: &EventContext, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            ConfigurationEvent::Initialized(_) => return Err(ConfigurationError::AlreadyInitialized),
            ConfigurationEvent::SettingChanged(e) => {
                self.settings.insert(e.key.clone(), e.value.clone());
            }
            ConfigurationEvent::SettingRemoved(e) => {
                self.settings.remove(&e.key);
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
        match (state, command) {
            (None, ConfigurationCommand::Initialize { company_name, settings }) => {
                if company_name.trim().is_empty() {
                    return Err(ConfigurationError::EmptyCompanyName);
                }
                if settings.keys().any(|k| k.trim().is_empty()) {
                    return Err(ConfigurationError::EmptyKey);
                }

                Ok(vec![ConfigurationEvent::Initialized(ConfigurationInitialized {
                    company_name: company_name.trim().to_string(),
                    settings: settings.clone(),
                })])
            }
            (Some(_), ConfigurationCommand::Initialize { .. }) => Err(ConfigurationError::AlreadyInitialized),
            (None, _) => Err(ConfigurationError::NotInitialized),

            (Some(config), ConfigurationCommand::ChangeSetting { key, value }) => {
                if key.trim().is_empty() {
                    return Err(ConfigurationError::EmptyKey);
                }
                if config.setting(key) == Some(value.as_str()) {
                    return Err(ConfigurationError::Unchanged(key.clone()));
                }

                Ok(vec![ConfigurationEvent::SettingChanged(SettingChanged {
                    key: key.clone(),
                    value: value.clone(),
                })])
            }

            (Some(config), ConfigurationCommand::RemoveSetting { key }) => {
                if !config.settings.contains_key(key) {
                    return Err(ConfigurationError::UnknownSetting(key.clone()));
                }

                Ok(vec![ConfigurationEvent::SettingRemoved(SettingRemoved { key: key.clone() })])
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
