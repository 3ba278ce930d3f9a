use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::value_objects::UserRole;
use crate::domain::modules::detail;
use crate::domain::MaintenanceEvent;
use crate::event_sourcing::core::DomainEvent;

// ============================================================================
// User Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UserEvent {
    #[serde(rename = "UserCreated")]
    Created(UserCreated),
    #[serde(rename = "UserRoleChanged")]
    RoleChanged(UserRoleChanged),
    #[serde(rename = "PasswordChanged")]
    PasswordChanged(PasswordChanged),
    #[serde(rename = "CredentialIssued")]
    CredentialIssued(CredentialIssued),
    #[serde(rename = "CredentialRevoked")]
    CredentialRevoked(CredentialRevoked),
    #[serde(rename = "UserDisabled")]
    Disabled(UserDisabled),
    #[serde(rename = "UserEnabled")]
    Enabled(UserEnabled),
    #[serde(rename = "UserDeleted")]
    Deleted(UserDeleted),
}

pub const EVENT_TYPES: &[&str] = &[
    "UserCreated",
    "UserRoleChanged",
    "PasswordChanged",
    "CredentialIssued",
    "CredentialRevoked",
    "UserDisabled",
    "UserEnabled",
    "UserDeleted",
];

impl UserEvent {
    /// Password hashes never reach the audit trail
    pub fn audit_detail(&self) -> BTreeMap<String, Value> {
        match self {
            UserEvent::Created(e) => detail([
                ("username", json!(e.username)),
                ("display_name", json!(e.display_name)),
                ("role", json!(e.role)),
                ("employee_id", json!(e.employee_id)),
            ]),
            UserEvent::RoleChanged(e) => detail([("role", json!(e.role))]),
            UserEvent::PasswordChanged(_) => BTreeMap::new(),
            UserEvent::CredentialIssued(e) => detail([
                ("credential_id", json!(e.credential_id)),
                ("expires_at", json!(e.expires_at)),
                ("replaces", json!(e.replaces)),
            ]),
            UserEvent::CredentialRevoked(e) => detail([("credential_id", json!(e.credential_id))]),
            UserEvent::Disabled(e) => detail([("reason", json!(e.reason))]),
            UserEvent::Enabled(_) | UserEvent::Deleted(_) => BTreeMap::new(),
        }
    }
}

impl DomainEvent for UserEvent {
    type Payload = MaintenanceEvent;

    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "UserCreated",
            UserEvent::RoleChanged(_) => "UserRoleChanged",
            UserEvent::PasswordChanged(_) => "PasswordChanged",
            UserEvent::CredentialIssued(_) => "CredentialIssued",
            UserEvent::CredentialRevoked(_) => "CredentialRevoked",
            UserEvent::Disabled(_) => "UserDisabled",
            UserEvent::Enabled(_) => "UserEnabled",
            UserEvent::Deleted(_) => "UserDeleted",
        }
    }

    fn into_payload(self) -> MaintenanceEvent {
        MaintenanceEvent::User(self)
    }

    fn from_payload(payload: &MaintenanceEvent) -> Option<&Self> {
        match payload {
            MaintenanceEvent::User(event) => Some(event),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserCreated {
    pub username: String,
    pub display_name: String,
    pub role: UserRole,
    pub employee_id: Option<Uuid>,
    pub password_hash: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserRoleChanged {
    pub role: UserRole,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PasswordChanged {
    pub password_hash: String,
}

/// Credential Issued - Becomes the current credential, replacing any other
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CredentialIssued {
    pub credential_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub replaces: Option<Uuid>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CredentialRevoked {
    pub credential_id: Uuid,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserDisabled {
    pub reason: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserEnabled {}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserDeleted {}
