use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// User Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Administrador,
    Supervisor,
    Tecnico,
}

/// The credential a user may currently authenticate with
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Credential {
    pub credential_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        at < self.expires_at
    }
}
