use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::value_objects::UserRole;

// ============================================================================
// User Commands
// ============================================================================

#[derive(Debug, Clone)]
pub enum UserCommand {
    CreateUser {
        username: String,
        display_name: String,
        role: UserRole,
        employee_id: Option<Uuid>,
        password_hash: String,
    },
    ChangeRole {
        role: UserRole,
    },
    ChangePassword {
        password_hash: String,
    },
    IssueCredential {
        credential_id: Uuid,
        expires_at: DateTime<Utc>,
    },
    RevokeCredential {
        credential_id: Uuid,
    },
    Disable {
        reason: Option<String>,
    },
    Enable,
    DeleteUser,
}
