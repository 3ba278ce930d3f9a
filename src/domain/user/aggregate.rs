use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::UserCommand;
use super::errors::UserError;
use super::events::*;
use super::value_objects::{Credential, UserRole};
use crate::domain::EntityType;
use crate::event_sourcing::core::{Aggregate, EventContext};

// ============================================================================
// User Aggregate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAggregate {
    pub id: Uuid,
    pub version: i64,

    pub username: String,
    pub display_name: String,
    pub role: UserRole,
    pub employee_id: Option<Uuid>,
    /// The hash itself stays in the log; queryable state only knows when it changed
    pub password_changed_at: DateTime<Utc>,

    /// At most one credential is current at any time
    pub current_credential: Option<Credential>,
    pub credentials_issued: u32,

    pub enabled: bool,
    pub disabled_reason: Option<String>,
    pub deleted: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAggregate {
    pub fn can_authenticate(&self, credential_id: Uuid, at: DateTime<Utc>) -> bool {
        self.enabled
            && !self.deleted
            && self
                .current_credential
                .as_ref()
                .is_some_and(|c| c.credential_id == credential_id && c.is_valid_at(at))
    }

    fn ensure_usable(&self) -> Result<(), UserError> {
        if self.deleted {
            return Err(UserError::Deleted);
        }
        if !self.enabled {
            return Err(UserError::Disabled);
        }
        Ok(())
    }
}

fn validate_username(username: &str) -> Result<String, UserError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(UserError::EmptyUsername);
    }
    if username.chars().any(char::is_whitespace) {
        return Err(UserError::InvalidUsername(username.to_string()));
    }
    Ok(username.to_lowercase())
}

fn validate_hash(hash: &str) -> Result<String, UserError> {
    if hash.is_empty() {
        return Err(UserError::EmptyPasswordHash);
    }
    Ok(hash.to_string())
}

impl Aggregate for UserAggregate {
    type Event = UserEvent;
    type Command = UserCommand;
    type Error = UserError;

    fn entity_type() -> EntityType {
        EntityType::User
    }

    fn apply_first_event(ctx: &EventContext, event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            UserEvent::Created(e) => Ok(Self {
                id: ctx.stream_id,
                version: ctx.stream_version,
                username: e.username.clone(),
                display_name: e.display_name.clone(),
                role: e.role,
                employee_id: e.employee_id,
                password_changed_at: ctx.occurred_at,
                current_credential: None,
                credentials_issued: 0,
                enabled: true,
                disabled_reason: None,
                deleted: false,
                created_at: ctx.occurred_at,
                updated_at: ctx.occurred_at,
            }),
            _ => Err(UserError::NotInitialized),
        }
    }

    fn apply_event(&mut self, ctx: &EventContext, event: &Self::Event) -> Result<(), Self::Error> {
        if self.deleted {
            return Err(UserError::Deleted);
        }

        match event {
            UserEvent::Created(_) => return Err(UserError::AlreadyExists),
            UserEvent::RoleChanged(e) => {
                self.role = e.role;
            }
            UserEvent::PasswordChanged(_) => {
                self.password_changed_at = ctx.occurred_at;
            }
            UserEvent::CredentialIssued(e) => {
                self.current_credential = Some(Credential {
                    credential_id: e.credential_id,
                    issued_at: ctx.occurred_at,
                    expires_at: e.expires_at,
                });
                self.credentials_issued += 1;
            }
            UserEvent::CredentialRevoked(e) => {
                if self
                    .current_credential
                    .as_ref()
                    .is_some_and(|c| c.credential_id == e.credential_id)
                {
                    self.current_credential = None;
                }
            }
            UserEvent::Disabled(e) => {
                self.enabled = false;
                self.disabled_reason = e.reason.clone();
                self.current_credential = None;
            }
            UserEvent::Enabled(_) => {
                self.enabled = true;
                self.disabled_reason = None;
            }
            UserEvent::Deleted(_) => {
                self.deleted = true;
                self.enabled = false;
                self.current_credential = None;
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
        let user = match (state, command) {
            (
                None,
                UserCommand::CreateUser {
                    username,
                    display_name,
                    role,
                    employee_id,
                    password_hash,
                },
            ) => {
                let username = validate_username(username)?;
                let display_name = match display_name.trim() {
                    "" => username.clone(),
                    name => name.to_string(),
                };

                return Ok(vec![UserEvent::Created(UserCreated {
                    username,
                    display_name,
                    role: *role,
                    employee_id: *employee_id,
                    password_hash: validate_hash(password_hash)?,
                })]);
            }
            (Some(_), UserCommand::CreateUser { .. }) => return Err(UserError::AlreadyExists),
            (None, _) => return Err(UserError::NotFound),
            (Some(user), _) => user,
        };

        if user.deleted {
            return Err(UserError::Deleted);
        }

        match command {
            UserCommand::CreateUser { .. } => Err(UserError::AlreadyExists),

            UserCommand::ChangeRole { role } => {
                if user.role == *role {
                    return Err(UserError::RoleUnchanged(*role));
                }
                Ok(vec![UserEvent::RoleChanged(UserRoleChanged { role: *role })])
            }

            UserCommand::ChangePassword { password_hash } => Ok(vec![UserEvent::PasswordChanged(PasswordChanged {
                password_hash: validate_hash(password_hash)?,
            })]),

            UserCommand::IssueCredential { credential_id, expires_at } => {
                user.ensure_usable()?;
                let replaces = user.current_credential.as_ref().map(|c| c.credential_id);
                if replaces == Some(*credential_id) {
                    return Err(UserError::CredentialAlreadyIssued(*credential_id));
                }

                Ok(vec![UserEvent::CredentialIssued(CredentialIssued {
                    credential_id: *credential_id,
                    expires_at: *expires_at,
                    replaces,
                })])
            }

            UserCommand::RevokeCredential { credential_id } => {
                match &user.current_credential {
                    Some(current) if current.credential_id == *credential_id => {}
                    _ => return Err(UserError::UnknownCredential(*credential_id)),
                }
                Ok(vec![UserEvent::CredentialRevoked(CredentialRevoked {
                    credential_id: *credential_id,
                })])
            }

            UserCommand::Disable { reason } => {
                user.ensure_usable()?;
                Ok(vec![UserEvent::Disabled(UserDisabled { reason: reason.clone() })])
            }

            UserCommand::Enable => {
                if user.enabled {
                    return Err(UserError::AlreadyEnabled);
                }
                Ok(vec![UserEvent::Enabled(UserEnabled {})])
            }

            UserCommand::DeleteUser => Ok(vec![UserEvent::Deleted(UserDeleted {})]),
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

    fn at(version: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 7, 0, 0).unwrap() + Duration::minutes(version)
    }

    fn ctx(id: Uuid, version: i64) -> EventContext {
        EventContext {
            stream_id: id,
            stream_version: version,
            occurred_at: at(version),
        }
    }

    fn created() -> UserAggregate {
        let command = UserCommand::CreateUser {
            username: " ATorres ".to_string(),
            display_name: "Ana Torres".to_string(),
            role: UserRole::Tecnico,
            employee_id: None,
            password_hash: "$argon2id$v=19$hash".to_string(),
        };
        let events = UserAggregate::handle_command(None, &command).unwrap();
        UserAggregate::apply_first_event(&ctx(Uuid::new_v4(), 1), &events[0]).unwrap()
    }

    fn apply(user: &mut UserAggregate, command: UserCommand) -> Result<Vec<UserEvent>, UserError> {
        let events = UserAggregate::handle_command(Some(&*user), &command)?;
        for event in &events {
            let next = user.version + 1;
            user.apply_event(&ctx(user.id, next), event)?;
        }
        Ok(events)
    }

    fn issue(credential_id: Uuid) -> UserCommand {
        UserCommand::IssueCredential {
            credential_id,
            expires_at: at(0) + Duration::hours(12),
        }
    }

    #[test]
    fn test_state_document_never_carries_password_hash() {
        let mut user = created();
        apply(
            &mut user,
            UserCommand::ChangePassword {
                password_hash: "$argon2id$v=19$rotated".to_string(),
            },
        )
        .unwrap();

        let document = serde_json::to_string(&user).unwrap();
        assert!(!document.contains("argon2id"));
        assert!(!document.contains("password_hash"));
        assert_eq!(user.password_changed_at, at(2));
    }

    #[test]
    fn test_create_normalizes_username() {
        let user = created();
        assert_eq!(user.username, "atorres");
        assert_eq!(user.role, UserRole::Tecnico);
        assert!(user.enabled);
        assert!(user.current_credential.is_none());
    }

    #[test]
    fn test_new_credential_replaces_current_one() {
        let mut user = created();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        apply(&mut user, issue(first)).unwrap();
        let events = apply(&mut user, issue(second)).unwrap();

        assert_eq!(
            events,
            vec![UserEvent::CredentialIssued(CredentialIssued {
                credential_id: second,
                expires_at: at(0) + Duration::hours(12),
                replaces: Some(first),
            })]
        );
        assert!(user.can_authenticate(second, at(4)));
        assert!(!user.can_authenticate(first, at(4)));
        assert_eq!(user.credentials_issued, 2);
    }

    #[test]
    fn test_revoke_only_current_credential() {
        let mut user = created();
        let current = Uuid::new_v4();
        apply(&mut user, issue(current)).unwrap();

        let stale = Uuid::new_v4();
        assert_eq!(
            apply(&mut user, UserCommand::RevokeCredential { credential_id: stale }),
            Err(UserError::UnknownCredential(stale))
        );

        apply(&mut user, UserCommand::RevokeCredential { credential_id: current }).unwrap();
        assert!(user.current_credential.is_none());
    }

    #[test]
    fn test_disabled_user_loses_credential_and_cannot_get_one() {
        let mut user = created();
        let credential = Uuid::new_v4();
        apply(&mut user, issue(credential)).unwrap();
        apply(&mut user, UserCommand::Disable { reason: Some("Retiro".to_string()) }).unwrap();

        assert!(!user.can_authenticate(credential, at(3)));
        assert_eq!(apply(&mut user, issue(Uuid::new_v4())), Err(UserError::Disabled));

        apply(&mut user, UserCommand::Enable).unwrap();
        assert!(apply(&mut user, issue(Uuid::new_v4())).is_ok());
    }

    #[test]
    fn test_role_change_must_change_role() {
        let mut user = created();
        assert_eq!(
            apply(&mut user, UserCommand::ChangeRole { role: UserRole::Tecnico }),
            Err(UserError::RoleUnchanged(UserRole::Tecnico))
        );
        apply(&mut user, UserCommand::ChangeRole { role: UserRole::Administrador }).unwrap();
        assert_eq!(user.role, UserRole::Administrador);
    }

    #[test]
    fn test_deleted_user_is_terminal() {
        let mut user = created();
        apply(&mut user, UserCommand::DeleteUser).unwrap();
        assert_eq!(apply(&mut user, UserCommand::Enable), Err(UserError::Deleted));
    }
}
