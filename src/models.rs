use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::error::{AppError, FieldError};

const FIELD_IS_REQUIRED: &str = "This field is required";
const MAX_USERNAME_LEN: usize = 50;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 200;
const MAX_TITLE_LEN: usize = 50;
const MAX_DESCRIPTION_LEN: usize = 200;
const MAX_GROUP_PASSWORD_LEN: usize = 200;

pub const MIN_GROUP_SIZE: i64 = 5;
pub const MAX_GROUP_SIZE: i64 = 200;
/// Capacity used when a create request omits `max_size`.
pub const DEFAULT_GROUP_SIZE: i64 = 5;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// The public view of an account, as stored in the `users` table minus the credential.
/// This is the only user shape that is ever serialized to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// UserCredentials
///
/// Internal row used by sign in. Carries the Argon2 hash and never leaves the server.
#[derive(Debug, Clone, FromRow)]
pub struct UserCredentials {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl From<UserCredentials> for User {
    fn from(c: UserCredentials) -> Self {
        Self {
            id: c.id,
            username: c.username,
            created_at: c.created_at,
        }
    }
}

/// GroupStatus
///
/// Lifecycle of a group. `Closed` is terminal: nothing transitions out of it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
#[ts(export)]
pub enum GroupStatus {
    #[default]
    Open,
    Closed,
}

/// Group
///
/// Internal domain view of a row in `lfg_groups` with its members loaded.
/// The owner is not part of `members`; one slot of `max_size` is reserved for them.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: GroupStatus,
    pub password_hash: Option<String>,
    pub max_size: i64,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
    pub members: Vec<User>,
}

impl Group {
    pub fn is_full(&self) -> bool {
        self.members.len() as i64 >= self.max_size - 1
    }

    pub fn is_member(&self, user_id: i64) -> bool {
        self.members.iter().any(|m| m.id == user_id)
    }

    pub fn is_open(&self) -> bool {
        self.status == GroupStatus::Open
    }

    pub fn is_owner(&self, user_id: i64) -> bool {
        self.owner_id == user_id
    }

    pub fn is_private(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// GroupResponse
///
/// What clients see of a group. The password is replaced by the `is_private` flag.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct GroupResponse {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: GroupStatus,
    pub is_private: bool,
    pub max_size: i64,
    pub owner_id: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub members: Vec<User>,
}

impl From<Group> for GroupResponse {
    fn from(g: Group) -> Self {
        let is_private = g.is_private();
        Self {
            id: g.id,
            title: g.title,
            description: g.description,
            status: g.status,
            is_private,
            max_size: g.max_size,
            owner_id: g.owner_id,
            created_at: g.created_at,
            members: g.members,
        }
    }
}

// --- Request Payloads (Input Schemas) ---

/// CredentialsRequest
///
/// Body of `POST /sign-up` and `POST /sign-in`. Missing fields deserialize as empty
/// strings so they are reported as field errors rather than as a malformed body.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl CredentialsRequest {
    pub fn validate_for_sign_up(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();

        if let Some(e) = check_text(&self.username, MAX_USERNAME_LEN) {
            errors.push(FieldError::new("username", e));
        }

        let password_len = self.password.chars().count();
        if self.password.is_empty() {
            errors.push(FieldError::new("password", FIELD_IS_REQUIRED));
        } else if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&password_len) {
            errors.push(FieldError::new(
                "password",
                format!(
                    "This field has to be {} to {} characters long",
                    MIN_PASSWORD_LEN, MAX_PASSWORD_LEN
                ),
            ));
        }

        finish("The request body contains errors", errors)
    }
}

/// CreateGroupRequest
///
/// Body of `POST /groups`. A non-empty `password` makes the group private.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateGroupRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl CreateGroupRequest {
    pub fn validate_for_create(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();

        if let Some(e) = check_text(&self.title, MAX_TITLE_LEN) {
            errors.push(FieldError::new("title", e));
        }
        if let Some(e) = check_text(&self.description, MAX_DESCRIPTION_LEN) {
            errors.push(FieldError::new("description", e));
        }
        if let Some(e) = check_size(self.max_size.unwrap_or(DEFAULT_GROUP_SIZE)) {
            errors.push(FieldError::new("max_size", e));
        }
        if let Some(e) = check_group_password(self.password.as_deref()) {
            errors.push(FieldError::new("password", e));
        }

        finish("The new group is not valid", errors)
    }
}

/// UpdateGroupRequest
///
/// Partial update payload for `PATCH /groups/{id}`. Only provided fields are changed.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateGroupRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<i64>,
}

impl UpdateGroupRequest {
    /// Applies the create rules to every field that is present. `member_count` is the
    /// current membership; capacity can never shrink below it plus the owner's slot.
    pub fn validate_for_update(&self, member_count: usize) -> Result<(), AppError> {
        let mut errors = Vec::new();

        if let Some(e) = self.title.as_deref().and_then(|t| check_text(t, MAX_TITLE_LEN)) {
            errors.push(FieldError::new("title", e));
        }
        if let Some(e) = self
            .description
            .as_deref()
            .and_then(|d| check_text(d, MAX_DESCRIPTION_LEN))
        {
            errors.push(FieldError::new("description", e));
        }
        if let Some(size) = self.max_size {
            if let Some(e) = check_size(size) {
                errors.push(FieldError::new("max_size", e));
            } else if size - 1 < member_count as i64 {
                errors.push(FieldError::new(
                    "max_size",
                    format!("The group already has {} members", member_count),
                ));
            }
        }

        finish("The group update is not valid", errors)
    }
}

/// UpdatePasswordRequest
///
/// Body of `PATCH /groups/{id}/password`. A missing or empty password makes the group public.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdatePasswordRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl UpdatePasswordRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let errors = check_group_password(self.password.as_deref())
            .map(|e| vec![FieldError::new("password", e)])
            .unwrap_or_default();
        finish("The request body contains errors", errors)
    }

    /// The new password, with an empty string treated as "no password".
    pub fn new_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

/// JoinGroupRequest
///
/// Optional body of `POST /groups/{id}/join`; only read when the group is private.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct JoinGroupRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// KickRequest
///
/// Body of `POST /groups/{id}/kick`. Accepts `id` as an alias for `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct KickRequest {
    #[serde(alias = "id")]
    pub user_id: i64,
}

// --- Output Schemas ---

/// TokenResponse
///
/// Returned by sign up and sign in: a signed access token and the account it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub token: String,
    pub user: User,
}

// --- Validation helpers ---

fn check_text(value: &str, max_len: usize) -> Option<String> {
    if value.trim().is_empty() {
        Some(FIELD_IS_REQUIRED.to_string())
    } else if value.chars().count() > max_len {
        Some(format!(
            "This field cannot be more than {} characters long",
            max_len
        ))
    } else {
        None
    }
}

fn check_size(size: i64) -> Option<String> {
    if (MIN_GROUP_SIZE..=MAX_GROUP_SIZE).contains(&size) {
        None
    } else {
        Some(format!(
            "The value should range from {} to {}",
            MIN_GROUP_SIZE, MAX_GROUP_SIZE
        ))
    }
}

fn check_group_password(password: Option<&str>) -> Option<String> {
    match password {
        Some(p) if p.chars().count() > MAX_GROUP_PASSWORD_LEN => Some(format!(
            "This field cannot be more than {} characters long",
            MAX_GROUP_PASSWORD_LEN
        )),
        _ => None,
    }
}

fn finish(message: &str, errors: Vec<FieldError>) -> Result<(), AppError> {
    if errors.is_empty() {
        Ok(())
    } else {
        tracing::warn!(fields = errors.len(), "{}", message);
        Err(AppError::Validation {
            message: message.to_string(),
            errors,
        })
    }
}
