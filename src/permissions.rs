//! Per-route access checks for group endpoints.
//!
//! Each route declares an ordered policy (a slice of [`Permission`]). [`enforce`]
//! evaluates it front to back and stops at the first predicate that fails, so the
//! order in each policy decides which error a caller sees when several checks fail.

use axum::{
    extract::{FromRef, FromRequestParts, Path},
    http::request::Parts,
};

use crate::{
    auth::AuthUser,
    error::AppError,
    models::{Group, JoinGroupRequest},
    password::verify_password,
    repository::RepositoryState,
};

/// Permission
///
/// A single boolean predicate over a group and the requesting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    GroupIsOpen,
    GroupIsNotFull,
    UserIsOwner,
    UserIsNotOwner,
    UserIsMember,
    UserIsNotMember,
}

impl Permission {
    pub fn allows(self, group: &Group, user_id: i64) -> bool {
        match self {
            Self::GroupIsOpen => group.is_open(),
            Self::GroupIsNotFull => !group.is_full(),
            Self::UserIsOwner => group.is_owner(user_id),
            Self::UserIsNotOwner => !group.is_owner(user_id),
            Self::UserIsMember => group.is_member(user_id),
            Self::UserIsNotMember => !group.is_member(user_id),
        }
    }

    pub fn denial(self) -> AppError {
        match self {
            Self::UserIsOwner => {
                AppError::Forbidden("User is not the owner of the group".to_string())
            }
            Self::GroupIsOpen => AppError::BadRequest("Group is not open".to_string()),
            Self::GroupIsNotFull => AppError::BadRequest("Group is full".to_string()),
            Self::UserIsNotOwner => {
                AppError::BadRequest("User is the owner of the group".to_string())
            }
            Self::UserIsMember => {
                AppError::BadRequest("User is not a member of the group".to_string())
            }
            Self::UserIsNotMember => {
                AppError::BadRequest("User is a member of the group".to_string())
            }
        }
    }

    pub fn check(self, group: &Group, user_id: i64) -> Result<(), AppError> {
        if self.allows(group, user_id) {
            return Ok(());
        }
        tracing::info!(
            permission = ?self,
            group_id = group.id,
            user_id,
            "permission denied"
        );
        Err(self.denial())
    }
}

/// Ordered policies, one per group route.
pub mod policy {
    use super::Permission::{self, *};

    pub const CLOSE: &[Permission] = &[UserIsOwner, GroupIsOpen];
    pub const UPDATE: &[Permission] = &[UserIsOwner, GroupIsOpen];
    pub const UPDATE_PASSWORD: &[Permission] = &[UserIsOwner, GroupIsOpen];
    pub const JOIN: &[Permission] = &[GroupIsNotFull, UserIsNotMember, UserIsNotOwner, GroupIsOpen];
    pub const LEAVE: &[Permission] = &[GroupIsOpen, UserIsMember];
    pub const KICK: &[Permission] = &[GroupIsOpen, UserIsOwner];
}

/// Runs `policy` in order against `group` for `user`, short-circuiting on the first denial.
pub fn enforce(group: &Group, user: &AuthUser, policy: &[Permission]) -> Result<(), AppError> {
    policy.iter().try_for_each(|p| p.check(group, user.id))
}

/// check_group_password
///
/// Public groups pass unconditionally. For private groups the request body must carry
/// a `password` matching the stored hash.
pub fn check_group_password(group: &Group, body: &[u8]) -> Result<(), AppError> {
    let Some(hash) = group.password_hash.as_deref() else {
        return Ok(());
    };

    let password_required = || AppError::BadRequest("Group password is required".to_string());

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(password_required());
    }

    let request: JoinGroupRequest = serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, group_id = group.id, "join body is not valid JSON");
        AppError::BadRequest(format!("Failed to parse the request body: {}", e))
    })?;

    let supplied = request
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(password_required)?;

    if verify_password(&supplied, hash) {
        Ok(())
    } else {
        tracing::info!(group_id = group.id, "incorrect group password");
        Err(AppError::Forbidden("Incorrect password".to_string()))
    }
}

/// GroupObject
///
/// Extractor that loads the group named by the `{id}` path segment, password hash
/// and members included. Rejects with 400 for a non-integer id and 404 for a missing group.
#[derive(Debug, Clone)]
pub struct GroupObject(pub Group);

impl<S> FromRequestParts<S> for GroupObject
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<i64>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid group id: {}", e.body_text())))?;

        let repo = RepositoryState::from_ref(state);
        match repo.get_group(id).await? {
            Some(group) => Ok(GroupObject(group)),
            None => {
                tracing::info!(group_id = id, "group not found");
                Err(AppError::NotFound)
            }
        }
    }
}
