use crate::{
    AppState,
    auth::{AuthUser, issue_token},
    error::{AppError, ErrorBody, FieldError},
    models::{
        CreateGroupRequest, CredentialsRequest, DEFAULT_GROUP_SIZE, GroupResponse, GroupStatus,
        JoinGroupRequest, KickRequest, TokenResponse, UpdateGroupRequest, UpdatePasswordRequest,
        User,
    },
    password::{hash_password, verify_password},
    permissions::{self, GroupObject, Permission, policy},
    repository::{GroupChanges, NewGroup},
};
use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, de::DeserializeOwned};

const INVALID_CREDENTIALS_MESSAGE: &str = "username or password is invalid.";

/// ApiJson
///
/// `Json` with its rejection converted into `AppError`, so malformed bodies get the
/// same JSON error shape as every other failure.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Group routes take the raw body and decode it only after their policy has passed,
/// so a caller without access sees the denial rather than a parse error.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "request body rejected");
        AppError::from(e)
    })
}

// --- Filter Structs ---

/// GroupFilter
///
/// Query parameters accepted by `GET /groups`.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GroupFilter {
    /// Only return groups in this state.
    pub status: Option<GroupStatus>,
}

// --- Account Handlers ---

/// sign_up
///
/// [Public Route] Creates an account and returns a token for it.
#[utoipa::path(
    post,
    path = "/sign-up",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "Account created", body = TokenResponse),
        (status = 400, description = "Invalid body or username taken", body = ErrorBody)
    )
)]
pub async fn sign_up(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CredentialsRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    payload.validate_for_sign_up()?;

    let password_hash = hash_password(&payload.password)?;
    let user = match state.repo.create_user(&payload.username, &password_hash).await {
        Ok(user) => user,
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            tracing::warn!(username = %payload.username, "sign up rejected: username taken");
            return Err(AppError::BadRequest("User already exists.".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let token = issue_token(&user, &state.config)?;
    tracing::info!(user_id = user.id, "user signed up");
    Ok((StatusCode::CREATED, Json(TokenResponse { token, user })))
}

/// sign_in
///
/// [Public Route] Exchanges a username and password for a token. Unknown users and
/// wrong passwords produce the same 401 so usernames cannot be probed.
#[utoipa::path(
    post,
    path = "/sign-in",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Signed in", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody)
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CredentialsRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let invalid = || AppError::Unauthorized(INVALID_CREDENTIALS_MESSAGE.to_string());

    let credentials = state
        .repo
        .get_credentials(&payload.username)
        .await?
        .ok_or_else(|| {
            tracing::info!(username = %payload.username, "sign in rejected: unknown user");
            invalid()
        })?;

    if !verify_password(&payload.password, &credentials.password_hash) {
        tracing::info!(user_id = credentials.id, "sign in rejected: wrong password");
        return Err(invalid());
    }

    let user = User::from(credentials);
    let token = issue_token(&user, &state.config)?;
    tracing::info!(user_id = user.id, "user signed in");
    Ok(Json(TokenResponse { token, user }))
}

/// get_me
///
/// [Authenticated Route] Returns the account the token belongs to.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Current user", body = User))
)]
pub async fn get_me(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<User>, AppError> {
    let user = state.repo.get_user(auth.id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(user))
}

// --- Group Handlers ---

/// list_groups
///
/// [Authenticated Route] Lists every group with its members, optionally filtered by status.
#[utoipa::path(
    get,
    path = "/groups",
    params(GroupFilter),
    responses((status = 200, description = "Groups", body = [GroupResponse]))
)]
pub async fn list_groups(
    State(state): State<AppState>,
    Query(filter): Query<GroupFilter>,
) -> Result<Json<Vec<GroupResponse>>, AppError> {
    let groups = state.repo.list_groups(filter.status).await?;
    Ok(Json(groups.into_iter().map(GroupResponse::from).collect()))
}

/// create_group
///
/// [Authenticated Route] Creates an open group owned by the caller.
#[utoipa::path(
    post,
    path = "/groups",
    request_body = CreateGroupRequest,
    responses(
        (status = 201, description = "Created", body = GroupResponse),
        (status = 400, description = "Validation failed", body = ErrorBody)
    )
)]
pub async fn create_group(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupResponse>), AppError> {
    payload.validate_for_create()?;

    let password_hash = match payload.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => Some(hash_password(password)?),
        None => None,
    };

    let group = state
        .repo
        .create_group(
            auth.id,
            NewGroup {
                title: payload.title,
                description: payload.description,
                max_size: payload.max_size.unwrap_or(DEFAULT_GROUP_SIZE),
                password_hash,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(GroupResponse::from(group))))
}

/// retrieve_group
///
/// [Authenticated Route] Returns a single group. The password is never included.
#[utoipa::path(
    get,
    path = "/groups/{id}",
    params(("id" = i64, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Found", body = GroupResponse),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn retrieve_group(GroupObject(group): GroupObject) -> Json<GroupResponse> {
    Json(GroupResponse::from(group))
}

/// update_group
///
/// [Authenticated Route] Owner-only partial update of an open group.
#[utoipa::path(
    patch,
    path = "/groups/{id}",
    params(("id" = i64, Path, description = "Group ID")),
    request_body = UpdateGroupRequest,
    responses(
        (status = 200, description = "Updated", body = GroupResponse),
        (status = 400, description = "Invalid update or group closed", body = ErrorBody),
        (status = 403, description = "Not Owner", body = ErrorBody)
    )
)]
pub async fn update_group(
    auth: AuthUser,
    State(state): State<AppState>,
    GroupObject(group): GroupObject,
    body: Bytes,
) -> Result<Json<GroupResponse>, AppError> {
    permissions::enforce(&group, &auth, policy::UPDATE)?;
    let payload: UpdateGroupRequest = parse_body(&body)?;
    payload.validate_for_update(group.members.len())?;

    let changes = GroupChanges {
        title: payload.title,
        description: payload.description,
        max_size: payload.max_size,
    };
    let Some(updated) = state.repo.update_group(group.id, changes).await? else {
        // Members joined after validation and no longer fit the requested size.
        let current = state
            .repo
            .get_group(group.id)
            .await?
            .ok_or(AppError::NotFound)?;
        tracing::warn!(
            group_id = group.id,
            members = current.members.len(),
            "group update rejected: capacity below membership"
        );
        return Err(AppError::Validation {
            message: "The group update is not valid".to_string(),
            errors: vec![FieldError::new(
                "max_size",
                format!("The group already has {} members", current.members.len()),
            )],
        });
    };

    tracing::info!(group_id = group.id, "group updated");
    Ok(Json(GroupResponse::from(updated)))
}

/// update_group_password
///
/// [Authenticated Route] Owner-only. Sets a new password, or clears it when the
/// body carries no (or an empty) password.
#[utoipa::path(
    patch,
    path = "/groups/{id}/password",
    params(("id" = i64, Path, description = "Group ID")),
    request_body = UpdatePasswordRequest,
    responses(
        (status = 200, description = "Updated", body = GroupResponse),
        (status = 403, description = "Not Owner", body = ErrorBody)
    )
)]
pub async fn update_group_password(
    auth: AuthUser,
    State(state): State<AppState>,
    GroupObject(group): GroupObject,
    body: Bytes,
) -> Result<Json<GroupResponse>, AppError> {
    permissions::enforce(&group, &auth, policy::UPDATE_PASSWORD)?;
    let payload: UpdatePasswordRequest = parse_body(&body)?;
    payload.validate()?;

    let password_hash = match payload.new_password() {
        Some(password) => Some(hash_password(password)?),
        None => None,
    };
    let is_private = password_hash.is_some();

    let updated = state
        .repo
        .set_group_password(group.id, password_hash)
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::info!(group_id = group.id, is_private, "group password changed");
    Ok(Json(GroupResponse::from(updated)))
}

/// close_group
///
/// [Authenticated Route] Owner-only. Marks an open group as closed; closed is terminal.
#[utoipa::path(
    post,
    path = "/groups/{id}/close",
    params(("id" = i64, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Closed", body = GroupResponse),
        (status = 400, description = "Already closed", body = ErrorBody),
        (status = 403, description = "Not Owner", body = ErrorBody)
    )
)]
pub async fn close_group(
    auth: AuthUser,
    State(state): State<AppState>,
    GroupObject(group): GroupObject,
) -> Result<Json<GroupResponse>, AppError> {
    permissions::enforce(&group, &auth, policy::CLOSE)?;

    // None here means another request closed it between the check and the update.
    let closed = state
        .repo
        .close_group(group.id)
        .await?
        .ok_or_else(|| AppError::BadRequest("Group is not open".to_string()))?;

    tracing::info!(group_id = group.id, "group closed");
    Ok(Json(GroupResponse::from(closed)))
}

/// join_group
///
/// [Authenticated Route] Adds the caller to the group. Private groups require the
/// group password in the body.
#[utoipa::path(
    post,
    path = "/groups/{id}/join",
    params(("id" = i64, Path, description = "Group ID")),
    request_body(content = JoinGroupRequest, description = "Only required for private groups"),
    responses(
        (status = 200, description = "Joined", body = GroupResponse),
        (status = 400, description = "Full, closed, already a member or owner", body = ErrorBody),
        (status = 403, description = "Incorrect password", body = ErrorBody)
    )
)]
pub async fn join_group(
    auth: AuthUser,
    State(state): State<AppState>,
    GroupObject(group): GroupObject,
    body: Bytes,
) -> Result<Json<GroupResponse>, AppError> {
    permissions::enforce(&group, &auth, policy::JOIN)?;
    permissions::check_group_password(&group, &body)?;

    if !state.repo.add_member(group.id, auth.id).await? {
        // The group changed since it was loaded. Re-run the policy on the fresh row
        // so the caller gets the check that actually failed.
        let current = state
            .repo
            .get_group(group.id)
            .await?
            .ok_or(AppError::NotFound)?;
        permissions::enforce(&current, &auth, policy::JOIN)?;
        return Err(Permission::GroupIsNotFull.denial());
    }

    tracing::info!(group_id = group.id, user_id = auth.id, "user joined group");
    reload(&state, group.id).await
}

/// leave_group
///
/// [Authenticated Route] Removes the caller from a group they are a member of.
#[utoipa::path(
    post,
    path = "/groups/{id}/leave",
    params(("id" = i64, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Left", body = GroupResponse),
        (status = 400, description = "Not a member or group closed", body = ErrorBody)
    )
)]
pub async fn leave_group(
    auth: AuthUser,
    State(state): State<AppState>,
    GroupObject(group): GroupObject,
) -> Result<Json<GroupResponse>, AppError> {
    permissions::enforce(&group, &auth, policy::LEAVE)?;

    state.repo.remove_member(group.id, auth.id).await?;

    tracing::info!(group_id = group.id, user_id = auth.id, "user left group");
    reload(&state, group.id).await
}

/// kick_from_group
///
/// [Authenticated Route] Owner-only removal of another member.
#[utoipa::path(
    post,
    path = "/groups/{id}/kick",
    params(("id" = i64, Path, description = "Group ID")),
    request_body = KickRequest,
    responses(
        (status = 200, description = "Member removed", body = GroupResponse),
        (status = 400, description = "Target is not a member or group closed", body = ErrorBody),
        (status = 403, description = "Not Owner", body = ErrorBody),
        (status = 404, description = "Group or user not found", body = ErrorBody)
    )
)]
pub async fn kick_from_group(
    auth: AuthUser,
    State(state): State<AppState>,
    GroupObject(group): GroupObject,
    body: Bytes,
) -> Result<Json<GroupResponse>, AppError> {
    permissions::enforce(&group, &auth, policy::KICK)?;
    let payload: KickRequest = parse_body(&body)?;

    let target = state
        .repo
        .get_user(payload.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if !group.is_member(target.id) {
        tracing::warn!(
            group_id = group.id,
            user_id = target.id,
            "kick rejected: target is not a member"
        );
        return Err(AppError::BadRequest(
            "The user to kick is not a member".to_string(),
        ));
    }

    state.repo.remove_member(group.id, target.id).await?;

    tracing::info!(group_id = group.id, user_id = target.id, "member kicked");
    reload(&state, group.id).await
}

async fn reload(state: &AppState, group_id: i64) -> Result<Json<GroupResponse>, AppError> {
    let group = state
        .repo
        .get_group(group_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(GroupResponse::from(group)))
}
