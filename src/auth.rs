use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    config::AppConfig,
    error::AppError,
    models::User,
    repository::RepositoryState,
};

pub const MISSING_HEADER_MESSAGE: &str = "Authorization header is missing";
pub const INVALID_TOKEN_MESSAGE: &str = "Token is invalid";

/// Claims
///
/// Payload of the HS256 access token handed out by sign up and sign in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Database id of the account.
    pub user_id: i64,
    pub username: String,
    /// Issued At, seconds since the epoch.
    pub iat: i64,
    /// Expiration Time, seconds since the epoch. Validated on every request.
    pub exp: i64,
}

/// issue_token
///
/// Signs a token for `user` that expires `token_ttl_secs` from now.
pub fn issue_token(user: &User, config: &AppConfig) -> Result<String, AppError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        user_id: user.id,
        username: user.username.clone(),
        iat: now,
        exp: now.saturating_add(config.token_ttl_secs),
    };

    let key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
    let token = encode(&Header::default(), &claims, &key)?;
    tracing::debug!(user_id = user.id, "issued access token");
    Ok(token)
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Handlers take it as an argument;
/// the permission checks compare its `id` against group owners and members.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Reuses an identity already resolved by the auth middleware for this request.
/// 2. Reads the `Authorization: Bearer <token>` header.
/// 3. Validates signature, algorithm (HS256) and expiry.
/// 4. Confirms the account still exists.
///
/// Rejection: `AppError::Unauthorized` (401) on any failure; database errors are 500s.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| {
                tracing::warn!("request rejected: authorization header is missing");
                AppError::Unauthorized(MISSING_HEADER_MESSAGE.to_string())
            })?;

        let token = auth_header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(invalid_token)?;

        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        let validation = Validation::default();

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            tracing::warn!(error = %e, "request rejected: token failed validation");
            invalid_token()
        })?;

        let user = repo
            .get_user(token_data.claims.user_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(
                    user_id = token_data.claims.user_id,
                    "request rejected: token owner no longer exists"
                );
                invalid_token()
            })?;

        let auth_user = AuthUser::from(user);
        parts.extensions.insert(auth_user.clone());
        Ok(auth_user)
    }
}

fn invalid_token() -> AppError {
    AppError::Unauthorized(INVALID_TOKEN_MESSAGE.to_string())
}
