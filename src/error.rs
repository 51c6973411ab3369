use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred in the server";
pub const NOT_FOUND_MESSAGE: &str = "The requested resource could not be found";

/// FieldError
///
/// A single rejected field in a request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FieldError {
    pub name: String,
    pub error: String,
}

impl FieldError {
    pub fn new(name: &str, error: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            error: error.into(),
        }
    }
}

/// ErrorBody
///
/// The JSON body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_errors: Vec<FieldError>,
}

/// AppError
///
/// Every failure a handler or extractor can produce. Client-caused variants carry
/// the message that is sent back; server-side variants are logged and replaced by
/// a generic message.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{}", NOT_FOUND_MESSAGE)]
    NotFound,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Token(_) | Self::PasswordHash(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        Self::BadRequest(format!("Failed to parse the request body: {}", e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Validation { message, errors } => ErrorBody {
                message,
                field_errors: errors,
            },
            Self::Database(_) | Self::Token(_) | Self::PasswordHash(_) => {
                tracing::error!(error = %self, "request failed with an internal error");
                ErrorBody {
                    message: INTERNAL_ERROR_MESSAGE.to_string(),
                    field_errors: vec![],
                }
            }
            other => ErrorBody {
                message: other.to_string(),
                field_errors: vec![],
            },
        };
        (status, Json(body)).into_response()
    }
}
