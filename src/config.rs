use std::env;

use thiserror::Error;

/// Local fallback for the token signing secret. Never accepted in production.
const LOCAL_JWT_SECRET: &str = "lfg-local-development-secret";
const LOCAL_DATABASE_URL: &str = "sqlite://lfg.db?mode=rwc";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_TOKEN_TTL_SECS: i64 = 60 * 60 * 24;
/// Upper bound for `TOKEN_TTL_SECONDS`: one year.
pub const MAX_TOKEN_TTL_SECS: i64 = 60 * 60 * 24 * 365;

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup and
/// shared read-only through `AppState` (pulled into extractors via `FromRef`).
#[derive(Clone, Debug)]
pub struct AppConfig {
    // SQLite connection string, e.g. `sqlite://lfg.db?mode=rwc`.
    pub db_url: String,
    // Runtime environment marker. Selects the log format and which secrets are mandatory.
    pub env: Env,
    // HS256 secret used to sign and validate access tokens.
    pub jwt_secret: String,
    // Lifetime of an issued access token, in seconds.
    pub token_ttl_secs: i64,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
}

/// Env
///
/// Defines the runtime context: `Local` for development defaults and pretty logs,
/// `Production` for mandatory secrets and JSON logs.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

impl Default for AppConfig {
    /// Provides a safe, non-failing configuration used by test setup.
    fn default() -> Self {
        Self {
            db_url: "sqlite::memory:".to_string(),
            env: Env::Local,
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every setting from environment variables. Local runs get working
    /// defaults; production refuses to start without `DATABASE_URL` and `JWT_SECRET`.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let (db_url, jwt_secret) = match env {
            Env::Production => (
                env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
                env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
            ),
            Env::Local => (
                env::var("DATABASE_URL").unwrap_or_else(|_| LOCAL_DATABASE_URL.to_string()),
                env::var("JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
            ),
        };

        let token_ttl_secs = match env::var("TOKEN_TTL_SECONDS") {
            Ok(value) => match value.parse::<i64>() {
                Ok(secs) if (1..=MAX_TOKEN_TTL_SECS).contains(&secs) => secs,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "TOKEN_TTL_SECONDS",
                        value,
                    });
                }
            },
            Err(_) => DEFAULT_TOKEN_TTL_SECS,
        };

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        Ok(Self {
            db_url,
            env,
            jwt_secret,
            token_ttl_secs,
            bind_addr,
        })
    }
}
