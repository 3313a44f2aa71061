//! API server configuration.

use std::str::FromStr;
use std::time::Duration;

use sapi_core::auth::AuthSettings;
use sapi_core::auth::jwt::resolve_jwt_secret;
use sapi_core::auth::password::DEFAULT_COST;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    /// Upper bound on each auth store call.
    pub store_timeout_ms: u64,
    pub bcrypt_cost: u32,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                 | Default                                |
    /// |--------------------------|----------------------------------------|
    /// | `BIND_ADDR`              | `127.0.0.1:3100`                       |
    /// | `DATABASE_URL`           | `postgres://localhost:5432/sapi`       |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file      |
    /// | `ACCESS_TOKEN_TTL_SECS`  | `7200`                                 |
    /// | `REFRESH_TOKEN_TTL_SECS` | `28800`                                |
    /// | `STORE_TIMEOUT_MS`       | `5000`                                 |
    /// | `BCRYPT_COST`            | `12`                                   |
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/sapi".into()),
            jwt_secret: resolve_jwt_secret(),
            access_token_ttl_secs: env_or("ACCESS_TOKEN_TTL_SECS", 7200),
            refresh_token_ttl_secs: env_or("REFRESH_TOKEN_TTL_SECS", 28800),
            store_timeout_ms: env_or("STORE_TIMEOUT_MS", 5000),
            bcrypt_cost: env_or("BCRYPT_COST", DEFAULT_COST),
        }
    }

    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            access_ttl: chrono::Duration::seconds(self.access_token_ttl_secs),
            refresh_ttl: chrono::Duration::seconds(self.refresh_token_ttl_secs),
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            bcrypt_cost: self.bcrypt_cost,
        }
    }
}

/// Parse an env var, falling back to `default` when unset or unparseable.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, "ignoring unparseable setting");
            default
        }),
        Err(_) => default,
    }
}
