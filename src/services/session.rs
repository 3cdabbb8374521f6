//! Admin session management.
//!
//! There is a single operator account whose password comes from the
//! environment. A successful login stores a random token in
//! `admin_sessions`; the dashboard sends it back as an HttpOnly cookie.

use std::fmt::Write;

use axum::http::StatusCode;
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::error::{ErrorCode, MSG_DATABASE};

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("admin password is not configured")]
    NotConfigured,
    #[error("wrong password")]
    WrongPassword,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for LoginError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "E_NOT_CONFIGURED",
            Self::WrongPassword => "E_UNAUTHORIZED",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Self::WrongPassword => StatusCode::UNAUTHORIZED,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn user_message(&self) -> &'static str {
        match self {
            Self::NotConfigured => "הכניסה למערכת אינה מוגדרת",
            Self::WrongPassword => "הסיסמה שגויה",
            Self::Database(_) => MSG_DATABASE,
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Compare two secrets by their SHA-256 digests so the comparison does not
/// depend on where the inputs first differ.
#[must_use]
pub fn secrets_match(given: &str, expected: &str) -> bool {
    let a = Sha256::digest(given.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminSessionInfo {
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Create a session valid for `ttl_hours`, returning the token.
pub async fn create_session(pool: &PgPool, ttl_hours: i64) -> Result<String, sqlx::Error> {
    let token = generate_token();
    sqlx::query("INSERT INTO admin_sessions (token, expires_at) VALUES ($1, now() + make_interval(hours => $2))")
        .bind(&token)
        .bind(i32::try_from(ttl_hours.max(1)).unwrap_or(i32::MAX))
        .execute(pool)
        .await?;
    Ok(token)
}

/// Look up an unexpired session.
pub async fn validate_session(pool: &PgPool, token: &str) -> Result<Option<AdminSessionInfo>, sqlx::Error> {
    let row = sqlx::query("SELECT created_at, expires_at FROM admin_sessions WHERE token = $1 AND expires_at > now()")
        .bind(token)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| AdminSessionInfo { created_at: r.get("created_at"), expires_at: r.get("expires_at") }))
}

pub async fn delete_session(pool: &PgPool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM admin_sessions WHERE token = $1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove expired rows; called on login.
pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM admin_sessions WHERE expires_at <= now()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Check the password and open a session, returning its token.
///
/// # Errors
///
/// Returns [`LoginError::NotConfigured`] when no password is set,
/// [`LoginError::WrongPassword`], or a database error.
pub async fn login(
    pool: &PgPool,
    configured: Option<&str>,
    given: &str,
    ttl_hours: i64,
) -> Result<String, LoginError> {
    let configured = configured.ok_or(LoginError::NotConfigured)?;
    if !secrets_match(given, configured) {
        warn!("admin login rejected");
        return Err(LoginError::WrongPassword);
    }

    let purged = purge_expired(pool).await?;
    let token = create_session(pool, ttl_hours).await?;
    info!(purged, "admin session created");
    Ok(token)
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
