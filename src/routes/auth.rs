//! Auth routes: password login, logout, session check.

use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::Duration;
use tracing::error;

use crate::error::ApiError;
use crate::services::session::{self, AdminSessionInfo};
use crate::state::AppState;

pub(crate) const COOKIE_NAME: &str = "session_token";

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated operator extracted from the session cookie.
/// Use as a handler parameter to require authentication.
pub struct AdminSession {
    pub info: AdminSessionInfo,
    pub token: String,
}

impl<S> axum::extract::FromRequestParts<S> for AdminSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar.get(COOKIE_NAME).map(Cookie::value).unwrap_or_default();
        if token.is_empty() {
            return Err(ApiError::unauthorized());
        }

        let app_state = AppState::from_ref(state);
        let info = session::validate_session(&app_state.pool, token)
            .await
            .map_err(session::LoginError::Database)?
            .ok_or_else(ApiError::unauthorized)?;

        Ok(Self { info, token: token.to_owned() })
    }
}

fn session_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Deserialize)]
pub struct LoginBody {
    pub password: String,
}

/// `POST /api/auth/login`: check the password, set the session cookie.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginBody>,
) -> Result<impl IntoResponse, ApiError> {
    let token = session::login(
        &state.pool,
        state.config.admin_password.as_deref(),
        &body.password,
        state.config.session_ttl_hours,
    )
    .await?;

    let mut cookie = session_cookie(token, state.config.cookie_secure);
    cookie.set_max_age(Duration::hours(state.config.session_ttl_hours.max(1)));
    Ok((jar.add(cookie), StatusCode::NO_CONTENT))
}

/// `GET /api/auth/me`: return the current session.
pub async fn me(auth: AdminSession) -> Json<AdminSessionInfo> {
    Json(auth.info)
}

/// `POST /api/auth/logout`: delete session, clear cookie.
pub async fn logout(State(state): State<AppState>, auth: AdminSession) -> impl IntoResponse {
    if let Err(e) = session::delete_session(&state.pool, &auth.token).await {
        error!(error = %e, "session delete failed");
    }

    let mut cookie = session_cookie(String::new(), state.config.cookie_secure);
    cookie.set_max_age(Duration::ZERO);
    (CookieJar::new().add(cookie), StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
