//! Structured API errors.
//!
//! DESIGN
//! ======
//! Every service error implements [`ErrorCode`]: a grepable code, the HTTP
//! status it maps to, and the Hebrew message the dashboard shows as a toast.
//! Route handlers log the technical error and return [`ErrorBody`]. There is
//! no retry policy server side; `retryable` only tells the operator whether
//! trying again can help.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub const MSG_DATABASE: &str = "אירעה שגיאה בשמירת הנתונים, נסו שוב";
pub const MSG_NOT_FOUND: &str = "הפריט המבוקש לא נמצא";
pub const MSG_UNAUTHORIZED: &str = "יש להתחבר מחדש למערכת";

/// Grepable error code, HTTP status and user-facing message.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn status(&self) -> StatusCode;

    /// Hebrew toast text shown to the operator.
    fn user_message(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// JSON body returned for every failed API call.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: &'static str,
    pub detail: String,
    pub retryable: bool,
}

impl ErrorBody {
    #[must_use]
    pub fn from_error(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self {
            code: err.error_code(),
            message: err.user_message(),
            detail: err.to_string(),
            retryable: err.retryable(),
        }
    }
}

/// Typed error wrapper so handlers can return `Result<_, ApiError>` and use `?`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    #[must_use]
    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ErrorBody {
                code: "E_UNAUTHORIZED",
                message: MSG_UNAUTHORIZED,
                detail: "missing or expired admin session".into(),
                retryable: false,
            },
        }
    }
}

impl<E> From<E> for ApiError
where
    E: ErrorCode,
{
    fn from(err: E) -> Self {
        let status = err.status();
        if status.is_server_error() {
            tracing::error!(code = err.error_code(), error = %err, "request failed");
        } else {
            tracing::warn!(code = err.error_code(), error = %err, "request rejected");
        }
        Self { status, body: ErrorBody::from_error(&err) }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
