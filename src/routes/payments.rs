//! Payment routes: gateway callback, customer payment history, checkout.
//!
//! `POST /api/payments/notify` is called by the gateway, not the dashboard,
//! so it authenticates with the shared `secret` query parameter instead of
//! the admin cookie.

use axum::extract::{Form, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::auth::AdminSession;
use crate::services::checkout::{self, CheckoutSession, CheckoutStart, StartCheckout};
use crate::services::payment::{self, CreditToken, Customer, NotifyForm, NotifyOutcome, Payment};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct NotifyQuery {
    pub secret: Option<String>,
}

/// `POST /api/payments/notify?secret=...`: gateway server-to-server callback.
pub async fn notify(
    State(state): State<AppState>,
    Query(query): Query<NotifyQuery>,
    Form(form): Form<NotifyForm>,
) -> Result<Json<NotifyOutcome>, ApiError> {
    payment::verify_callback_secret(state.config.payment.callback_secret.as_deref(), query.secret.as_deref())?;
    Ok(Json(payment::record_notification(&state.pool, &form).await?))
}

/// `GET /api/customers/:id`
pub async fn get_customer(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<Customer>, ApiError> {
    Ok(Json(payment::get_customer(&state.pool, customer_id).await?))
}

/// `GET /api/customers/:id/payments`
pub async fn list_payments(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<Vec<Payment>>, ApiError> {
    Ok(Json(payment::list_payments(&state.pool, customer_id).await?))
}

/// `GET /api/customers/:id/credit-tokens`
pub async fn list_credit_tokens(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<Vec<CreditToken>>, ApiError> {
    Ok(Json(payment::list_credit_tokens(&state.pool, customer_id).await?))
}

/// `DELETE /api/credit-tokens/:id`
pub async fn delete_credit_token(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(token_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    payment::delete_credit_token(&state.pool, token_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// CHECKOUT
// =============================================================================

/// `POST /api/checkout`
pub async fn start_checkout(
    State(state): State<AppState>,
    _auth: AdminSession,
    Json(body): Json<StartCheckout>,
) -> Result<(StatusCode, Json<CheckoutStart>), ApiError> {
    let started = checkout::start_checkout(&state, body).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// `GET /api/checkout/:id`
pub async fn checkout_status(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(session_id): Path<Uuid>,
) -> Result<Json<CheckoutSession>, ApiError> {
    Ok(Json(checkout::checkout_status(&state, session_id).await?))
}

/// `DELETE /api/checkout/:id`
pub async fn cancel_checkout(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(session_id): Path<Uuid>,
) -> Result<Json<CheckoutSession>, ApiError> {
    Ok(Json(checkout::cancel_checkout(&state, session_id).await?))
}

/// `POST /api/checkout/:id/message`: relayed iframe `postMessage` payload.
pub async fn gateway_message(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<CheckoutSession>, ApiError> {
    Ok(Json(checkout::gateway_message(&state, session_id, &payload).await?))
}

#[cfg(test)]
#[path = "payments_test.rs"]
mod tests;
