//! Hosted-iframe checkout sessions and their confirmation pollers.
//!
//! DESIGN
//! ======
//! `start_checkout` hands the dashboard a form to POST into the gateway's
//! iframe and spawns one poller per session. The poller asks the
//! [`PaymentLedger`] on a fixed interval whether a paid row for the customer
//! appeared after the session started. It stops on the first hit, after
//! `max_attempts`, or when its cancel handle fires.
//!
//! Sessions live only in memory. Finished sessions are kept for a while so
//! the dashboard can read the final status, then pruned.

use std::collections::{BTreeMap, HashMap};

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PaymentGatewayConfig;
use crate::error::{ErrorCode, MSG_NOT_FOUND};
use crate::services::payment::{self, PaymentError};
use crate::state::AppState;

/// How long a finished session stays readable.
pub const FINISHED_RETENTION: time::Duration = time::Duration::minutes(10);

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("payment gateway is not configured")]
    NotConfigured,
    #[error("invalid amount: {0}")]
    InvalidAmount(f64),
    #[error("checkout session not found: {0}")]
    NotFound(Uuid),
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl ErrorCode for CheckoutError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "E_NOT_CONFIGURED",
            Self::InvalidAmount(_) => "E_VALIDATION",
            Self::NotFound(_) => "E_CHECKOUT_NOT_FOUND",
            Self::Payment(e) => e.error_code(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Payment(e) => e.status(),
        }
    }

    fn user_message(&self) -> &'static str {
        match self {
            Self::NotConfigured => "מערכת התשלומים אינה מוגדרת",
            Self::InvalidAmount(_) => "סכום התשלום אינו תקין",
            Self::NotFound(_) => MSG_NOT_FOUND,
            Self::Payment(e) => e.user_message(),
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Payment(e) if e.retryable())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckoutStatus {
    Pending,
    Paid { payment_id: Uuid },
    TimedOut,
    Cancelled,
    Failed { message: Option<String> },
}

impl CheckoutStatus {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub amount: f64,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// Ledger lookups made so far.
    pub attempts: u32,
    pub status: CheckoutStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
}

/// Registry slot: the session plus the cancel handle of its poller.
#[derive(Debug)]
pub struct CheckoutEntry {
    pub session: CheckoutSession,
    pub cancel: Option<oneshot::Sender<()>>,
}

impl CheckoutEntry {
    fn finish(&mut self, status: CheckoutStatus) -> bool {
        if !self.session.status.is_pending() {
            return false;
        }
        self.session.status = status;
        self.session.finished_at = Some(OffsetDateTime::now_utc());
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        true
    }
}

/// The form the dashboard POSTs into the payment iframe.
#[derive(Debug, Clone, Serialize)]
pub struct IframeForm {
    pub action: String,
    pub method: &'static str,
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutStart {
    pub session: CheckoutSession,
    pub form: IframeForm,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartCheckout {
    pub customer_id: Uuid,
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Build the hidden-field form for the gateway iframe.
#[must_use]
pub fn build_iframe_form(config: &PaymentGatewayConfig, session: &CheckoutSession) -> IframeForm {
    let mut fields = BTreeMap::new();
    fields.insert("terminal".to_owned(), config.terminal.clone());
    fields.insert("sum".to_owned(), format!("{:.2}", session.amount));
    fields.insert("currency".to_owned(), config.currency.clone());
    fields.insert("customer_id".to_owned(), session.customer_id.to_string());
    fields.insert("session_id".to_owned(), session.id.to_string());
    if let Some(notify_url) = &config.notify_url {
        fields.insert("notify_url".to_owned(), notify_url.clone());
    }
    if let Some(description) = &session.description {
        fields.insert("description".to_owned(), description.clone());
    }
    IframeForm { action: config.iframe_url.clone(), method: "POST", fields }
}

/// Drop sessions that finished more than [`FINISHED_RETENTION`] ago.
pub fn prune_finished(registry: &mut HashMap<Uuid, CheckoutEntry>, now: OffsetDateTime) -> usize {
    let before = registry.len();
    registry.retain(|_, entry| entry.session.finished_at.is_none_or(|at| now - at < FINISHED_RETENTION));
    before - registry.len()
}

fn validate_amount(amount: f64) -> Result<f64, CheckoutError> {
    if amount.is_finite() && amount > 0.0 { Ok(amount) } else { Err(CheckoutError::InvalidAmount(amount)) }
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Validate, confirm the customer exists, and open a polled session.
///
/// # Errors
///
/// Returns [`CheckoutError::NotConfigured`], an invalid amount, an unknown
/// customer, or a database error.
pub async fn start_checkout(state: &AppState, input: StartCheckout) -> Result<CheckoutStart, CheckoutError> {
    if !state.config.payment.enabled() {
        return Err(CheckoutError::NotConfigured);
    }
    let amount = validate_amount(input.amount)?;
    payment::get_customer(&state.pool, input.customer_id).await?;
    Ok(open_session(state, input.customer_id, amount, input.description).await)
}

pub(crate) async fn open_session(
    state: &AppState,
    customer_id: Uuid,
    amount: f64,
    description: Option<String>,
) -> CheckoutStart {
    let started_at = OffsetDateTime::now_utc();
    let session = CheckoutSession {
        id: Uuid::new_v4(),
        customer_id,
        amount,
        description: description.map(|d| d.trim().to_owned()).filter(|d| !d.is_empty()),
        started_at,
        attempts: 0,
        status: CheckoutStatus::Pending,
        finished_at: None,
    };
    let form = build_iframe_form(&state.config.payment, &session);
    let (cancel_tx, cancel_rx) = oneshot::channel();

    {
        let mut registry = state.checkouts.write().await;
        let pruned = prune_finished(&mut registry, started_at);
        if pruned > 0 {
            debug!(pruned, "pruned finished checkout sessions");
        }
        registry.insert(session.id, CheckoutEntry { session: session.clone(), cancel: Some(cancel_tx) });
    }

    spawn_poller(state.clone(), session.id, customer_id, started_at, cancel_rx);
    info!(session_id = %session.id, %customer_id, amount, "checkout started");
    CheckoutStart { session, form }
}

/// # Errors
///
/// Returns [`CheckoutError::NotFound`] for unknown or pruned sessions.
pub async fn checkout_status(state: &AppState, session_id: Uuid) -> Result<CheckoutSession, CheckoutError> {
    state
        .checkouts
        .read()
        .await
        .get(&session_id)
        .map(|entry| entry.session.clone())
        .ok_or(CheckoutError::NotFound(session_id))
}

/// Stop polling. Finished sessions are returned unchanged.
///
/// # Errors
///
/// Returns [`CheckoutError::NotFound`].
pub async fn cancel_checkout(state: &AppState, session_id: Uuid) -> Result<CheckoutSession, CheckoutError> {
    let mut registry = state.checkouts.write().await;
    let entry = registry.get_mut(&session_id).ok_or(CheckoutError::NotFound(session_id))?;
    if entry.finish(CheckoutStatus::Cancelled) {
        info!(%session_id, "checkout cancelled");
    }
    Ok(entry.session.clone())
}

/// What the iframe reported through `postMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayMessage {
    Failed { message: Option<String> },
    Succeeded,
    Other,
}

/// Classify a relayed iframe payload by its `status` field.
#[must_use]
pub fn parse_gateway_message(payload: &serde_json::Value) -> GatewayMessage {
    let status = payload
        .get("status")
        .and_then(serde_json::Value::as_str)
        .map(|s| s.trim().to_ascii_lowercase());
    match status.as_deref() {
        Some("failed" | "failure" | "error" | "declined") => GatewayMessage::Failed {
            message: payload
                .get("message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned),
        },
        Some("success" | "approved" | "paid") => GatewayMessage::Succeeded,
        _ => GatewayMessage::Other,
    }
}

/// Apply a relayed iframe message. A failure ends the session; success is
/// left for the poller to confirm against the ledger.
///
/// # Errors
///
/// Returns [`CheckoutError::NotFound`].
pub async fn gateway_message(
    state: &AppState,
    session_id: Uuid,
    payload: &serde_json::Value,
) -> Result<CheckoutSession, CheckoutError> {
    let mut registry = state.checkouts.write().await;
    let entry = registry.get_mut(&session_id).ok_or(CheckoutError::NotFound(session_id))?;
    match parse_gateway_message(payload) {
        GatewayMessage::Failed { message } => {
            if entry.finish(CheckoutStatus::Failed { message }) {
                warn!(%session_id, "gateway reported a failed payment");
            }
        }
        GatewayMessage::Succeeded => info!(%session_id, "gateway reported success, awaiting ledger"),
        GatewayMessage::Other => debug!(%session_id, "ignored gateway message"),
    }
    Ok(entry.session.clone())
}

// =============================================================================
// POLLER
// =============================================================================

fn spawn_poller(
    state: AppState,
    session_id: Uuid,
    customer_id: Uuid,
    since: OffsetDateTime,
    mut cancel_rx: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    let poll = state.config.payment.poll;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately; the first lookup waits one interval.
        ticker.tick().await;

        for attempt in 1..=poll.max_attempts {
            tokio::select! {
                _ = &mut cancel_rx => {
                    debug!(%session_id, attempt, "checkout poller stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let found = state.ledger.find_paid_since(customer_id, since).await;
            let mut registry = state.checkouts.write().await;
            let Some(entry) = registry.get_mut(&session_id) else {
                return;
            };
            if !entry.session.status.is_pending() {
                return;
            }
            entry.session.attempts = attempt;
            match found {
                Ok(Some(payment_id)) => {
                    entry.finish(CheckoutStatus::Paid { payment_id });
                    info!(%session_id, %payment_id, attempt, "checkout confirmed");
                    return;
                }
                Ok(None) => {}
                Err(e) => warn!(%session_id, attempt, error = %e, "payment lookup failed"),
            }
        }

        let mut registry = state.checkouts.write().await;
        if let Some(entry) = registry.get_mut(&session_id) {
            if entry.finish(CheckoutStatus::TimedOut) {
                info!(%session_id, attempts = poll.max_attempts, "checkout timed out");
            }
        }
    })
}

#[cfg(test)]
#[path = "checkout_test.rs"]
mod tests;
