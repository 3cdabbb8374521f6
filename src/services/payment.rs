//! Payments, stored card tokens and the gateway's server-to-server callback.
//!
//! DESIGN
//! ======
//! The hosted payment page posts its result to `notify`. That callback is the
//! only writer of `payments`; checkout pollers read the same table through
//! [`PaymentLedger`], so the dashboard learns about a completed payment even
//! when the iframe never reports back.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ErrorCode, MSG_DATABASE, MSG_NOT_FOUND};
use crate::services::session::secrets_match;

/// Gateway response code for an approved transaction.
pub const APPROVED_RESPONSE_CODE: &str = "000";

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("callback secret mismatch")]
    BadSecret,
    #[error("callback secret is not configured")]
    NotConfigured,
    #[error("customer not found: {0}")]
    CustomerNotFound(Uuid),
    #[error("credit token not found: {0}")]
    TokenNotFound(Uuid),
    #[error("invalid amount: {0}")]
    InvalidAmount(f64),
    #[error("missing transaction id")]
    MissingTransaction,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for PaymentError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::BadSecret => "E_FORBIDDEN",
            Self::NotConfigured => "E_NOT_CONFIGURED",
            Self::CustomerNotFound(_) => "E_CUSTOMER_NOT_FOUND",
            Self::TokenNotFound(_) => "E_TOKEN_NOT_FOUND",
            Self::InvalidAmount(_) | Self::MissingTransaction => "E_VALIDATION",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadSecret => StatusCode::FORBIDDEN,
            Self::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Self::CustomerNotFound(_) | Self::TokenNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidAmount(_) | Self::MissingTransaction => StatusCode::BAD_REQUEST,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn user_message(&self) -> &'static str {
        match self {
            Self::BadSecret => "הבקשה נדחתה",
            Self::NotConfigured => "מערכת התשלומים אינה מוגדרת",
            Self::CustomerNotFound(_) => "הלקוח לא נמצא",
            Self::TokenNotFound(_) => MSG_NOT_FOUND,
            Self::InvalidAmount(_) => "סכום התשלום אינו תקין",
            Self::MissingTransaction => "חסר מזהה עסקה",
            Self::Database(_) => MSG_DATABASE,
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }

    /// Unknown stored values read back as `Pending`.
    #[must_use]
    pub fn from_db(s: &str) -> Self {
        match s {
            "paid" => Self::Paid,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreditToken {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub token: String,
    pub last_four: Option<String>,
    pub expiry: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub amount: f64,
    pub status: PaymentStatus,
    pub credit_token_id: Option<Uuid>,
    pub transaction_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Form fields the gateway posts to the notify URL.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyForm {
    pub customer_id: Uuid,
    pub sum: f64,
    /// `000` means approved; anything else is a decline.
    pub response: String,
    pub transaction_id: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Card number as echoed by the gateway, usually already masked.
    #[serde(default)]
    pub last_four: Option<String>,
    #[serde(default)]
    pub expiry: Option<String>,
}

impl NotifyForm {
    #[must_use]
    pub fn status(&self) -> PaymentStatus {
        if self.response.trim() == APPROVED_RESPONSE_CODE { PaymentStatus::Paid } else { PaymentStatus::Failed }
    }

    /// Keep only the last four digits of whatever card number the gateway echoed.
    #[must_use]
    pub fn masked_last_four(&self) -> Option<String> {
        let digits: String = self.last_four.as_deref()?.chars().filter(char::is_ascii_digit).collect();
        let start = digits.len().saturating_sub(4);
        (!digits.is_empty()).then(|| digits[start..].to_owned())
    }
}

/// Result of handling one callback.
#[derive(Debug, Clone, Serialize)]
pub struct NotifyOutcome {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    /// `false` when the transaction id had already been recorded.
    pub created: bool,
}

// =============================================================================
// LEDGER
// =============================================================================

/// Read side used by checkout pollers. Enables mocking in tests.
#[async_trait::async_trait]
pub trait PaymentLedger: Send + Sync {
    /// First paid payment for `customer_id` created at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns the underlying database error.
    async fn find_paid_since(&self, customer_id: Uuid, since: OffsetDateTime) -> Result<Option<Uuid>, sqlx::Error>;
}

pub struct PgPaymentLedger {
    pool: PgPool,
}

impl PgPaymentLedger {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PaymentLedger for PgPaymentLedger {
    async fn find_paid_since(&self, customer_id: Uuid, since: OffsetDateTime) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT id FROM payments
             WHERE customer_id = $1 AND status = 'paid' AND created_at >= $2
             ORDER BY created_at ASC
             LIMIT 1",
        )
        .bind(customer_id)
        .bind(since)
        .fetch_optional(&self.pool)
        .await
    }
}

// =============================================================================
// CALLBACK
// =============================================================================

/// Check the shared secret the gateway appends to the notify URL.
///
/// # Errors
///
/// Returns [`PaymentError::NotConfigured`] or [`PaymentError::BadSecret`].
pub fn verify_callback_secret(configured: Option<&str>, given: Option<&str>) -> Result<(), PaymentError> {
    let configured = configured.ok_or(PaymentError::NotConfigured)?;
    match given {
        Some(given) if secrets_match(given, configured) => Ok(()),
        _ => Err(PaymentError::BadSecret),
    }
}

fn validate_form(form: &NotifyForm) -> Result<(), PaymentError> {
    if !form.sum.is_finite() || form.sum <= 0.0 {
        return Err(PaymentError::InvalidAmount(form.sum));
    }
    if form.transaction_id.trim().is_empty() {
        return Err(PaymentError::MissingTransaction);
    }
    Ok(())
}

/// Record a gateway callback. Replays of a known `transaction_id` return
/// the existing payment without writing.
///
/// # Errors
///
/// Returns a validation error, [`PaymentError::CustomerNotFound`], or a
/// database error.
pub async fn record_notification(pool: &PgPool, form: &NotifyForm) -> Result<NotifyOutcome, PaymentError> {
    validate_form(form)?;
    let transaction_id = form.transaction_id.trim();
    let status = form.status();

    let mut tx = pool.begin().await?;

    if let Some(row) = sqlx::query("SELECT id, status FROM payments WHERE transaction_id = $1")
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?
    {
        let status: String = row.get("status");
        info!(%transaction_id, "duplicate payment callback ignored");
        return Ok(NotifyOutcome { payment_id: row.get("id"), status: PaymentStatus::from_db(&status), created: false });
    }

    sqlx::query_scalar::<_, Uuid>("SELECT id FROM customers WHERE id = $1")
        .bind(form.customer_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(PaymentError::CustomerNotFound(form.customer_id))?;

    let credit_token_id = match (status, form.token.as_deref().map(str::trim)) {
        (PaymentStatus::Paid, Some(token)) if !token.is_empty() => {
            let id: Uuid = sqlx::query_scalar(
                "INSERT INTO credit_tokens (customer_id, token, last_four, expiry)
                 VALUES ($1, $2, $3, $4)
                 RETURNING id",
            )
            .bind(form.customer_id)
            .bind(token)
            .bind(form.masked_last_four())
            .bind(form.expiry.as_deref())
            .fetch_one(&mut *tx)
            .await?;
            Some(id)
        }
        _ => None,
    };

    // A concurrent replay can still win the race; the unique index turns
    // that into a no-op here.
    let inserted: Option<Uuid> = sqlx::query_scalar(
        "INSERT INTO payments (customer_id, amount, status, credit_token_id, transaction_id)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (transaction_id) DO NOTHING
         RETURNING id",
    )
    .bind(form.customer_id)
    .bind(form.sum)
    .bind(status.as_str())
    .bind(credit_token_id)
    .bind(transaction_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(payment_id) = inserted else {
        tx.rollback().await?;
        let row = sqlx::query("SELECT id, status FROM payments WHERE transaction_id = $1")
            .bind(transaction_id)
            .fetch_one(pool)
            .await?;
        let status: String = row.get("status");
        return Ok(NotifyOutcome { payment_id: row.get("id"), status: PaymentStatus::from_db(&status), created: false });
    };
    tx.commit().await?;

    if status == PaymentStatus::Paid {
        info!(%payment_id, customer_id = %form.customer_id, amount = form.sum, "payment recorded");
    } else {
        warn!(%payment_id, customer_id = %form.customer_id, response = %form.response, "declined payment recorded");
    }
    Ok(NotifyOutcome { payment_id, status, created: true })
}

// =============================================================================
// QUERIES
// =============================================================================

/// # Errors
///
/// Returns not-found or a database error.
pub async fn get_customer(pool: &PgPool, customer_id: Uuid) -> Result<Customer, PaymentError> {
    let row = sqlx::query("SELECT id, name, phone FROM customers WHERE id = $1")
        .bind(customer_id)
        .fetch_optional(pool)
        .await?
        .ok_or(PaymentError::CustomerNotFound(customer_id))?;
    Ok(Customer { id: row.get("id"), name: row.get("name"), phone: row.get("phone") })
}

/// Payments for a customer, newest first.
///
/// # Errors
///
/// Returns a database error.
pub async fn list_payments(pool: &PgPool, customer_id: Uuid) -> Result<Vec<Payment>, PaymentError> {
    let rows = sqlx::query(
        "SELECT id, customer_id, amount, status, credit_token_id, transaction_id, created_at
         FROM payments
         WHERE customer_id = $1
         ORDER BY created_at DESC",
    )
    .bind(customer_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            let status: String = r.get("status");
            Payment {
                id: r.get("id"),
                customer_id: r.get("customer_id"),
                amount: r.get("amount"),
                status: PaymentStatus::from_db(&status),
                credit_token_id: r.get("credit_token_id"),
                transaction_id: r.get("transaction_id"),
                created_at: r.get("created_at"),
            }
        })
        .collect())
}

/// # Errors
///
/// Returns a database error.
pub async fn list_credit_tokens(pool: &PgPool, customer_id: Uuid) -> Result<Vec<CreditToken>, PaymentError> {
    let rows = sqlx::query(
        "SELECT id, customer_id, token, last_four, expiry, created_at
         FROM credit_tokens
         WHERE customer_id = $1
         ORDER BY created_at DESC",
    )
    .bind(customer_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| CreditToken {
            id: r.get("id"),
            customer_id: r.get("customer_id"),
            token: r.get("token"),
            last_four: r.get("last_four"),
            expiry: r.get("expiry"),
            created_at: r.get("created_at"),
        })
        .collect())
}

/// Payments that used the token keep their rows; the reference is nulled.
///
/// # Errors
///
/// Returns not-found or a database error.
pub async fn delete_credit_token(pool: &PgPool, token_id: Uuid) -> Result<(), PaymentError> {
    let result = sqlx::query("DELETE FROM credit_tokens WHERE id = $1")
        .bind(token_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(PaymentError::TokenNotFound(token_id));
    }
    info!(%token_id, "credit token deleted");
    Ok(())
}

#[cfg(test)]
#[path = "payment_test.rs"]
mod tests;
