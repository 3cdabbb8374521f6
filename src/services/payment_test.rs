use super::*;
use crate::state::test_helpers;

fn form(response: &str) -> NotifyForm {
    NotifyForm {
        customer_id: Uuid::new_v4(),
        sum: 180.0,
        response: response.into(),
        transaction_id: "tx-1001".into(),
        token: Some("tok_abc".into()),
        last_four: Some("45xxxxxxxx1234".into()),
        expiry: Some("0528".into()),
    }
}

// =============================================================================
// NotifyForm
// =============================================================================

#[test]
fn approved_code_maps_to_paid() {
    assert_eq!(form("000").status(), PaymentStatus::Paid);
    assert_eq!(form(" 000 ").status(), PaymentStatus::Paid);
}

#[test]
fn any_other_code_maps_to_failed() {
    assert_eq!(form("004").status(), PaymentStatus::Failed);
    assert_eq!(form("").status(), PaymentStatus::Failed);
}

#[test]
fn masked_last_four_keeps_trailing_digits() {
    assert_eq!(form("000").masked_last_four().as_deref(), Some("1234"));

    let mut short = form("000");
    short.last_four = Some("12".into());
    assert_eq!(short.masked_last_four().as_deref(), Some("12"));

    short.last_four = Some("xxxx".into());
    assert_eq!(short.masked_last_four(), None);

    short.last_four = None;
    assert_eq!(short.masked_last_four(), None);
}

#[test]
fn notify_form_optional_fields_default_to_none() {
    let id = Uuid::new_v4();
    let json = serde_json::json!({
        "customer_id": id,
        "sum": 95.5,
        "response": "000",
        "transaction_id": "abc"
    });
    let parsed: NotifyForm = serde_json::from_value(json).unwrap();
    assert_eq!(parsed.customer_id, id);
    assert!(parsed.token.is_none());
    assert!(parsed.expiry.is_none());
}

#[test]
fn payment_status_db_strings() {
    for status in [PaymentStatus::Pending, PaymentStatus::Paid, PaymentStatus::Failed] {
        assert_eq!(PaymentStatus::from_db(status.as_str()), status);
    }
    assert_eq!(PaymentStatus::from_db("refunded"), PaymentStatus::Pending);
    assert_eq!(serde_json::to_value(PaymentStatus::Paid).unwrap(), "paid");
}

// =============================================================================
// verify_callback_secret
// =============================================================================

#[test]
fn callback_secret_must_match() {
    assert!(verify_callback_secret(Some("hook-secret"), Some("hook-secret")).is_ok());
    assert!(matches!(verify_callback_secret(Some("hook-secret"), Some("nope")), Err(PaymentError::BadSecret)));
    assert!(matches!(verify_callback_secret(Some("hook-secret"), None), Err(PaymentError::BadSecret)));
}

#[test]
fn callback_without_configured_secret_is_refused() {
    let err = verify_callback_secret(None, Some("anything")).unwrap_err();
    assert!(matches!(err, PaymentError::NotConfigured));
    assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// =============================================================================
// record_notification
// =============================================================================

#[tokio::test]
async fn invalid_amount_rejected_before_touching_db() {
    let state = test_helpers::test_app_state();
    let mut bad = form("000");
    bad.sum = 0.0;
    let err = record_notification(&state.pool, &bad).await.unwrap_err();
    assert!(matches!(err, PaymentError::InvalidAmount(_)));

    bad.sum = f64::NAN;
    let err = record_notification(&state.pool, &bad).await.unwrap_err();
    assert!(matches!(err, PaymentError::InvalidAmount(_)));
}

#[tokio::test]
async fn blank_transaction_rejected_before_touching_db() {
    let state = test_helpers::test_app_state();
    let mut bad = form("000");
    bad.transaction_id = "   ".into();
    let err = record_notification(&state.pool, &bad).await.unwrap_err();
    assert_eq!(err.error_code(), "E_VALIDATION");
}

#[tokio::test]
async fn database_failure_is_retryable() {
    let state = test_helpers::test_app_state();
    let err = record_notification(&state.pool, &form("000")).await.unwrap_err();
    assert!(matches!(err, PaymentError::Database(_)));
    assert!(err.retryable());
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    async fn live_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required for live-db-tests");
        let pool = PgPoolOptions::new().connect(&url).await.expect("connect");
        sqlx::migrate!("src/db/migrations").run(&pool).await.expect("migrate");
        pool
    }

    async fn seed_customer(pool: &PgPool) -> Uuid {
        sqlx::query_scalar("INSERT INTO customers (name, phone) VALUES ('Rex owner', '050-0000000') RETURNING id")
            .fetch_one(pool)
            .await
            .expect("customer")
    }

    #[tokio::test]
    async fn notify_is_idempotent_and_visible_to_ledger() {
        let pool = live_pool().await;
        let customer_id = seed_customer(&pool).await;
        let since = OffsetDateTime::now_utc() - time::Duration::seconds(5);

        let mut paid = form("000");
        paid.customer_id = customer_id;
        paid.transaction_id = format!("tx-{}", Uuid::new_v4());

        let first = record_notification(&pool, &paid).await.unwrap();
        assert!(first.created);
        let second = record_notification(&pool, &paid).await.unwrap();
        assert!(!second.created);
        assert_eq!(first.payment_id, second.payment_id);

        let ledger = PgPaymentLedger::new(pool.clone());
        assert_eq!(ledger.find_paid_since(customer_id, since).await.unwrap(), Some(first.payment_id));

        let payments = list_payments(&pool, customer_id).await.unwrap();
        assert_eq!(payments.len(), 1);
        let tokens = list_credit_tokens(&pool, customer_id).await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].last_four.as_deref(), Some("1234"));

        delete_credit_token(&pool, tokens[0].id).await.unwrap();
        let payments = list_payments(&pool, customer_id).await.unwrap();
        assert!(payments[0].credit_token_id.is_none());
    }

    #[tokio::test]
    async fn declined_payment_stores_no_token() {
        let pool = live_pool().await;
        let customer_id = seed_customer(&pool).await;
        let mut declined = form("033");
        declined.customer_id = customer_id;
        declined.transaction_id = format!("tx-{}", Uuid::new_v4());

        let outcome = record_notification(&pool, &declined).await.unwrap();
        assert_eq!(outcome.status, PaymentStatus::Failed);
        assert!(list_credit_tokens(&pool, customer_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_customer_is_rejected() {
        let pool = live_pool().await;
        let mut orphan = form("000");
        orphan.transaction_id = format!("tx-{}", Uuid::new_v4());
        let err = record_notification(&pool, &orphan).await.unwrap_err();
        assert!(matches!(err, PaymentError::CustomerNotFound(_)));
    }
}
