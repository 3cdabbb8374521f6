use super::*;

// =============================================================================
// bytes_to_hex
// =============================================================================

#[test]
fn bytes_to_hex_empty() {
    assert_eq!(bytes_to_hex(&[]), "");
}

#[test]
fn bytes_to_hex_leading_zero() {
    assert_eq!(bytes_to_hex(&[0x0a]), "0a");
}

#[test]
fn bytes_to_hex_multi_byte() {
    assert_eq!(bytes_to_hex(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
}

// =============================================================================
// generate_token
// =============================================================================

#[test]
fn generate_token_is_64_hex_chars() {
    let token = generate_token();
    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn generate_token_two_calls_differ() {
    assert_ne!(generate_token(), generate_token());
}

// =============================================================================
// secrets_match
// =============================================================================

#[test]
fn secrets_match_identical() {
    assert!(secrets_match("letmein", "letmein"));
}

#[test]
fn secrets_match_rejects_different_and_prefix() {
    assert!(!secrets_match("letmein", "letmeout"));
    assert!(!secrets_match("letme", "letmein"));
    assert!(!secrets_match("", "letmein"));
}

#[test]
fn secrets_match_is_case_sensitive() {
    assert!(!secrets_match("LetMeIn", "letmein"));
}

// =============================================================================
// DB paths against an unreachable pool
// =============================================================================

#[tokio::test]
async fn login_without_configured_password_is_unavailable() {
    let state = crate::state::test_helpers::test_app_state();
    let err = login(&state.pool, None, "letmein", 1).await.unwrap_err();
    assert!(matches!(err, LoginError::NotConfigured));
    assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn login_rejects_wrong_password_before_db() {
    let state = crate::state::test_helpers::test_app_state();
    let err = login(&state.pool, Some("letmein"), "guess", 1).await.unwrap_err();
    assert!(matches!(err, LoginError::WrongPassword));
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_with_right_password_reaches_db() {
    let state = crate::state::test_helpers::test_app_state();
    let err = login(&state.pool, Some("letmein"), "letmein", 1).await.unwrap_err();
    assert!(matches!(err, LoginError::Database(_)));
    assert!(err.retryable());
}

#[tokio::test]
async fn validate_session_surfaces_pool_errors() {
    let state = crate::state::test_helpers::test_app_state();
    assert!(validate_session(&state.pool, "abc").await.is_err());
}

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;

    async fn pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        crate::db::init_pool(&url, 2).await.expect("pool")
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let pool = pool().await;
        let token = create_session(&pool, 1).await.unwrap();
        let info = validate_session(&pool, &token).await.unwrap().expect("session");
        assert!(info.expires_at > info.created_at);

        delete_session(&pool, &token).await.unwrap();
        assert!(validate_session(&pool, &token).await.unwrap().is_none());
    }
}
