use axum::extract::FromRequestParts;
use axum::http::Request;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::response::IntoResponse;

use super::*;
use crate::state::test_helpers;

fn parts_with_cookie(cookie: Option<&str>) -> axum::http::request::Parts {
    let mut builder = Request::builder().uri("/api/auth/me");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(()).unwrap().into_parts().0
}

// =============================================================================
// AdminSession extractor
// =============================================================================

#[tokio::test]
async fn missing_cookie_is_unauthorized() {
    let state = test_helpers::test_app_state();
    let mut parts = parts_with_cookie(None);
    let err = AdminSession::from_request_parts(&mut parts, &state).await.err().unwrap();
    assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    assert_eq!(err.body.code, "E_UNAUTHORIZED");
}

#[tokio::test]
async fn empty_cookie_is_unauthorized() {
    let state = test_helpers::test_app_state();
    let mut parts = parts_with_cookie(Some("session_token="));
    let err = AdminSession::from_request_parts(&mut parts, &state).await.err().unwrap();
    assert_eq!(err.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unrelated_cookie_is_unauthorized() {
    let state = test_helpers::test_app_state();
    let mut parts = parts_with_cookie(Some("theme=dark"));
    let err = AdminSession::from_request_parts(&mut parts, &state).await.err().unwrap();
    assert_eq!(err.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn lookup_failure_is_server_error() {
    let state = test_helpers::test_app_state();
    let mut parts = parts_with_cookie(Some("session_token=abc123"));
    let err = AdminSession::from_request_parts(&mut parts, &state).await.err().unwrap();
    assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(err.body.retryable);
}

// =============================================================================
// login
// =============================================================================

#[tokio::test]
async fn login_with_wrong_password_sets_no_cookie() {
    let state = test_helpers::test_app_state();
    let result = login(State(state), CookieJar::new(), Json(LoginBody { password: "nope".into() })).await;
    let response = match result {
        Ok(_) => panic!("login should fail"),
        Err(err) => {
            assert_eq!(err.status, StatusCode::UNAUTHORIZED);
            err.into_response()
        }
    };
    assert!(response.headers().get(SET_COOKIE).is_none());
}

#[test]
fn session_cookie_is_http_only_and_lax() {
    let cookie = session_cookie("tok".into(), true);
    assert_eq!(cookie.name(), COOKIE_NAME);
    assert_eq!(cookie.value(), "tok");
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.secure(), Some(true));
    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    assert_eq!(cookie.path(), Some("/"));
}
