use std::sync::Mutex;

use super::*;

static ENV_LOCK: Mutex<()> = Mutex::new(());

const KEYS: &[&str] = &[
    "DATABASE_URL",
    "PORT",
    "DB_MAX_CONNECTIONS",
    "ADMIN_PASSWORD",
    "SESSION_TTL_HOURS",
    "COOKIE_SECURE",
    "PAYMENT_IFRAME_URL",
    "PAYMENT_TERMINAL",
    "PAYMENT_NOTIFY_URL",
    "PAYMENT_CALLBACK_SECRET",
    "PAYMENT_CURRENCY",
    "PAYMENT_POLL_INTERVAL_MS",
    "PAYMENT_POLL_MAX_ATTEMPTS",
    "BUSINESS_UTC_OFFSET_MINUTES",
];

/// # Safety
/// Callers hold `ENV_LOCK` so no other test mutates the environment concurrently.
unsafe fn clear_env() {
    for key in KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

#[test]
fn from_env_requires_database_url() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    unsafe { clear_env() };

    let err = AppConfig::from_env().unwrap_err();
    assert!(err.to_string().contains("DATABASE_URL"));
}

#[test]
fn from_env_applies_defaults() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    unsafe {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/stationdesk");
    }

    let cfg = AppConfig::from_env().unwrap();
    assert_eq!(cfg.port, DEFAULT_PORT);
    assert_eq!(cfg.db_max_connections, DEFAULT_DB_MAX_CONNECTIONS);
    assert_eq!(cfg.admin_password, None);
    assert_eq!(cfg.session_ttl_hours, DEFAULT_SESSION_TTL_HOURS);
    assert!(!cfg.cookie_secure);
    assert_eq!(cfg.payment.poll, PollConfig::default());
    assert_eq!(cfg.payment.currency, DEFAULT_PAYMENT_CURRENCY);
    assert!(!cfg.payment.enabled());
    assert_eq!(cfg.business_utc_offset_minutes, DEFAULT_BUSINESS_UTC_OFFSET_MINUTES);

    unsafe { clear_env() };
}

#[test]
fn from_env_parses_payment_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    unsafe {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/stationdesk");
        std::env::set_var("PAYMENT_IFRAME_URL", "https://pay.example.test/iframe/");
        std::env::set_var("PAYMENT_TERMINAL", "groomer01");
        std::env::set_var("PAYMENT_CALLBACK_SECRET", "  s3cret ");
        std::env::set_var("PAYMENT_POLL_INTERVAL_MS", "250");
        std::env::set_var("PAYMENT_POLL_MAX_ATTEMPTS", "4");
        std::env::set_var("COOKIE_SECURE", "yes");
    }

    let cfg = AppConfig::from_env().unwrap();
    assert_eq!(cfg.payment.iframe_url, "https://pay.example.test/iframe");
    assert_eq!(cfg.payment.terminal, "groomer01");
    assert_eq!(cfg.payment.callback_secret.as_deref(), Some("s3cret"));
    assert_eq!(cfg.payment.poll.interval, Duration::from_millis(250));
    assert_eq!(cfg.payment.poll.max_attempts, 4);
    assert!(cfg.payment.enabled());
    assert!(cfg.cookie_secure);

    unsafe { clear_env() };
}

#[test]
fn invalid_numbers_fall_back_and_zero_attempts_clamp() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    unsafe {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/stationdesk");
        std::env::set_var("PORT", "not-a-port");
        std::env::set_var("PAYMENT_POLL_MAX_ATTEMPTS", "0");
    }

    let cfg = AppConfig::from_env().unwrap();
    assert_eq!(cfg.port, DEFAULT_PORT);
    assert_eq!(cfg.payment.poll.max_attempts, 1);

    unsafe { clear_env() };
}

#[test]
fn env_bool_accepts_common_spellings() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    unsafe { std::env::set_var("__STATIONDESK_TEST_BOOL__", "On") };
    assert_eq!(env_bool("__STATIONDESK_TEST_BOOL__"), Some(true));
    unsafe { std::env::set_var("__STATIONDESK_TEST_BOOL__", "maybe") };
    assert_eq!(env_bool("__STATIONDESK_TEST_BOOL__"), None);
    unsafe { std::env::remove_var("__STATIONDESK_TEST_BOOL__") };
}
