//! Service configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 12;
pub const DEFAULT_PAYMENT_CURRENCY: &str = "1";
pub const DEFAULT_PAYMENT_POLL_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_PAYMENT_POLL_MAX_ATTEMPTS: u32 = 60;
pub const DEFAULT_BUSINESS_UTC_OFFSET_MINUTES: i32 = 120;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

/// Fixed-interval poll schedule for checkout confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_PAYMENT_POLL_INTERVAL_MS),
            max_attempts: DEFAULT_PAYMENT_POLL_MAX_ATTEMPTS,
        }
    }
}

/// Hosted payment page settings. The iframe is reached by a form POST whose
/// hidden fields are built from these values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentGatewayConfig {
    pub iframe_url: String,
    pub terminal: String,
    pub notify_url: Option<String>,
    /// Shared secret the gateway echoes back on its notify callback.
    pub callback_secret: Option<String>,
    pub currency: String,
    pub poll: PollConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    /// `None` disables admin login entirely.
    pub admin_password: Option<String>,
    pub session_ttl_hours: i64,
    pub cookie_secure: bool,
    pub payment: PaymentGatewayConfig,
    pub business_utc_offset_minutes: i32,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `DATABASE_URL`
    ///
    /// Optional:
    /// - `PORT` (default 3000), `DB_MAX_CONNECTIONS` (default 5)
    /// - `ADMIN_PASSWORD`, `SESSION_TTL_HOURS` (default 12), `COOKIE_SECURE`
    /// - `PAYMENT_IFRAME_URL`, `PAYMENT_TERMINAL`, `PAYMENT_NOTIFY_URL`,
    ///   `PAYMENT_CALLBACK_SECRET`, `PAYMENT_CURRENCY`
    /// - `PAYMENT_POLL_INTERVAL_MS` (default 3000), `PAYMENT_POLL_MAX_ATTEMPTS` (default 60)
    /// - `BUSINESS_UTC_OFFSET_MINUTES` (default 120)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when `DATABASE_URL` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            port: env_parse("PORT", DEFAULT_PORT),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            admin_password: env_non_empty("ADMIN_PASSWORD"),
            session_ttl_hours: env_parse("SESSION_TTL_HOURS", DEFAULT_SESSION_TTL_HOURS),
            cookie_secure: env_bool("COOKIE_SECURE").unwrap_or(false),
            payment: PaymentGatewayConfig::from_env(),
            business_utc_offset_minutes: env_parse("BUSINESS_UTC_OFFSET_MINUTES", DEFAULT_BUSINESS_UTC_OFFSET_MINUTES),
        })
    }
}

impl PaymentGatewayConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let interval_ms = env_parse("PAYMENT_POLL_INTERVAL_MS", DEFAULT_PAYMENT_POLL_INTERVAL_MS);
        let max_attempts = env_parse("PAYMENT_POLL_MAX_ATTEMPTS", DEFAULT_PAYMENT_POLL_MAX_ATTEMPTS).max(1);

        Self {
            iframe_url: std::env::var("PAYMENT_IFRAME_URL")
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
            terminal: std::env::var("PAYMENT_TERMINAL").unwrap_or_default(),
            notify_url: env_non_empty("PAYMENT_NOTIFY_URL"),
            callback_secret: env_non_empty("PAYMENT_CALLBACK_SECRET"),
            currency: env_non_empty("PAYMENT_CURRENCY").unwrap_or_else(|| DEFAULT_PAYMENT_CURRENCY.to_string()),
            poll: PollConfig { interval: Duration::from_millis(interval_ms), max_attempts },
        }
    }

    /// Checkout is only offered once an iframe URL and terminal are set.
    #[must_use]
    pub fn enabled(&self) -> bool {
        !(self.iframe_url.trim().is_empty() || self.terminal.trim().is_empty())
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
