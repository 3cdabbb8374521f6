mod config;
mod db;
mod error;
mod routes;
mod services;
mod state;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::AppConfig::from_env().expect("invalid configuration");
    if config.admin_password.is_none() {
        tracing::warn!("ADMIN_PASSWORD not set, admin login disabled");
    }
    if config.payment.enabled() {
        tracing::info!(
            interval_ms = u64::try_from(config.payment.poll.interval.as_millis()).unwrap_or(u64::MAX),
            max_attempts = config.payment.poll.max_attempts,
            "payment checkout enabled"
        );
    } else {
        tracing::warn!("payment gateway not configured, checkout disabled");
    }

    let pool = db::init_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("database init failed");

    let port = config.port;
    let state = state::AppState::new(pool, config);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "stationdesk listening");
    axum::serve(listener, app).await.expect("server failed");
}
