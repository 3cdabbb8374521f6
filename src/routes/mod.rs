//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The admin dashboard talks JSON to everything under `/api`. Every route
//! except login, health and the gateway callback requires an admin session.

pub mod auth;
pub mod catalog;
pub mod constraints;
pub mod payments;
pub mod stations;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full HTTP surface.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route(
            "/api/customer-types",
            get(stations::list_customer_types).post(stations::create_customer_type),
        )
        .route("/api/customer-types/{id}", axum::routing::delete(stations::delete_customer_type))
        .route("/api/stations", get(stations::list_stations).post(stations::create_station))
        .route("/api/stations/order", put(stations::reorder_stations))
        .route(
            "/api/stations/{id}",
            get(stations::get_station)
                .patch(stations::update_station)
                .delete(stations::delete_station),
        )
        .route("/api/stations/{id}/active", put(stations::set_station_active))
        .route("/api/stations/{id}/working-hours", put(stations::set_working_hours))
        .route("/api/stations/{id}/customer-types", put(stations::set_allowed_customer_types))
        .route("/api/stations/{id}/availability", get(stations::station_availability))
        .route(
            "/api/constraints",
            get(constraints::list_constraints).post(constraints::create_constraints),
        )
        .route("/api/constraint-groups", get(constraints::list_constraint_groups))
        .route(
            "/api/constraints/{id}",
            get(constraints::get_constraint)
                .put(constraints::update_constraint)
                .delete(constraints::delete_constraint),
        )
        .route(
            "/api/constraints/{id}/group",
            get(constraints::get_group)
                .put(constraints::update_group)
                .delete(constraints::delete_group),
        )
        .route("/api/constraints/{id}/group/active", put(constraints::set_group_active))
        .route("/api/services", get(catalog::list_services).post(catalog::create_service))
        .route("/api/services/order", put(catalog::reorder_services))
        .route(
            "/api/services/{id}",
            get(catalog::get_service)
                .patch(catalog::update_service)
                .delete(catalog::delete_service),
        )
        .route("/api/services/{id}/sub-actions", put(catalog::set_sub_actions))
        .route("/api/payments/notify", post(payments::notify))
        .route("/api/customers/{id}", get(payments::get_customer))
        .route("/api/customers/{id}/payments", get(payments::list_payments))
        .route("/api/customers/{id}/credit-tokens", get(payments::list_credit_tokens))
        .route("/api/credit-tokens/{id}", axum::routing::delete(payments::delete_credit_token))
        .route("/api/checkout", post(payments::start_checkout))
        .route(
            "/api/checkout/{id}",
            get(payments::checkout_status).delete(payments::cancel_checkout),
        )
        .route("/api/checkout/{id}/message", post(payments::gateway_message))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_helpers;

    #[tokio::test]
    async fn router_builds_without_route_conflicts() {
        let _router = app(test_helpers::test_app_state());
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        assert_eq!(healthz().await, StatusCode::OK);
    }
}
