//! Service catalog routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::auth::AdminSession;
use crate::routes::stations::OrderBody;
use crate::services::catalog::{self, Service, ServiceInput, SubActionInput, UpdateService};
use crate::state::AppState;

/// `GET /api/services`
pub async fn list_services(State(state): State<AppState>, _auth: AdminSession) -> Result<Json<Vec<Service>>, ApiError> {
    Ok(Json(catalog::list_services(&state.pool).await?))
}

/// `POST /api/services`
pub async fn create_service(
    State(state): State<AppState>,
    _auth: AdminSession,
    Json(body): Json<ServiceInput>,
) -> Result<(StatusCode, Json<Service>), ApiError> {
    let created = catalog::create_service(&state.pool, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/services/:id`
pub async fn get_service(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(service_id): Path<Uuid>,
) -> Result<Json<Service>, ApiError> {
    Ok(Json(catalog::get_service(&state.pool, service_id).await?))
}

/// `PATCH /api/services/:id`
pub async fn update_service(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(service_id): Path<Uuid>,
    Json(body): Json<UpdateService>,
) -> Result<Json<Service>, ApiError> {
    Ok(Json(catalog::update_service(&state.pool, service_id, body).await?))
}

/// `DELETE /api/services/:id`
pub async fn delete_service(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(service_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    catalog::delete_service(&state.pool, service_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /api/services/:id/sub-actions`
pub async fn set_sub_actions(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(service_id): Path<Uuid>,
    Json(actions): Json<Vec<SubActionInput>>,
) -> Result<Json<Service>, ApiError> {
    Ok(Json(catalog::set_sub_actions(&state.pool, service_id, actions).await?))
}

/// `PUT /api/services/order`
pub async fn reorder_services(
    State(state): State<AppState>,
    _auth: AdminSession,
    Json(body): Json<OrderBody>,
) -> Result<Json<Vec<Service>>, ApiError> {
    Ok(Json(catalog::reorder_services(&state.pool, &body.ids).await?))
}
