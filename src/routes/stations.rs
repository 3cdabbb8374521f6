//! Station, customer-type and availability routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::auth::AdminSession;
use crate::services::availability::{self, StationAvailability};
use crate::services::customer_type::{self, CustomerType};
use crate::services::station::{self, CreateStation, Station, UpdateStation};
use crate::services::working_hours::WorkingShift;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ActiveBody {
    pub is_active: bool,
}

#[derive(Deserialize)]
pub struct OrderBody {
    pub ids: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct CustomerTypesBody {
    pub customer_type_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct NameBody {
    pub name: String,
}

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub date: String,
    /// Overrides the configured business offset.
    pub utc_offset_minutes: Option<i32>,
}

// =============================================================================
// STATIONS
// =============================================================================

/// `GET /api/stations`
pub async fn list_stations(State(state): State<AppState>, _auth: AdminSession) -> Result<Json<Vec<Station>>, ApiError> {
    Ok(Json(station::list_stations(&state).await?))
}

/// `POST /api/stations`
pub async fn create_station(
    State(state): State<AppState>,
    _auth: AdminSession,
    Json(body): Json<CreateStation>,
) -> Result<(StatusCode, Json<Station>), ApiError> {
    let created = station::create_station(&state, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/stations/:id`
pub async fn get_station(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(station_id): Path<Uuid>,
) -> Result<Json<Station>, ApiError> {
    Ok(Json(station::get_station(&state, station_id).await?))
}

/// `PATCH /api/stations/:id`
pub async fn update_station(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(station_id): Path<Uuid>,
    Json(body): Json<UpdateStation>,
) -> Result<Json<Station>, ApiError> {
    Ok(Json(station::update_station(&state, station_id, body).await?))
}

/// `DELETE /api/stations/:id`
pub async fn delete_station(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(station_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    station::delete_station(&state, station_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /api/stations/:id/active`: optimistic toggle.
pub async fn set_station_active(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(station_id): Path<Uuid>,
    Json(body): Json<ActiveBody>,
) -> Result<Json<Station>, ApiError> {
    station::set_station_active(&state, station_id, body.is_active).await?;
    Ok(Json(station::get_station(&state, station_id).await?))
}

/// `PUT /api/stations/order`: drag-and-drop reorder.
pub async fn reorder_stations(
    State(state): State<AppState>,
    _auth: AdminSession,
    Json(body): Json<OrderBody>,
) -> Result<Json<Vec<Station>>, ApiError> {
    Ok(Json(station::reorder_stations(&state, &body.ids).await?))
}

/// `PUT /api/stations/:id/working-hours`
pub async fn set_working_hours(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(station_id): Path<Uuid>,
    Json(shifts): Json<Vec<WorkingShift>>,
) -> Result<Json<Station>, ApiError> {
    Ok(Json(station::set_working_hours(&state, station_id, shifts).await?))
}

/// `PUT /api/stations/:id/customer-types`
pub async fn set_allowed_customer_types(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(station_id): Path<Uuid>,
    Json(body): Json<CustomerTypesBody>,
) -> Result<Json<Station>, ApiError> {
    Ok(Json(station::set_allowed_customer_types(&state, station_id, &body.customer_type_ids).await?))
}

/// `GET /api/stations/:id/availability?date=YYYY-MM-DD`
pub async fn station_availability(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(station_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<StationAvailability>, ApiError> {
    let date = availability::parse_date(&query.date)?;
    let offset = query
        .utc_offset_minutes
        .unwrap_or(state.config.business_utc_offset_minutes);
    Ok(Json(availability::station_availability(&state, station_id, date, offset).await?))
}

// =============================================================================
// CUSTOMER TYPES
// =============================================================================

/// `GET /api/customer-types`
pub async fn list_customer_types(
    State(state): State<AppState>,
    _auth: AdminSession,
) -> Result<Json<Vec<CustomerType>>, ApiError> {
    Ok(Json(customer_type::list_customer_types(&state.pool).await?))
}

/// `POST /api/customer-types`
pub async fn create_customer_type(
    State(state): State<AppState>,
    _auth: AdminSession,
    Json(body): Json<NameBody>,
) -> Result<(StatusCode, Json<CustomerType>), ApiError> {
    let created = customer_type::create_customer_type(&state.pool, &body.name).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `DELETE /api/customer-types/:id`
pub async fn delete_customer_type(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(type_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    customer_type::delete_customer_type(&state, type_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
