//! Constraint (station blackout / opening) routes.
//!
//! Rows are edited one at a time under `/api/constraints/:id`; the grouped
//! view the dashboard shows lives under `/api/constraints/:id/group`, where
//! `:id` is any member row (this is also the deep-link target).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::auth::AdminSession;
use crate::routes::stations::ActiveBody;
use crate::services::constraint::{
    self, Constraint, ConstraintFilter, ConstraintGroup, ConstraintInput, DeleteGroupRequest, UpdateConstraint,
};
use crate::state::AppState;

#[derive(Serialize)]
pub struct AffectedRows {
    pub affected: u64,
}

/// `GET /api/constraints`
pub async fn list_constraints(
    State(state): State<AppState>,
    _auth: AdminSession,
    Query(filter): Query<ConstraintFilter>,
) -> Result<Json<Vec<Constraint>>, ApiError> {
    Ok(Json(constraint::list_constraints(&state.pool, &filter).await?))
}

/// `GET /api/constraint-groups`
pub async fn list_constraint_groups(
    State(state): State<AppState>,
    _auth: AdminSession,
    Query(filter): Query<ConstraintFilter>,
) -> Result<Json<Vec<ConstraintGroup>>, ApiError> {
    Ok(Json(constraint::list_constraint_groups(&state.pool, &filter).await?))
}

/// `POST /api/constraints`: one row per selected station.
pub async fn create_constraints(
    State(state): State<AppState>,
    _auth: AdminSession,
    Json(body): Json<ConstraintInput>,
) -> Result<(StatusCode, Json<Vec<Constraint>>), ApiError> {
    let rows = constraint::create_constraints(&state.pool, body).await?;
    Ok((StatusCode::CREATED, Json(rows)))
}

/// `GET /api/constraints/:id`
pub async fn get_constraint(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(constraint_id): Path<Uuid>,
) -> Result<Json<Constraint>, ApiError> {
    Ok(Json(constraint::get_constraint(&state.pool, constraint_id).await?))
}

/// `PUT /api/constraints/:id`
pub async fn update_constraint(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(constraint_id): Path<Uuid>,
    Json(body): Json<UpdateConstraint>,
) -> Result<Json<Constraint>, ApiError> {
    Ok(Json(constraint::update_constraint(&state.pool, constraint_id, body).await?))
}

/// `DELETE /api/constraints/:id`
pub async fn delete_constraint(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(constraint_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    constraint::delete_constraint(&state.pool, constraint_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/constraints/:id/group`
pub async fn get_group(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(constraint_id): Path<Uuid>,
) -> Result<Json<ConstraintGroup>, ApiError> {
    Ok(Json(constraint::find_group_for_constraint(&state.pool, constraint_id).await?))
}

/// `PUT /api/constraints/:id/group`
pub async fn update_group(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(constraint_id): Path<Uuid>,
    Json(body): Json<ConstraintInput>,
) -> Result<Json<ConstraintGroup>, ApiError> {
    Ok(Json(constraint::update_group(&state.pool, constraint_id, body).await?))
}

/// `DELETE /api/constraints/:id/group`: body `{ "all_stations": true }` or
/// `{ "station_ids": [...] }`.
pub async fn delete_group(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(constraint_id): Path<Uuid>,
    Json(body): Json<DeleteGroupRequest>,
) -> Result<Json<AffectedRows>, ApiError> {
    let affected = constraint::delete_group(&state.pool, constraint_id, body.scope()).await?;
    Ok(Json(AffectedRows { affected }))
}

/// `PUT /api/constraints/:id/group/active`
pub async fn set_group_active(
    State(state): State<AppState>,
    _auth: AdminSession,
    Path(constraint_id): Path<Uuid>,
    Json(body): Json<ActiveBody>,
) -> Result<Json<AffectedRows>, ApiError> {
    let affected = constraint::set_group_active(&state.pool, constraint_id, body.is_active).await?;
    Ok(Json(AffectedRows { affected }))
}
