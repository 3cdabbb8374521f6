//! Service catalog: bookable services and their ordered sub-actions.
//!
//! A "complicated" service is split into sub-actions that are timed
//! independently; its effective duration is the sum of the sub-actions.
//! Services without sub-actions use their own duration.

use std::collections::{HashMap, HashSet};

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::error::{ErrorCode, MSG_DATABASE, MSG_NOT_FOUND};

/// Upper bound for a service, a sub-action, and the sum of a service's
/// sub-actions.
pub const MAX_DURATION_MINUTES: i32 = 24 * 60;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("service not found: {0}")]
    NotFound(Uuid),
    #[error("service name is empty")]
    EmptyName,
    #[error("invalid price: {0}")]
    InvalidPrice(f64),
    #[error("duration out of range: {0}")]
    InvalidDuration(i32),
    #[error("sub-action {0} is invalid")]
    InvalidSubAction(usize),
    #[error("sub-actions add up to more than {MAX_DURATION_MINUTES} minutes")]
    SubActionsTooLong,
    #[error("reorder list does not match the current services")]
    InvalidOrder,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for CatalogError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_SERVICE_NOT_FOUND",
            Self::InvalidOrder => "E_INVALID_ORDER",
            Self::Database(_) => "E_DATABASE",
            _ => "E_VALIDATION",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound(_) => MSG_NOT_FOUND,
            Self::EmptyName => "יש להזין שם לשירות",
            Self::InvalidPrice(_) => "המחיר שהוזן אינו תקין",
            Self::InvalidDuration(_) => "משך השירות חייב להיות בין דקה ל-24 שעות",
            Self::InvalidSubAction(_) => "לכל פעולת משנה נדרשים שם ומשך זמן",
            Self::SubActionsTooLong => "סך משך פעולות המשנה עולה על 24 שעות",
            Self::InvalidOrder => "סדר השירותים השתנה, רעננו את הדף ונסו שוב",
            Self::Database(_) => MSG_DATABASE,
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSubAction {
    pub id: Uuid,
    pub service_id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub price: f64,
    pub duration_minutes: i32,
    pub is_active: bool,
    pub display_order: i32,
    pub sub_actions: Vec<ServiceSubAction>,
    pub effective_duration_minutes: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInput {
    pub name: String,
    pub price: f64,
    pub duration_minutes: i32,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateService {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub duration_minutes: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubActionInput {
    pub name: String,
    pub duration_minutes: i32,
}

/// Sub-action durations when present, else the service's own duration.
#[must_use]
pub fn effective_duration(duration_minutes: i32, sub_actions: &[ServiceSubAction]) -> i32 {
    if sub_actions.is_empty() {
        duration_minutes
    } else {
        sub_actions
            .iter()
            .fold(0_i32, |total, a| total.saturating_add(a.duration_minutes))
    }
}

fn validate_name(name: &str) -> Result<String, CatalogError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::EmptyName);
    }
    Ok(name.to_owned())
}

fn validate_price(price: f64) -> Result<f64, CatalogError> {
    if price.is_finite() && price >= 0.0 { Ok(price) } else { Err(CatalogError::InvalidPrice(price)) }
}

fn validate_duration(minutes: i32) -> Result<i32, CatalogError> {
    if (1..=MAX_DURATION_MINUTES).contains(&minutes) {
        Ok(minutes)
    } else {
        Err(CatalogError::InvalidDuration(minutes))
    }
}

fn validate_sub_actions(actions: Vec<SubActionInput>) -> Result<Vec<SubActionInput>, CatalogError> {
    let actions = actions
        .into_iter()
        .enumerate()
        .map(|(i, action)| {
            let name = action.name.trim();
            if name.is_empty() || !(1..=MAX_DURATION_MINUTES).contains(&action.duration_minutes) {
                return Err(CatalogError::InvalidSubAction(i));
            }
            Ok(SubActionInput { name: name.to_owned(), duration_minutes: action.duration_minutes })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let total = actions.iter().fold(0_i32, |total, a| total.saturating_add(a.duration_minutes));
    if total > MAX_DURATION_MINUTES {
        return Err(CatalogError::SubActionsTooLong);
    }
    Ok(actions)
}

// =============================================================================
// QUERIES
// =============================================================================

async fn load_sub_actions(
    pool: &PgPool,
    service_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<ServiceSubAction>>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (Uuid, Uuid, String, i32, i32)>(
        "SELECT id, service_id, name, duration_minutes, position
         FROM service_sub_actions
         WHERE service_id = ANY($1)
         ORDER BY service_id, position ASC",
    )
    .bind(service_ids)
    .fetch_all(pool)
    .await?;

    let mut out: HashMap<Uuid, Vec<ServiceSubAction>> = HashMap::new();
    for (id, service_id, name, duration_minutes, position) in rows {
        out.entry(service_id)
            .or_default()
            .push(ServiceSubAction { id, service_id, name, duration_minutes, position });
    }
    Ok(out)
}

/// List services in display order with their sub-actions.
///
/// # Errors
///
/// Returns a database error if a query fails.
pub async fn list_services(pool: &PgPool) -> Result<Vec<Service>, CatalogError> {
    let rows = sqlx::query(
        "SELECT id, name, price, duration_minutes, is_active, display_order
         FROM services
         ORDER BY display_order ASC, name ASC",
    )
    .fetch_all(pool)
    .await?;

    let ids: Vec<Uuid> = rows.iter().map(|r| r.get("id")).collect();
    let mut sub_actions = load_sub_actions(pool, &ids).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let id: Uuid = row.get("id");
            let duration_minutes: i32 = row.get("duration_minutes");
            let actions = sub_actions.remove(&id).unwrap_or_default();
            Service {
                id,
                name: row.get("name"),
                price: row.get("price"),
                duration_minutes,
                is_active: row.get("is_active"),
                display_order: row.get("display_order"),
                effective_duration_minutes: effective_duration(duration_minutes, &actions),
                sub_actions: actions,
            }
        })
        .collect())
}

/// # Errors
///
/// Returns not-found or a database error.
pub async fn get_service(pool: &PgPool, service_id: Uuid) -> Result<Service, CatalogError> {
    let row = sqlx::query(
        "SELECT id, name, price, duration_minutes, is_active, display_order FROM services WHERE id = $1",
    )
    .bind(service_id)
    .fetch_optional(pool)
    .await?
    .ok_or(CatalogError::NotFound(service_id))?;

    let actions = load_sub_actions(pool, &[service_id])
        .await?
        .remove(&service_id)
        .unwrap_or_default();
    let duration_minutes: i32 = row.get("duration_minutes");
    Ok(Service {
        id: service_id,
        name: row.get("name"),
        price: row.get("price"),
        duration_minutes,
        is_active: row.get("is_active"),
        display_order: row.get("display_order"),
        effective_duration_minutes: effective_duration(duration_minutes, &actions),
        sub_actions: actions,
    })
}

// =============================================================================
// WRITES
// =============================================================================

/// # Errors
///
/// Returns a validation error before any write, or a database error.
pub async fn create_service(pool: &PgPool, input: ServiceInput) -> Result<Service, CatalogError> {
    let name = validate_name(&input.name)?;
    let price = validate_price(input.price)?;
    let duration = validate_duration(input.duration_minutes)?;

    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO services (name, price, duration_minutes, is_active, display_order)
         VALUES ($1, $2, $3, $4, (SELECT COALESCE(MAX(display_order) + 1, 0) FROM services))
         RETURNING id",
    )
    .bind(&name)
    .bind(price)
    .bind(duration)
    .bind(input.is_active.unwrap_or(true))
    .fetch_one(pool)
    .await?;

    info!(service_id = %id, %name, "service created");
    get_service(pool, id).await
}

/// # Errors
///
/// Returns a validation error before any write, not-found, or a database error.
pub async fn update_service(pool: &PgPool, service_id: Uuid, input: UpdateService) -> Result<Service, CatalogError> {
    let name = input.name.as_deref().map(validate_name).transpose()?;
    let price = input.price.map(validate_price).transpose()?;
    let duration = input.duration_minutes.map(validate_duration).transpose()?;

    let result = sqlx::query(
        "UPDATE services
         SET name = COALESCE($2, name),
             price = COALESCE($3, price),
             duration_minutes = COALESCE($4, duration_minutes),
             is_active = COALESCE($5, is_active)
         WHERE id = $1",
    )
    .bind(service_id)
    .bind(name)
    .bind(price)
    .bind(duration)
    .bind(input.is_active)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CatalogError::NotFound(service_id));
    }
    get_service(pool, service_id).await
}

/// # Errors
///
/// Returns not-found or a database error.
pub async fn delete_service(pool: &PgPool, service_id: Uuid) -> Result<(), CatalogError> {
    let result = sqlx::query("DELETE FROM services WHERE id = $1")
        .bind(service_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CatalogError::NotFound(service_id));
    }
    Ok(())
}

/// Replace the ordered sub-action list. An empty list turns the service
/// back into a simple one.
///
/// # Errors
///
/// Returns a validation error before any write, not-found, or a database error.
pub async fn set_sub_actions(
    pool: &PgPool,
    service_id: Uuid,
    actions: Vec<SubActionInput>,
) -> Result<Service, CatalogError> {
    let actions = validate_sub_actions(actions)?;

    let mut tx = pool.begin().await?;
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM services WHERE id = $1 FOR UPDATE")
        .bind(service_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(CatalogError::NotFound(service_id))?;

    sqlx::query("DELETE FROM service_sub_actions WHERE service_id = $1")
        .bind(service_id)
        .execute(&mut *tx)
        .await?;
    for (position, action) in actions.iter().enumerate() {
        sqlx::query(
            "INSERT INTO service_sub_actions (service_id, name, duration_minutes, position)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(service_id)
        .bind(&action.name)
        .bind(action.duration_minutes)
        .bind(i32::try_from(position).unwrap_or(i32::MAX))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    info!(%service_id, count = actions.len(), "sub-actions replaced");
    get_service(pool, service_id).await
}

/// Persist a drag-and-drop order; `ids` must list every service once.
///
/// # Errors
///
/// Returns [`CatalogError::InvalidOrder`] or a database error.
pub async fn reorder_services(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<Service>, CatalogError> {
    let mut tx = pool.begin().await?;
    let current: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM services FOR UPDATE")
        .fetch_all(&mut *tx)
        .await?;

    let known: HashSet<Uuid> = current.into_iter().collect();
    let requested: HashSet<Uuid> = ids.iter().copied().collect();
    if requested.len() != ids.len() || requested != known {
        return Err(CatalogError::InvalidOrder);
    }

    for (index, id) in ids.iter().enumerate() {
        sqlx::query("UPDATE services SET display_order = $2 WHERE id = $1")
            .bind(id)
            .bind(i32::try_from(index).unwrap_or(i32::MAX))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    list_services(pool).await
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod tests;
