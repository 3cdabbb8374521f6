//! Station service: CRUD, working hours, allowed customer types, and the
//! optimistic station cache.
//!
//! DESIGN
//! ======
//! Reads go through the in-memory [`StationCache`]. The first read fills it
//! under `station_load` so concurrent dashboards issue one fetch. Structural
//! writes (create, update, delete, hours) go to Postgres first and then
//! invalidate the cache.
//!
//! ERROR HANDLING
//! ==============
//! The active toggle and drag-and-drop reordering are optimistic: the cache
//! changes first and the database write follows. If that write fails only
//! the fields this request changed are put back, and only where they still
//! hold the value it wrote. Concurrent writes and invalidations survive.

use std::collections::{HashMap, HashSet};

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ErrorCode, MSG_DATABASE, MSG_NOT_FOUND};
use crate::services::working_hours::{self, ShiftError, WorkingShift};
use crate::state::{AppState, StationCache};

pub const MIN_SLOT_INTERVAL_MINUTES: i32 = 5;
pub const MAX_SLOT_INTERVAL_MINUTES: i32 = 240;
pub const DEFAULT_SLOT_INTERVAL_MINUTES: i32 = 30;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StationError {
    #[error("station not found: {0}")]
    NotFound(Uuid),
    #[error("station name is empty")]
    EmptyName,
    #[error("slot interval out of range: {0}")]
    InvalidSlotInterval(i32),
    #[error("reorder list does not match the current stations")]
    InvalidOrder,
    #[error("unknown customer type: {0}")]
    UnknownCustomerType(Uuid),
    #[error("invalid working hours: {0}")]
    Shift(#[from] ShiftError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for StationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_STATION_NOT_FOUND",
            Self::EmptyName | Self::InvalidSlotInterval(_) | Self::UnknownCustomerType(_) => "E_VALIDATION",
            Self::InvalidOrder => "E_INVALID_ORDER",
            Self::Shift(_) => "E_INVALID_HOURS",
            Self::Database(_) => "E_DATABASE",
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
            Self::EmptyName => "יש להזין שם לעמדה",
            Self::InvalidSlotInterval(_) => "מרווח הזמן בין תורים אינו תקין",
            Self::InvalidOrder => "סדר העמדות השתנה, רעננו את הדף ונסו שוב",
            Self::UnknownCustomerType(_) => "סוג הלקוח שנבחר אינו קיים",
            Self::Shift(ShiftError::CloseBeforeOpen { .. }) => "שעת הסיום חייבת להיות אחרי שעת ההתחלה",
            Self::Shift(ShiftError::Overlap(_)) => "קיימת חפיפה בין משמרות באותו יום",
            Self::Shift(_) => "שעות הפעילות אינן תקינות",
            Self::Database(_) => MSG_DATABASE,
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub slot_interval_minutes: i32,
    pub display_order: i32,
    pub allowed_customer_type_ids: Vec<Uuid>,
    pub working_hours: Vec<WorkingShift>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateStation {
    pub name: String,
    pub is_active: Option<bool>,
    pub slot_interval_minutes: Option<i32>,
    #[serde(default)]
    pub allowed_customer_type_ids: Vec<Uuid>,
    #[serde(default)]
    pub working_hours: Vec<WorkingShift>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateStation {
    pub name: Option<String>,
    pub slot_interval_minutes: Option<i32>,
}

// =============================================================================
// VALIDATION
// =============================================================================

fn validate_name(name: &str) -> Result<String, StationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StationError::EmptyName);
    }
    Ok(trimmed.to_owned())
}

fn validate_interval(minutes: i32) -> Result<i32, StationError> {
    if (MIN_SLOT_INTERVAL_MINUTES..=MAX_SLOT_INTERVAL_MINUTES).contains(&minutes) {
        Ok(minutes)
    } else {
        Err(StationError::InvalidSlotInterval(minutes))
    }
}

/// `ids` must name every station exactly once.
fn validate_permutation(current: &[Station], ids: &[Uuid]) -> Result<(), StationError> {
    if ids.len() != current.len() {
        return Err(StationError::InvalidOrder);
    }
    let known: HashSet<Uuid> = current.iter().map(|s| s.id).collect();
    let requested: HashSet<Uuid> = ids.iter().copied().collect();
    if requested.len() != ids.len() || requested != known {
        return Err(StationError::InvalidOrder);
    }
    Ok(())
}

// =============================================================================
// LOADING
// =============================================================================

/// Load every station with its allowed customer types and working hours.
///
/// # Errors
///
/// Returns a database error if any query fails.
pub async fn load_all_stations(pool: &PgPool) -> Result<Vec<Station>, StationError> {
    let rows = sqlx::query(
        "SELECT id, name, is_active, slot_interval_minutes, display_order
         FROM stations
         ORDER BY display_order ASC, name ASC",
    )
    .fetch_all(pool)
    .await?;

    let type_rows = sqlx::query_as::<_, (Uuid, Uuid)>(
        "SELECT station_id, customer_type_id FROM station_allowed_customer_types ORDER BY customer_type_id",
    )
    .fetch_all(pool)
    .await?;

    let hour_rows = sqlx::query_as::<_, (Uuid, i16, i16, String, String)>(
        "SELECT station_id, weekday, shift_index, open_time, close_time
         FROM station_working_hours
         ORDER BY weekday ASC, shift_index ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut types: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (station_id, type_id) in type_rows {
        types.entry(station_id).or_default().push(type_id);
    }

    let mut hours: HashMap<Uuid, Vec<WorkingShift>> = HashMap::new();
    for (station_id, weekday, shift_index, open, close) in hour_rows {
        hours
            .entry(station_id)
            .or_default()
            .push(WorkingShift { weekday, open, close, shift_index });
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let id: Uuid = row.get("id");
            Station {
                id,
                name: row.get("name"),
                is_active: row.get("is_active"),
                slot_interval_minutes: row.get("slot_interval_minutes"),
                display_order: row.get("display_order"),
                allowed_customer_type_ids: types.remove(&id).unwrap_or_default(),
                working_hours: hours.remove(&id).unwrap_or_default(),
            }
        })
        .collect())
}

/// List stations, filling the cache on first use.
///
/// # Errors
///
/// Returns a database error if the initial load fails.
pub async fn list_stations(state: &AppState) -> Result<Vec<Station>, StationError> {
    {
        let cache = state.stations.read().await;
        if cache.loaded {
            return Ok(cache.stations.clone());
        }
    }

    let _load = state.station_load.lock().await;

    // Another request may have filled the cache while we waited.
    {
        let cache = state.stations.read().await;
        if cache.loaded {
            return Ok(cache.stations.clone());
        }
    }

    let stations = load_all_stations(&state.pool).await?;
    let mut cache = state.stations.write().await;
    cache.stations.clone_from(&stations);
    cache.loaded = true;
    info!(count = stations.len(), "station cache loaded");
    Ok(stations)
}

/// # Errors
///
/// Returns [`StationError::NotFound`] for an unknown id.
pub async fn get_station(state: &AppState, station_id: Uuid) -> Result<Station, StationError> {
    list_stations(state)
        .await?
        .into_iter()
        .find(|s| s.id == station_id)
        .ok_or(StationError::NotFound(station_id))
}

async fn invalidate_cache(state: &AppState) {
    state.stations.write().await.invalidate();
}

// =============================================================================
// CRUD
// =============================================================================

/// Create a station at the end of the display order.
///
/// # Errors
///
/// Returns a validation error before any write, or a database error.
pub async fn create_station(state: &AppState, input: CreateStation) -> Result<Station, StationError> {
    let name = validate_name(&input.name)?;
    let interval = validate_interval(input.slot_interval_minutes.unwrap_or(DEFAULT_SLOT_INTERVAL_MINUTES))?;
    let hours = working_hours::normalize_shifts(input.working_hours)?;

    let mut tx = state.pool.begin().await?;
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO stations (name, is_active, slot_interval_minutes, display_order)
         VALUES ($1, $2, $3, (SELECT COALESCE(MAX(display_order) + 1, 0) FROM stations))
         RETURNING id",
    )
    .bind(&name)
    .bind(input.is_active.unwrap_or(true))
    .bind(interval)
    .fetch_one(&mut *tx)
    .await?;

    replace_customer_types(&mut tx, id, &input.allowed_customer_type_ids).await?;
    replace_hours(&mut tx, id, &hours).await?;
    tx.commit().await?;

    invalidate_cache(state).await;
    info!(station_id = %id, %name, "station created");
    get_station(state, id).await
}

/// Update name and/or slot interval.
///
/// # Errors
///
/// Returns a validation, not-found, or database error.
pub async fn update_station(state: &AppState, station_id: Uuid, input: UpdateStation) -> Result<Station, StationError> {
    let name = input.name.as_deref().map(validate_name).transpose()?;
    let interval = input.slot_interval_minutes.map(validate_interval).transpose()?;

    let result = sqlx::query(
        "UPDATE stations
         SET name = COALESCE($2, name),
             slot_interval_minutes = COALESCE($3, slot_interval_minutes)
         WHERE id = $1",
    )
    .bind(station_id)
    .bind(name)
    .bind(interval)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StationError::NotFound(station_id));
    }

    invalidate_cache(state).await;
    get_station(state, station_id).await
}

/// Delete a station. Constraints and hours cascade.
///
/// # Errors
///
/// Returns not-found or a database error.
pub async fn delete_station(state: &AppState, station_id: Uuid) -> Result<(), StationError> {
    let result = sqlx::query("DELETE FROM stations WHERE id = $1")
        .bind(station_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StationError::NotFound(station_id));
    }

    invalidate_cache(state).await;
    info!(%station_id, "station deleted");
    Ok(())
}

// =============================================================================
// OPTIMISTIC UPDATES
// =============================================================================

/// Set the active flag in the cache. Returns the previous value, or `None`
/// if the cache holds nothing to update.
fn apply_active_flag(cache: &mut StationCache, station_id: Uuid, is_active: bool) -> Option<bool> {
    if !cache.loaded {
        return None;
    }
    let station = cache.get_mut(station_id)?;
    Some(std::mem::replace(&mut station.is_active, is_active))
}

/// Undo [`apply_active_flag`] for one station. A value that no longer
/// matches `applied` belongs to a later write and is left alone.
fn revert_active_flag(cache: &mut StationCache, station_id: Uuid, previous: bool, applied: bool) -> bool {
    if !cache.loaded {
        return false;
    }
    match cache.get_mut(station_id) {
        Some(station) if station.is_active == applied => {
            station.is_active = previous;
            true
        }
        _ => false,
    }
}

/// Reorder the cached list to match `ids`. Returns each moved station's
/// previous `(id, display_order)`.
fn apply_order(cache: &mut StationCache, ids: &[Uuid]) -> Option<Vec<(Uuid, i32)>> {
    if !cache.loaded {
        return None;
    }
    let mut previous = Vec::with_capacity(ids.len());
    for (index, id) in ids.iter().enumerate() {
        if let Some(station) = cache.get_mut(*id) {
            previous.push((*id, station.display_order));
            station.display_order = order_value(index);
        }
    }
    sort_cached(cache);
    Some(previous)
}

/// Undo [`apply_order`]. Only positions still holding the value this
/// request wrote are restored.
fn revert_order(cache: &mut StationCache, ids: &[Uuid], previous: &[(Uuid, i32)]) -> usize {
    if !cache.loaded {
        return 0;
    }
    let applied: HashMap<Uuid, i32> = ids.iter().enumerate().map(|(i, id)| (*id, order_value(i))).collect();
    let mut restored = 0;
    for (id, old_order) in previous {
        if let Some(station) = cache.get_mut(*id)
            && applied.get(id) == Some(&station.display_order)
        {
            station.display_order = *old_order;
            restored += 1;
        }
    }
    sort_cached(cache);
    restored
}

fn order_value(index: usize) -> i32 {
    i32::try_from(index).unwrap_or(i32::MAX)
}

fn sort_cached(cache: &mut StationCache) {
    cache
        .stations
        .sort_by(|a, b| a.display_order.cmp(&b.display_order).then_with(|| a.name.cmp(&b.name)));
}

async fn rollback_active_flag(state: &AppState, station_id: Uuid, previous: Option<bool>, applied: bool) {
    let Some(previous) = previous else { return };
    let mut cache = state.stations.write().await;
    if revert_active_flag(&mut cache, station_id, previous, applied) {
        warn!(%station_id, "station active flag rolled back after failed write");
    }
}

async fn rollback_order(state: &AppState, ids: &[Uuid], previous: Option<Vec<(Uuid, i32)>>) {
    let Some(previous) = previous else { return };
    let mut cache = state.stations.write().await;
    let restored = revert_order(&mut cache, ids, &previous);
    if restored > 0 {
        warn!(restored, "station order rolled back after failed write");
    }
}

/// Toggle a station's active flag. The cache reflects the new value before
/// the database write completes and is reverted if the write fails.
///
/// # Errors
///
/// Returns not-found or a database error; in both cases the cache is restored.
pub async fn set_station_active(state: &AppState, station_id: Uuid, is_active: bool) -> Result<(), StationError> {
    let previous = {
        let mut cache = state.stations.write().await;
        apply_active_flag(&mut cache, station_id, is_active)
    };

    let result = sqlx::query("UPDATE stations SET is_active = $2 WHERE id = $1")
        .bind(station_id)
        .bind(is_active)
        .execute(&state.pool)
        .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => {
            rollback_active_flag(state, station_id, previous, is_active).await;
            Err(StationError::NotFound(station_id))
        }
        Ok(_) => {
            info!(%station_id, is_active, "station active flag updated");
            Ok(())
        }
        Err(e) => {
            rollback_active_flag(state, station_id, previous, is_active).await;
            Err(e.into())
        }
    }
}

/// Persist a drag-and-drop order. `ids` must list every station once.
///
/// # Errors
///
/// Returns [`StationError::InvalidOrder`] before any change, or a database
/// error after which the cache is restored.
pub async fn reorder_stations(state: &AppState, ids: &[Uuid]) -> Result<Vec<Station>, StationError> {
    let current = list_stations(state).await?;
    validate_permutation(&current, ids)?;

    let previous = {
        let mut cache = state.stations.write().await;
        apply_order(&mut cache, ids)
    };

    if let Err(e) = write_order(&state.pool, ids).await {
        rollback_order(state, ids, previous).await;
        return Err(e.into());
    }

    info!(count = ids.len(), "stations reordered");
    list_stations(state).await
}

async fn write_order(pool: &PgPool, ids: &[Uuid]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for (index, id) in ids.iter().enumerate() {
        sqlx::query("UPDATE stations SET display_order = $2 WHERE id = $1")
            .bind(id)
            .bind(order_value(index))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await
}

// =============================================================================
// HOURS + CUSTOMER TYPES
// =============================================================================

async fn ensure_station_exists(conn: &mut sqlx::PgConnection, station_id: Uuid) -> Result<(), StationError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM stations WHERE id = $1)")
        .bind(station_id)
        .fetch_one(&mut *conn)
        .await?;
    if exists { Ok(()) } else { Err(StationError::NotFound(station_id)) }
}

async fn replace_hours(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    station_id: Uuid,
    shifts: &[WorkingShift],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM station_working_hours WHERE station_id = $1")
        .bind(station_id)
        .execute(&mut **tx)
        .await?;
    for shift in shifts {
        sqlx::query(
            "INSERT INTO station_working_hours (station_id, weekday, shift_index, open_time, close_time)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(station_id)
        .bind(shift.weekday)
        .bind(shift.shift_index)
        .bind(&shift.open)
        .bind(&shift.close)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// First-seen order, duplicates dropped.
fn unique_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn first_missing(requested: &[Uuid], found: &[Uuid]) -> Option<Uuid> {
    let found: HashSet<&Uuid> = found.iter().collect();
    requested.iter().find(|id| !found.contains(id)).copied()
}

async fn replace_customer_types(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    station_id: Uuid,
    type_ids: &[Uuid],
) -> Result<(), StationError> {
    let type_ids = unique_ids(type_ids);
    let found: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM customer_types WHERE id = ANY($1)")
        .bind(&type_ids)
        .fetch_all(&mut **tx)
        .await?;
    if let Some(missing) = first_missing(&type_ids, &found) {
        return Err(StationError::UnknownCustomerType(missing));
    }

    sqlx::query("DELETE FROM station_allowed_customer_types WHERE station_id = $1")
        .bind(station_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query(
        "INSERT INTO station_allowed_customer_types (station_id, customer_type_id)
         SELECT $1, type_id FROM UNNEST($2::uuid[]) AS type_id",
    )
    .bind(station_id)
    .bind(&type_ids)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Replace the weekly schedule of a station.
///
/// # Errors
///
/// Returns a shift validation error before any write, not-found, or a
/// database error.
pub async fn set_working_hours(
    state: &AppState,
    station_id: Uuid,
    shifts: Vec<WorkingShift>,
) -> Result<Station, StationError> {
    let shifts = working_hours::normalize_shifts(shifts)?;

    let mut tx = state.pool.begin().await?;
    ensure_station_exists(&mut tx, station_id).await?;
    replace_hours(&mut tx, station_id, &shifts).await?;
    tx.commit().await?;

    invalidate_cache(state).await;
    info!(%station_id, shifts = shifts.len(), "working hours replaced");
    get_station(state, station_id).await
}

/// Replace the set of customer types a station accepts.
///
/// # Errors
///
/// Returns not-found, unknown customer type, or a database error.
pub async fn set_allowed_customer_types(
    state: &AppState,
    station_id: Uuid,
    type_ids: &[Uuid],
) -> Result<Station, StationError> {
    let mut tx = state.pool.begin().await?;
    ensure_station_exists(&mut tx, station_id).await?;
    replace_customer_types(&mut tx, station_id, type_ids).await?;
    tx.commit().await?;

    invalidate_cache(state).await;
    get_station(state, station_id).await
}

#[cfg(test)]
#[path = "station_test.rs"]
mod tests;
