//! Constraint service: station unavailability windows and their grouping.
//!
//! DESIGN
//! ======
//! A constraint row blocks (or, with `is_active`, explicitly opens) one
//! station for a time range. The dashboard creates the same window for many
//! stations at once, so rows that share start, end, reason, stored notes and
//! active flag are shown as one [`ConstraintGroup`]. Groups are derived on
//! read and never stored; group operations re-select the member rows from
//! any one constraint id.
//!
//! A free-text reason is kept inside `notes` behind a `[CUSTOM_REASON:...]`
//! marker so the `reason` column stays a small category set.
//!
//! ERROR HANDLING
//! ==============
//! All input validation runs before the first query. Multi-row writes run in
//! one transaction, so a failed group edit leaves every member row intact.

use std::collections::{HashMap, HashSet};

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::error::{ErrorCode, MSG_DATABASE, MSG_NOT_FOUND};

pub const CUSTOM_REASON_PREFIX: &str = "[CUSTOM_REASON:";
const CUSTOM_REASON_SUFFIX: char = ']';

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConstraintError {
    #[error("constraint not found: {0}")]
    NotFound(Uuid),
    #[error("no stations selected")]
    NoStations,
    #[error("end time must be after start time")]
    EndBeforeStart,
    #[error("custom reason text is required")]
    MissingCustomReason,
    #[error("unknown station: {0}")]
    UnknownStation(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for ConstraintError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_CONSTRAINT_NOT_FOUND",
            Self::NoStations | Self::EndBeforeStart | Self::MissingCustomReason | Self::UnknownStation(_) => {
                "E_VALIDATION"
            }
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
            Self::NoStations => "יש לבחור לפחות עמדה אחת",
            Self::EndBeforeStart => "שעת הסיום חייבת להיות אחרי שעת ההתחלה",
            Self::MissingCustomReason => "יש להזין סיבה מותאמת אישית",
            Self::UnknownStation(_) => "אחת העמדות שנבחרו אינה קיימת",
            Self::Database(_) => MSG_DATABASE,
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintReason {
    Holiday,
    Maintenance,
    StaffShortage,
    PrivateEvent,
    Custom,
}

impl ConstraintReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Holiday => "holiday",
            Self::Maintenance => "maintenance",
            Self::StaffShortage => "staff_shortage",
            Self::PrivateEvent => "private_event",
            Self::Custom => "custom",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "holiday" => Some(Self::Holiday),
            "maintenance" => Some(Self::Maintenance),
            "staff_shortage" => Some(Self::StaffShortage),
            "private_event" => Some(Self::PrivateEvent),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constraint {
    pub id: Uuid,
    pub station_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    pub reason: Option<ConstraintReason>,
    pub custom_reason: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// `notes` column as stored, marker included. Part of the group key.
    #[serde(skip)]
    pub stored_notes: Option<String>,
}

impl Constraint {
    #[must_use]
    pub fn group_key(&self) -> String {
        group_key(self.start_time, self.end_time, self.reason, self.stored_notes.as_deref(), self.is_active)
    }
}

/// One display row for constraints sharing time range, reason, notes and flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstraintGroup {
    pub key: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    pub reason: Option<ConstraintReason>,
    pub custom_reason: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub station_ids: Vec<Uuid>,
    pub station_names: Vec<String>,
    pub constraint_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConstraintFilter {
    pub station_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub reason: Option<ConstraintReason>,
    /// Only constraints ending after this instant.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub from: Option<OffsetDateTime>,
    /// Only constraints starting before this instant.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub to: Option<OffsetDateTime>,
    #[serde(default)]
    pub sort: SortOrder,
}

/// Create / group-edit form payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ConstraintInput {
    pub station_ids: Vec<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    pub reason: Option<ConstraintReason>,
    pub custom_reason: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

/// Single-row edit payload.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateConstraint {
    pub station_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    pub reason: Option<ConstraintReason>,
    pub custom_reason: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

/// Which members of a group a delete removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteScope {
    All,
    Stations(Vec<Uuid>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteGroupRequest {
    #[serde(default)]
    pub all_stations: bool,
    #[serde(default)]
    pub station_ids: Vec<Uuid>,
}

impl DeleteGroupRequest {
    #[must_use]
    pub fn scope(self) -> DeleteScope {
        if self.all_stations { DeleteScope::All } else { DeleteScope::Stations(self.station_ids) }
    }
}

/// Validated, write-ready field set shared by create and edit paths.
#[derive(Debug, Clone, PartialEq)]
struct ConstraintFields {
    start_time: OffsetDateTime,
    end_time: OffsetDateTime,
    reason: Option<ConstraintReason>,
    stored_notes: Option<String>,
    is_active: bool,
}

// =============================================================================
// NOTES MARKER
// =============================================================================

fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

/// Free notes may not open with the marker, or they would read back as a
/// custom reason.
fn neutralize_marker(notes: String) -> String {
    match notes.strip_prefix(CUSTOM_REASON_PREFIX) {
        Some(rest) => format!("({}{rest}", &CUSTOM_REASON_PREFIX[1..]),
        None => notes,
    }
}

/// Combine a custom reason and free notes into the stored `notes` value.
#[must_use]
pub fn encode_notes(custom_reason: Option<&str>, notes: Option<&str>) -> Option<String> {
    let notes = non_empty(notes).map(neutralize_marker);
    let Some(custom) = non_empty(custom_reason) else {
        return notes;
    };
    let custom = custom.replace('[', "(").replace(']', ")");
    Some(match notes {
        Some(notes) => format!("{CUSTOM_REASON_PREFIX}{custom}{CUSTOM_REASON_SUFFIX} {notes}"),
        None => format!("{CUSTOM_REASON_PREFIX}{custom}{CUSTOM_REASON_SUFFIX}"),
    })
}

/// Split a stored `notes` value into `(custom_reason, notes)`.
#[must_use]
pub fn decode_notes(stored: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(raw) = stored else {
        return (None, None);
    };
    let trimmed = raw.trim_start();
    if let Some(rest) = trimmed.strip_prefix(CUSTOM_REASON_PREFIX)
        && let Some((custom, tail)) = rest.split_once(CUSTOM_REASON_SUFFIX)
    {
        return (non_empty(Some(custom)), non_empty(Some(tail)));
    }
    (None, non_empty(Some(raw)))
}

// =============================================================================
// GROUPING
// =============================================================================

/// Composite key: start | end | reason | serialized notes | active flag.
#[must_use]
pub fn group_key(
    start_time: OffsetDateTime,
    end_time: OffsetDateTime,
    reason: Option<ConstraintReason>,
    stored_notes: Option<&str>,
    is_active: bool,
) -> String {
    let notes = serde_json::to_string(&stored_notes).unwrap_or_default();
    format!(
        "{}|{}|{}|{}|{}",
        start_time.unix_timestamp_nanos(),
        end_time.unix_timestamp_nanos(),
        reason.map_or("", ConstraintReason::as_str),
        notes,
        is_active
    )
}

/// Bucket constraints into display groups. Stations keep first-seen order;
/// groups are ordered by start time, then end time.
#[must_use]
pub fn group_constraints(rows: &[Constraint], station_names: &HashMap<Uuid, String>) -> Vec<ConstraintGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<ConstraintGroup> = Vec::new();

    for row in rows {
        let key = row.group_key();
        let pos = *index.entry(key.clone()).or_insert_with(|| {
            groups.push(ConstraintGroup {
                key,
                start_time: row.start_time,
                end_time: row.end_time,
                reason: row.reason,
                custom_reason: row.custom_reason.clone(),
                notes: row.notes.clone(),
                is_active: row.is_active,
                station_ids: Vec::new(),
                station_names: Vec::new(),
                constraint_ids: Vec::new(),
            });
            groups.len() - 1
        });

        let group = &mut groups[pos];
        group.constraint_ids.push(row.id);
        if !group.station_ids.contains(&row.station_id) {
            group.station_ids.push(row.station_id);
            group
                .station_names
                .push(station_names.get(&row.station_id).cloned().unwrap_or_default());
        }
    }

    groups.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.end_time.cmp(&b.end_time)));
    groups
}

/// Ids of the group rows a delete with `scope` removes.
#[must_use]
pub fn rows_in_scope(rows: &[Constraint], scope: &DeleteScope) -> Vec<Uuid> {
    match scope {
        DeleteScope::All => rows.iter().map(|r| r.id).collect(),
        DeleteScope::Stations(ids) => rows
            .iter()
            .filter(|r| ids.contains(&r.station_id))
            .map(|r| r.id)
            .collect(),
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

fn validate_fields(
    start_time: OffsetDateTime,
    end_time: OffsetDateTime,
    reason: Option<ConstraintReason>,
    custom_reason: Option<&str>,
    notes: Option<&str>,
    is_active: bool,
) -> Result<ConstraintFields, ConstraintError> {
    if end_time <= start_time {
        return Err(ConstraintError::EndBeforeStart);
    }
    let custom = if reason == Some(ConstraintReason::Custom) {
        Some(non_empty(custom_reason).ok_or(ConstraintError::MissingCustomReason)?)
    } else {
        None
    };
    Ok(ConstraintFields {
        start_time,
        end_time,
        reason,
        stored_notes: encode_notes(custom.as_deref(), notes),
        is_active,
    })
}

/// Drop duplicate station ids, keeping first occurrence; reject an empty set.
fn validate_stations(ids: &[Uuid]) -> Result<Vec<Uuid>, ConstraintError> {
    let mut seen = HashSet::new();
    let unique: Vec<Uuid> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
    if unique.is_empty() {
        return Err(ConstraintError::NoStations);
    }
    Ok(unique)
}

fn validate_input(input: &ConstraintInput) -> Result<(Vec<Uuid>, ConstraintFields), ConstraintError> {
    let stations = validate_stations(&input.station_ids)?;
    let fields = validate_fields(
        input.start_time,
        input.end_time,
        input.reason,
        input.custom_reason.as_deref(),
        input.notes.as_deref(),
        input.is_active,
    )?;
    Ok((stations, fields))
}

// =============================================================================
// ROW MAPPING
// =============================================================================

const CONSTRAINT_COLUMNS: &str = "id, station_id, start_time, end_time, reason, notes, is_active, created_at";

fn constraint_from_row(row: &PgRow) -> Constraint {
    let stored_notes: Option<String> = row.get("notes");
    let (custom_reason, notes) = decode_notes(stored_notes.as_deref());
    let reason: Option<String> = row.get("reason");
    Constraint {
        id: row.get("id"),
        station_id: row.get("station_id"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        reason: reason.as_deref().and_then(ConstraintReason::from_str),
        custom_reason,
        notes,
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        stored_notes,
    }
}

async fn station_names(pool: &PgPool) -> Result<HashMap<Uuid, String>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (Uuid, String)>("SELECT id, name FROM stations")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().collect())
}

async fn ensure_stations_exist(conn: &mut sqlx::PgConnection, ids: &[Uuid]) -> Result<(), ConstraintError> {
    let found: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM stations WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;
    let found: HashSet<Uuid> = found.into_iter().collect();
    match ids.iter().find(|id| !found.contains(id)) {
        Some(missing) => Err(ConstraintError::UnknownStation(*missing)),
        None => Ok(()),
    }
}

async fn insert_row(
    conn: &mut sqlx::PgConnection,
    station_id: Uuid,
    fields: &ConstraintFields,
) -> Result<Constraint, sqlx::Error> {
    let row = sqlx::query(&format!(
        "INSERT INTO station_unavailability (station_id, start_time, end_time, reason, notes, is_active)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {CONSTRAINT_COLUMNS}"
    ))
    .bind(station_id)
    .bind(fields.start_time)
    .bind(fields.end_time)
    .bind(fields.reason.map(ConstraintReason::as_str))
    .bind(&fields.stored_notes)
    .bind(fields.is_active)
    .fetch_one(&mut *conn)
    .await?;
    Ok(constraint_from_row(&row))
}

// =============================================================================
// QUERIES
// =============================================================================

/// List constraints matching `filter`.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_constraints(pool: &PgPool, filter: &ConstraintFilter) -> Result<Vec<Constraint>, ConstraintError> {
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {CONSTRAINT_COLUMNS} FROM station_unavailability WHERE TRUE"));

    if let Some(station_id) = filter.station_id {
        builder.push(" AND station_id = ").push_bind(station_id);
    }
    if let Some(is_active) = filter.is_active {
        builder.push(" AND is_active = ").push_bind(is_active);
    }
    if let Some(reason) = filter.reason {
        builder.push(" AND reason = ").push_bind(reason.as_str());
    }
    if let Some(from) = filter.from {
        builder.push(" AND end_time > ").push_bind(from);
    }
    if let Some(to) = filter.to {
        builder.push(" AND start_time < ").push_bind(to);
    }
    builder.push(match filter.sort {
        SortOrder::Asc => " ORDER BY start_time ASC, id ASC",
        SortOrder::Desc => " ORDER BY start_time DESC, id ASC",
    });

    let rows = builder.build().fetch_all(pool).await?;
    Ok(rows.iter().map(constraint_from_row).collect())
}

/// List constraints as display groups.
///
/// # Errors
///
/// Returns a database error if a query fails.
pub async fn list_constraint_groups(
    pool: &PgPool,
    filter: &ConstraintFilter,
) -> Result<Vec<ConstraintGroup>, ConstraintError> {
    let rows = list_constraints(pool, filter).await?;
    let names = station_names(pool).await?;
    let mut groups = group_constraints(&rows, &names);
    if filter.sort == SortOrder::Desc {
        groups.reverse();
    }
    Ok(groups)
}

/// # Errors
///
/// Returns not-found or a database error.
pub async fn get_constraint(pool: &PgPool, constraint_id: Uuid) -> Result<Constraint, ConstraintError> {
    let row = sqlx::query(&format!("SELECT {CONSTRAINT_COLUMNS} FROM station_unavailability WHERE id = $1"))
        .bind(constraint_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ConstraintError::NotFound(constraint_id))?;
    Ok(constraint_from_row(&row))
}

/// Every row in the same group as `constraint_id`. With `lock`, rows are
/// selected `FOR UPDATE`.
async fn load_group_rows(
    conn: &mut sqlx::PgConnection,
    constraint_id: Uuid,
    lock: bool,
) -> Result<Vec<Constraint>, ConstraintError> {
    let anchor = sqlx::query(&format!("SELECT {CONSTRAINT_COLUMNS} FROM station_unavailability WHERE id = $1"))
        .bind(constraint_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ConstraintError::NotFound(constraint_id))?;
    let anchor = constraint_from_row(&anchor);

    let sql = format!(
        "SELECT {CONSTRAINT_COLUMNS}
         FROM station_unavailability
         WHERE start_time = $1
           AND end_time = $2
           AND reason IS NOT DISTINCT FROM $3
           AND notes IS NOT DISTINCT FROM $4
           AND is_active = $5
         ORDER BY created_at ASC, id ASC{}",
        if lock { " FOR UPDATE" } else { "" }
    );
    let rows = sqlx::query(&sql)
        .bind(anchor.start_time)
        .bind(anchor.end_time)
        .bind(anchor.reason.map(ConstraintReason::as_str))
        .bind(&anchor.stored_notes)
        .bind(anchor.is_active)
        .fetch_all(&mut *conn)
        .await?;

    let key = anchor.group_key();
    Ok(rows
        .iter()
        .map(constraint_from_row)
        .filter(|c| c.group_key() == key)
        .collect())
}

/// Resolve the group a constraint belongs to (deep link target).
///
/// # Errors
///
/// Returns not-found or a database error.
pub async fn find_group_for_constraint(pool: &PgPool, constraint_id: Uuid) -> Result<ConstraintGroup, ConstraintError> {
    let mut conn = pool.acquire().await?;
    let rows = load_group_rows(&mut conn, constraint_id, false).await?;
    drop(conn);
    let names = station_names(pool).await?;
    group_constraints(&rows, &names)
        .into_iter()
        .next()
        .ok_or(ConstraintError::NotFound(constraint_id))
}

// =============================================================================
// WRITES
// =============================================================================

/// Create one constraint row per selected station.
///
/// # Errors
///
/// Returns a validation error before any write, [`ConstraintError::UnknownStation`],
/// or a database error (nothing is written).
pub async fn create_constraints(pool: &PgPool, input: ConstraintInput) -> Result<Vec<Constraint>, ConstraintError> {
    let (stations, fields) = validate_input(&input)?;

    let mut tx = pool.begin().await?;
    ensure_stations_exist(&mut tx, &stations).await?;
    let mut created = Vec::with_capacity(stations.len());
    for station_id in &stations {
        created.push(insert_row(&mut tx, *station_id, &fields).await?);
    }
    tx.commit().await?;

    info!(count = created.len(), is_active = fields.is_active, "constraints created");
    Ok(created)
}

/// Edit a single constraint row.
///
/// # Errors
///
/// Returns a validation error before any write, not-found, or a database error.
pub async fn update_constraint(
    pool: &PgPool,
    constraint_id: Uuid,
    input: UpdateConstraint,
) -> Result<Constraint, ConstraintError> {
    let fields = validate_fields(
        input.start_time,
        input.end_time,
        input.reason,
        input.custom_reason.as_deref(),
        input.notes.as_deref(),
        input.is_active,
    )?;

    let mut tx = pool.begin().await?;
    if let Some(station_id) = input.station_id {
        ensure_stations_exist(&mut tx, &[station_id]).await?;
    }
    let row = sqlx::query(&format!(
        "UPDATE station_unavailability
         SET station_id = COALESCE($2, station_id),
             start_time = $3,
             end_time = $4,
             reason = $5,
             notes = $6,
             is_active = $7
         WHERE id = $1
         RETURNING {CONSTRAINT_COLUMNS}"
    ))
    .bind(constraint_id)
    .bind(input.station_id)
    .bind(fields.start_time)
    .bind(fields.end_time)
    .bind(fields.reason.map(ConstraintReason::as_str))
    .bind(&fields.stored_notes)
    .bind(fields.is_active)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(ConstraintError::NotFound(constraint_id))?;
    tx.commit().await?;

    Ok(constraint_from_row(&row))
}

/// # Errors
///
/// Returns not-found or a database error.
pub async fn delete_constraint(pool: &PgPool, constraint_id: Uuid) -> Result<(), ConstraintError> {
    let result = sqlx::query("DELETE FROM station_unavailability WHERE id = $1")
        .bind(constraint_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ConstraintError::NotFound(constraint_id));
    }
    Ok(())
}

/// Rewrite the whole group containing `constraint_id`. Stations kept in
/// `input.station_ids` are updated in place, deselected ones lose their row,
/// newly selected ones get a new row.
///
/// # Errors
///
/// Returns a validation error before any write, not-found, unknown station,
/// or a database error (the group is left unchanged).
pub async fn update_group(
    pool: &PgPool,
    constraint_id: Uuid,
    input: ConstraintInput,
) -> Result<ConstraintGroup, ConstraintError> {
    let (stations, fields) = validate_input(&input)?;

    let mut tx = pool.begin().await?;
    let rows = load_group_rows(&mut tx, constraint_id, true).await?;
    ensure_stations_exist(&mut tx, &stations).await?;

    let wanted: HashSet<Uuid> = stations.iter().copied().collect();
    let mut covered: HashSet<Uuid> = HashSet::new();
    let mut updated = Vec::with_capacity(stations.len());

    for row in &rows {
        if wanted.contains(&row.station_id) && covered.insert(row.station_id) {
            let updated_row = sqlx::query(&format!(
                "UPDATE station_unavailability
                 SET start_time = $2, end_time = $3, reason = $4, notes = $5, is_active = $6
                 WHERE id = $1
                 RETURNING {CONSTRAINT_COLUMNS}"
            ))
            .bind(row.id)
            .bind(fields.start_time)
            .bind(fields.end_time)
            .bind(fields.reason.map(ConstraintReason::as_str))
            .bind(&fields.stored_notes)
            .bind(fields.is_active)
            .fetch_one(&mut *tx)
            .await?;
            updated.push(constraint_from_row(&updated_row));
        } else {
            sqlx::query("DELETE FROM station_unavailability WHERE id = $1")
                .bind(row.id)
                .execute(&mut *tx)
                .await?;
        }
    }

    for station_id in stations.iter().filter(|id| !covered.contains(id)) {
        updated.push(insert_row(&mut tx, *station_id, &fields).await?);
    }
    tx.commit().await?;

    info!(%constraint_id, before = rows.len(), after = updated.len(), "constraint group updated");
    let names = station_names(pool).await?;
    group_constraints(&updated, &names)
        .into_iter()
        .next()
        .ok_or(ConstraintError::NotFound(constraint_id))
}

/// Delete the group containing `constraint_id`, wholly or for some stations.
/// Returns the number of rows removed.
///
/// # Errors
///
/// Returns [`ConstraintError::NoStations`] for an empty station scope,
/// not-found, or a database error.
pub async fn delete_group(pool: &PgPool, constraint_id: Uuid, scope: DeleteScope) -> Result<u64, ConstraintError> {
    if let DeleteScope::Stations(ids) = &scope
        && ids.is_empty()
    {
        return Err(ConstraintError::NoStations);
    }

    let mut tx = pool.begin().await?;
    let rows = load_group_rows(&mut tx, constraint_id, true).await?;
    let ids = rows_in_scope(&rows, &scope);
    let result = sqlx::query("DELETE FROM station_unavailability WHERE id = ANY($1)")
        .bind(&ids)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(%constraint_id, deleted = result.rows_affected(), "constraint group deleted");
    Ok(result.rows_affected())
}

/// Flip the active flag on every row of a group.
///
/// # Errors
///
/// Returns not-found or a database error.
pub async fn set_group_active(pool: &PgPool, constraint_id: Uuid, is_active: bool) -> Result<u64, ConstraintError> {
    let mut tx = pool.begin().await?;
    let rows = load_group_rows(&mut tx, constraint_id, true).await?;
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let result = sqlx::query("UPDATE station_unavailability SET is_active = $2 WHERE id = ANY($1)")
        .bind(&ids)
        .bind(is_active)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
#[path = "constraint_test.rs"]
mod tests;
