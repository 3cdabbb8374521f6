//! Bookable windows for one station on one local date.
//!
//! Working shifts for the weekday form the base schedule. Inactive
//! constraints (blackouts) are cut out of it, then active constraints
//! (explicit openings) are unioned back in. Slots start on the station's slot interval and must fit wholly
//! inside a window.

use axum::http::StatusCode;
use serde::Serialize;
use sqlx::PgPool;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::services::constraint::{self, ConstraintError, ConstraintFilter};
use crate::services::station::{self, StationError};
use crate::services::working_hours::{MINUTES_PER_DAY, format_hhmm, shifts_for_weekday};
use crate::state::AppState;

/// Half-open interval in minutes since local midnight.
pub type Span = (u16, u16);

#[derive(Debug, thiserror::Error)]
pub enum AvailabilityError {
    #[error("invalid date: {0:?}")]
    InvalidDate(String),
    #[error("invalid utc offset: {0} minutes")]
    InvalidOffset(i32),
    #[error(transparent)]
    Station(#[from] StationError),
    #[error(transparent)]
    Constraint(#[from] ConstraintError),
}

impl ErrorCode for AvailabilityError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidDate(_) | Self::InvalidOffset(_) => "E_VALIDATION",
            Self::Station(e) => e.error_code(),
            Self::Constraint(e) => e.error_code(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidDate(_) | Self::InvalidOffset(_) => StatusCode::BAD_REQUEST,
            Self::Station(e) => e.status(),
            Self::Constraint(e) => e.status(),
        }
    }

    fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidDate(_) => "התאריך שנבחר אינו תקין",
            Self::InvalidOffset(_) => "אזור הזמן שנבחר אינו תקין",
            Self::Station(e) => e.user_message(),
            Self::Constraint(e) => e.user_message(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StationAvailability {
    pub station_id: Uuid,
    pub date: String,
    pub windows: Vec<TimeWindow>,
    pub slots: Vec<String>,
}

/// Parse `YYYY-MM-DD`.
///
/// # Errors
///
/// Returns [`AvailabilityError::InvalidDate`] for anything else.
pub fn parse_date(raw: &str) -> Result<Date, AvailabilityError> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| AvailabilityError::InvalidDate(raw.to_owned()))
}

/// Sort and merge overlapping or touching spans.
#[must_use]
pub fn merge_spans(mut spans: Vec<Span>) -> Vec<Span> {
    spans.retain(|(start, end)| end > start);
    spans.sort_unstable();
    let mut out: Vec<Span> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match out.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => out.push((start, end)),
        }
    }
    out
}

/// Remove every `cut` span from `base`.
#[must_use]
pub fn subtract_spans(base: &[Span], cuts: &[Span]) -> Vec<Span> {
    let cuts = merge_spans(cuts.to_vec());
    let mut out = Vec::new();
    for &(start, end) in base {
        let mut cursor = start;
        for &(cut_start, cut_end) in &cuts {
            if cut_end <= cursor || cut_start >= end {
                continue;
            }
            if cut_start > cursor {
                out.push((cursor, cut_start));
            }
            cursor = cursor.max(cut_end);
            if cursor >= end {
                break;
            }
        }
        if cursor < end {
            out.push((cursor, end));
        }
    }
    out
}

/// Shifts minus blackouts, plus openings. An explicit opening wins over a
/// blackout covering the same minutes.
#[must_use]
pub fn compute_windows(shifts: &[Span], openings: &[Span], blackouts: &[Span]) -> Vec<Span> {
    let mut windows = subtract_spans(&merge_spans(shifts.to_vec()), blackouts);
    windows.extend_from_slice(openings);
    merge_spans(windows)
}

/// Slot start minutes for windows at `interval` granularity.
#[must_use]
pub fn slot_starts(windows: &[Span], interval: u16) -> Vec<u16> {
    if interval == 0 {
        return Vec::new();
    }
    let mut out = Vec::new();
    for &(start, end) in windows {
        let mut t = start;
        while t + interval <= end {
            out.push(t);
            t += interval;
        }
    }
    out
}

/// Clip an instant range to the local day starting at `day_start`.
fn clip_to_day(start: OffsetDateTime, end: OffsetDateTime, day_start: OffsetDateTime) -> Option<Span> {
    let to_minutes = |t: OffsetDateTime| {
        let minutes = (t - day_start).whole_minutes().clamp(0, i64::from(MINUTES_PER_DAY));
        u16::try_from(minutes).unwrap_or(MINUTES_PER_DAY)
    };
    let span = (to_minutes(start), to_minutes(end));
    (span.1 > span.0).then_some(span)
}

/// Bookable windows and slot starts for `station_id` on local `date`.
///
/// # Errors
///
/// Returns an invalid-offset, station, or constraint error.
pub async fn station_availability(
    state: &AppState,
    station_id: Uuid,
    date: Date,
    utc_offset_minutes: i32,
) -> Result<StationAvailability, AvailabilityError> {
    let offset = UtcOffset::from_whole_seconds(utc_offset_minutes.saturating_mul(60))
        .map_err(|_| AvailabilityError::InvalidOffset(utc_offset_minutes))?;
    let station = station::get_station(state, station_id).await?;
    let date_label = format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day());

    if !station.is_active {
        return Ok(StationAvailability { station_id, date: date_label, windows: Vec::new(), slots: Vec::new() });
    }

    let day_start = date.midnight().assume_offset(offset);
    let day_end = day_start + Duration::days(1);
    let (openings, blackouts) = day_constraints(&state.pool, station_id, day_start, day_end).await?;

    let weekday = i16::from(date.weekday().number_days_from_sunday());
    let shifts: Vec<Span> = shifts_for_weekday(&station.working_hours, weekday)
        .into_iter()
        .filter_map(|s| s.minutes())
        .collect();

    let windows = compute_windows(&shifts, &openings, &blackouts);
    let interval = u16::try_from(station.slot_interval_minutes).unwrap_or(0);
    let slots = slot_starts(&windows, interval).into_iter().map(format_hhmm).collect();

    Ok(StationAvailability {
        station_id,
        date: date_label,
        windows: windows
            .into_iter()
            .map(|(start, end)| TimeWindow { start: format_hhmm(start), end: format_hhmm(end) })
            .collect(),
        slots,
    })
}

async fn day_constraints(
    pool: &PgPool,
    station_id: Uuid,
    day_start: OffsetDateTime,
    day_end: OffsetDateTime,
) -> Result<(Vec<Span>, Vec<Span>), ConstraintError> {
    let filter = ConstraintFilter {
        station_id: Some(station_id),
        from: Some(day_start),
        to: Some(day_end),
        ..ConstraintFilter::default()
    };
    let rows = constraint::list_constraints(pool, &filter).await?;

    let mut openings = Vec::new();
    let mut blackouts = Vec::new();
    for row in rows {
        let Some(span) = clip_to_day(row.start_time, row.end_time, day_start) else {
            continue;
        };
        if row.is_active {
            openings.push(span);
        } else {
            blackouts.push(span);
        }
    }
    Ok((openings, blackouts))
}

#[cfg(test)]
#[path = "availability_test.rs"]
mod tests;
