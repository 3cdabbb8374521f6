//! Weekly working-hour shifts for stations.
//!
//! A station can have several shifts per weekday (e.g. a split day with a
//! lunch break). Times are local wall-clock `HH:MM` strings; `24:00` is
//! accepted as a closing time only.

use serde::{Deserialize, Serialize};

pub const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingShift {
    /// 0 = Sunday ... 6 = Saturday.
    pub weekday: i16,
    pub open: String,
    pub close: String,
    #[serde(default)]
    pub shift_index: i16,
}

impl WorkingShift {
    /// Open/close as minutes since local midnight. `None` if either time is malformed.
    #[must_use]
    pub fn minutes(&self) -> Option<(u16, u16)> {
        Some((parse_hhmm(&self.open)?, parse_hhmm(&self.close)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShiftError {
    #[error("weekday out of range: {0}")]
    InvalidWeekday(i16),
    #[error("malformed time: {0:?}")]
    InvalidTime(String),
    #[error("shift closes before it opens on weekday {weekday}: {open}-{close}")]
    CloseBeforeOpen { weekday: i16, open: String, close: String },
    #[error("overlapping shifts on weekday {0}")]
    Overlap(i16),
}

/// Parse `HH:MM` into minutes since midnight.
#[must_use]
pub fn parse_hhmm(raw: &str) -> Option<u16> {
    let (hours, minutes) = raw.trim().split_once(':')?;
    if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
        return None;
    }
    let hours: u16 = hours.parse().ok()?;
    let minutes: u16 = minutes.parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    let total = hours * 60 + minutes;
    (total <= MINUTES_PER_DAY).then_some(total)
}

#[must_use]
pub fn format_hhmm(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Validate a full weekly schedule and return it in canonical form: sorted
/// by weekday then opening time, times zero-padded, `shift_index` numbered
/// from 0 within each weekday.
///
/// # Errors
///
/// Returns the first [`ShiftError`] found.
pub fn normalize_shifts(shifts: Vec<WorkingShift>) -> Result<Vec<WorkingShift>, ShiftError> {
    let mut parsed = Vec::with_capacity(shifts.len());
    for shift in shifts {
        if !(0..=6).contains(&shift.weekday) {
            return Err(ShiftError::InvalidWeekday(shift.weekday));
        }
        let open = parse_hhmm(&shift.open)
            .filter(|m| *m < MINUTES_PER_DAY)
            .ok_or_else(|| ShiftError::InvalidTime(shift.open.clone()))?;
        let close = parse_hhmm(&shift.close).ok_or_else(|| ShiftError::InvalidTime(shift.close.clone()))?;
        if close <= open {
            return Err(ShiftError::CloseBeforeOpen { weekday: shift.weekday, open: shift.open, close: shift.close });
        }
        parsed.push((shift.weekday, open, close));
    }

    parsed.sort_unstable();

    let mut out: Vec<WorkingShift> = Vec::with_capacity(parsed.len());
    let mut prev: Option<(i16, u16)> = None;
    let mut index = 0i16;
    for (weekday, open, close) in parsed {
        match prev {
            Some((prev_day, prev_close)) if prev_day == weekday => {
                if open < prev_close {
                    return Err(ShiftError::Overlap(weekday));
                }
                index += 1;
            }
            _ => index = 0,
        }
        prev = Some((weekday, close));
        out.push(WorkingShift { weekday, open: format_hhmm(open), close: format_hhmm(close), shift_index: index });
    }
    Ok(out)
}

/// Shifts for one weekday in opening order.
#[must_use]
pub fn shifts_for_weekday(shifts: &[WorkingShift], weekday: i16) -> Vec<&WorkingShift> {
    let mut day: Vec<&WorkingShift> = shifts.iter().filter(|s| s.weekday == weekday).collect();
    day.sort_by_key(|s| s.minutes().map_or(0, |(open, _)| open));
    day
}

#[cfg(test)]
#[path = "working_hours_test.rs"]
mod tests;
