use super::*;

fn shift(weekday: i16, open: &str, close: &str) -> WorkingShift {
    WorkingShift { weekday, open: open.into(), close: close.into(), shift_index: 0 }
}

#[test]
fn parse_hhmm_accepts_padded_and_unpadded_hours() {
    assert_eq!(parse_hhmm("09:30"), Some(570));
    assert_eq!(parse_hhmm("9:30"), Some(570));
    assert_eq!(parse_hhmm("00:00"), Some(0));
    assert_eq!(parse_hhmm("24:00"), Some(MINUTES_PER_DAY));
}

#[test]
fn parse_hhmm_rejects_garbage() {
    assert_eq!(parse_hhmm(""), None);
    assert_eq!(parse_hhmm("9"), None);
    assert_eq!(parse_hhmm("09:60"), None);
    assert_eq!(parse_hhmm("24:30"), None);
    assert_eq!(parse_hhmm("9:5"), None);
    assert_eq!(parse_hhmm("ab:cd"), None);
}

#[test]
fn normalize_sorts_pads_and_indexes_per_day() {
    let out = normalize_shifts(vec![
        shift(1, "14:00", "18:00"),
        shift(0, "8:00", "12:00"),
        shift(1, "08:00", "12:30"),
    ])
    .unwrap();

    assert_eq!(out.len(), 3);
    assert_eq!(out[0], WorkingShift { weekday: 0, open: "08:00".into(), close: "12:00".into(), shift_index: 0 });
    assert_eq!(out[1], WorkingShift { weekday: 1, open: "08:00".into(), close: "12:30".into(), shift_index: 0 });
    assert_eq!(out[2], WorkingShift { weekday: 1, open: "14:00".into(), close: "18:00".into(), shift_index: 1 });
}

#[test]
fn normalize_rejects_close_not_after_open() {
    let err = normalize_shifts(vec![shift(2, "10:00", "10:00")]).unwrap_err();
    assert!(matches!(err, ShiftError::CloseBeforeOpen { weekday: 2, .. }));
}

#[test]
fn normalize_rejects_overlap_on_same_day_only() {
    let err = normalize_shifts(vec![shift(3, "08:00", "12:00"), shift(3, "11:00", "15:00")]).unwrap_err();
    assert_eq!(err, ShiftError::Overlap(3));

    let ok = normalize_shifts(vec![shift(3, "08:00", "12:00"), shift(4, "11:00", "15:00")]);
    assert!(ok.is_ok());
}

#[test]
fn back_to_back_shifts_do_not_overlap() {
    let out = normalize_shifts(vec![shift(5, "08:00", "12:00"), shift(5, "12:00", "14:00")]).unwrap();
    assert_eq!(out[1].shift_index, 1);
}

#[test]
fn normalize_rejects_bad_weekday_and_open_at_midnight_end() {
    assert_eq!(normalize_shifts(vec![shift(7, "08:00", "09:00")]).unwrap_err(), ShiftError::InvalidWeekday(7));
    assert!(matches!(
        normalize_shifts(vec![shift(1, "24:00", "24:00")]).unwrap_err(),
        ShiftError::InvalidTime(_)
    ));
}

#[test]
fn shifts_for_weekday_filters_and_orders() {
    let shifts = vec![shift(1, "14:00", "18:00"), shift(2, "08:00", "09:00"), shift(1, "08:00", "12:00")];
    let day = shifts_for_weekday(&shifts, 1);
    assert_eq!(day.len(), 2);
    assert_eq!(day[0].open, "08:00");
    assert_eq!(day[1].open, "14:00");
}
