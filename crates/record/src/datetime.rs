//! Parsing of the record format's date (`YYYYMMDD`) and time
//! (`HH[MM[SS[.F{1,6}]]]`) value representations.
//!
//! Legacy separators (`YYYY.MM.DD`, `HH:MM:SS`) are tolerated. Values carry no
//! timezone; they are local to the instrument that produced them.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use time::{Date, Month, PrimitiveDateTime, Time};

fn parse_error(field: &'static str, value: &str) -> ErrorKind {
    ErrorKind::ParseError { field, value: value.to_string() }
}

fn digits(s: &str, field: &'static str, value: &str) -> Result<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        exn::bail!(parse_error(field, value));
    }
    s.parse::<u32>().or_raise(|| parse_error(field, value))
}

/// Parses a date value such as `20000101`.
pub fn parse_date(field: &'static str, value: &str) -> Result<Date> {
    let compact: String = value.trim().chars().filter(|c| *c != '.').collect();
    if compact.len() != 8 || !compact.is_ascii() {
        exn::bail!(parse_error(field, value));
    }
    let year = digits(&compact[0..4], field, value)?;
    let month = digits(&compact[4..6], field, value)?;
    let day = digits(&compact[6..8], field, value)?;
    let month = u8::try_from(month).ok().and_then(|m| Month::try_from(m).ok());
    let (Some(month), Ok(year), Ok(day)) = (month, i32::try_from(year), u8::try_from(day)) else {
        exn::bail!(parse_error(field, value));
    };
    Date::from_calendar_date(year, month, day).or_raise(|| parse_error(field, value))
}

/// Parses a time value such as `143015.250000`; missing trailing components
/// default to zero.
pub fn parse_time(field: &'static str, value: &str) -> Result<Time> {
    let compact: String = value.trim().chars().filter(|c| *c != ':').collect();
    let (whole, fraction) = match compact.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (compact.as_str(), None),
    };
    if !whole.is_ascii() || !matches!(whole.len(), 2 | 4 | 6) {
        exn::bail!(parse_error(field, value));
    }
    let hour = digits(&whole[0..2], field, value)?;
    let minute = if whole.len() >= 4 { digits(&whole[2..4], field, value)? } else { 0 };
    let second = if whole.len() == 6 { digits(&whole[4..6], field, value)? } else { 0 };
    let micro = match fraction {
        Some(f) if f.len() <= 6 => {
            // Right-pad to microsecond precision: ".25" means 250000us.
            let padded = format!("{f:0<6}");
            digits(&padded, field, value)?
        },
        Some(_) => exn::bail!(parse_error(field, value)),
        None => 0,
    };
    let (Ok(hour), Ok(minute), Ok(second)) = (u8::try_from(hour), u8::try_from(minute), u8::try_from(second)) else {
        exn::bail!(parse_error(field, value));
    };
    Time::from_hms_micro(hour, minute, second, micro).or_raise(|| parse_error(field, value))
}

/// Combines a date and an optional time into a timestamp.
///
/// Returns `None` when there is no date. A missing time means midnight.
pub fn timestamp(
    (date_field, date): (&'static str, Option<&str>),
    (time_field, time): (&'static str, Option<&str>),
) -> Result<Option<PrimitiveDateTime>> {
    let Some(date) = date else {
        return Ok(None);
    };
    let date = parse_date(date_field, date)?;
    let time = time.map(|t| parse_time(time_field, t)).transpose()?.unwrap_or(Time::MIDNIGHT);
    Ok(Some(PrimitiveDateTime::new(date, time)))
}
