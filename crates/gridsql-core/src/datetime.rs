//! Calendar conversions between epoch-relative integers and text.
//!
//! Dates are days since 1970-01-01, times are microseconds since midnight
//! and timestamps are microseconds since the Unix epoch, all in the
//! proleptic Gregorian calendar without time zones.

use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds in one second.
pub const MICROS_PER_SECOND: i64 = 1_000_000;
/// Microseconds in one day.
pub const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

/// Convert days since the Unix epoch to (year, month, day).
pub fn days_to_ymd(days: i32) -> (i32, u32, u32) {
    // Shift the epoch to 0000-03-01 so leap days fall at the end of an era year.
    let z = i64::from(days) + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year as i32, month, day)
}

/// Convert (year, month, day) to days since the Unix epoch.
pub fn ymd_to_days(year: i32, month: u32, day: u32) -> i32 {
    let y = i64::from(year) - i64::from(month <= 2);
    let era = y.div_euclid(400);
    let yoe = y.rem_euclid(400);
    let m = i64::from(month);
    let mp = if m > 2 { m - 3 } else { m + 9 };
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    (era * 146_097 + doe - 719_468) as i32
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

/// Format a date as `yyyy-MM-dd`.
pub fn format_date(days: i32) -> String {
    let (year, month, day) = days_to_ymd(days);
    format!("{:04}-{:02}-{:02}", year, month, day)
}

/// Format a time of day as `HH:mm:ss`, dropping fractional seconds.
pub fn format_time(micros: i64) -> String {
    let secs = micros.rem_euclid(MICROS_PER_DAY) / MICROS_PER_SECOND;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Format a time of day as `HH:mm:ss[.SSS]`, keeping milliseconds when present.
pub fn format_time_millis(micros: i64) -> String {
    let micros = micros.rem_euclid(MICROS_PER_DAY);
    let millis = (micros % MICROS_PER_SECOND) / 1000;
    if millis > 0 {
        format!("{}.{:03}", format_time(micros), millis)
    } else {
        format_time(micros)
    }
}

fn split_timestamp(micros: i64) -> (i32, i64) {
    (
        micros.div_euclid(MICROS_PER_DAY) as i32,
        micros.rem_euclid(MICROS_PER_DAY),
    )
}

/// Format a timestamp as `yyyy-MM-dd HH:mm:ss`.
pub fn format_timestamp(micros: i64) -> String {
    let (days, time) = split_timestamp(micros);
    format!("{} {}", format_date(days), format_time(time))
}

/// Format a timestamp as `yyyy-MM-dd HH:mm`.
pub fn format_timestamp_minutes(micros: i64) -> String {
    let (days, time) = split_timestamp(micros);
    let mins = time / (60 * MICROS_PER_SECOND);
    format!("{} {:02}:{:02}", format_date(days), mins / 60, mins % 60)
}

/// Format a timestamp as `yyyy-MM-dd HH:mm:ss[.SSS]` for text storage.
pub fn format_timestamp_millis(micros: i64) -> String {
    let (days, time) = split_timestamp(micros);
    format!("{} {}", format_date(days), format_time_millis(time))
}

/// Format a wall-clock instant as `yyyy-MM-dd HH:mm:ss.SSS` (UTC).
pub fn format_system_time(t: SystemTime) -> String {
    let micros = match t.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_micros()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_micros()).unwrap_or(i64::MAX),
    };
    let (days, time) = split_timestamp(micros);
    let millis = (time % MICROS_PER_SECOND) / 1000;
    format!("{} {}.{:03}", format_date(days), format_time(time), millis)
}

/// Parse `yyyy-MM-dd` into days since the epoch.
pub fn parse_date(s: &str) -> Option<i32> {
    let s = s.trim();
    let mut parts = s.splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
        return None;
    }
    Some(ymd_to_days(year, month, day))
}

/// Parse `HH:mm[:ss[.fff]]` into microseconds since midnight.
pub fn parse_time(s: &str) -> Option<i64> {
    let s = s.trim();
    let (hms, frac) = match s.split_once('.') {
        Some((hms, frac)) => (hms, Some(frac)),
        None => (s, None),
    };
    let mut parts = hms.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: i64 = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() || hours > 23 || minutes > 59 || seconds > 59 {
        return None;
    }
    let fraction = match frac {
        Some(f) if !f.is_empty() && f.len() <= 6 && f.bytes().all(|b| b.is_ascii_digit()) => {
            let padded = format!("{:0<6}", f);
            padded.parse::<i64>().ok()?
        }
        Some(_) => return None,
        None => 0,
    };
    Some(((hours * 60 + minutes) * 60 + seconds) * MICROS_PER_SECOND + fraction)
}

/// Parse `yyyy-MM-dd[( |T)HH:mm[:ss[.fff]]]` into microseconds since the epoch.
pub fn parse_timestamp(s: &str) -> Option<i64> {
    let s = s.trim();
    let (date, time) = match s.find([' ', 'T']) {
        Some(idx) => (&s[..idx], Some(&s[idx + 1..])),
        None => (s, None),
    };
    let days = i64::from(parse_date(date)?);
    let time = match time {
        Some(t) => parse_time(t)?,
        None => 0,
    };
    Some(days * MICROS_PER_DAY + time)
}
