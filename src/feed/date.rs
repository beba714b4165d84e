use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// Offset-carrying formats tried after RFC 3339 and RFC 2822.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f %:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

/// Formats without an offset; interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Parses a feed date string, returning `None` when it cannot be understood.
///
/// A strict parse is attempted first. On failure, known malformations are
/// repaired one at a time and the parse is retried after each repair:
///
/// 1. a trailing ` UT` becomes ` GMT`
/// 2. a trailing `+HHMM`/`-HHMM` offset gains a colon (`+HH:MM`)
/// 3. a leading weekday (`Wed, `) is dropped, since many feeds get it wrong
///
/// Dateless articles are valid, so failure is not an error.
pub fn parse_date(input: &str) -> Option<DateTime<Utc>> {
    let mut candidate = input.trim().to_owned();
    if candidate.is_empty() {
        return None;
    }
    if let Some(dt) = parse_native(&candidate) {
        return Some(dt);
    }

    let repairs: [fn(&str) -> Option<String>; 3] =
        [repair_ut_suffix, repair_offset_colon, repair_weekday];
    for repair in repairs {
        if let Some(repaired) = repair(&candidate) {
            candidate = repaired;
            if let Some(dt) = parse_native(&candidate) {
                return Some(dt);
            }
        }
    }

    tracing::trace!(input = %input, "Unparseable feed date");
    None
}

/// Formats a timestamp the way it is persisted: `2025-01-01T10:00:00.000Z`.
pub fn to_iso(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses and re-formats a raw feed date in one step.
pub fn to_iso_string(input: &str) -> Option<String> {
    parse_date(input).map(|dt| to_iso(&dt))
}

fn parse_native(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    if let Some(rest) = s.strip_suffix('Z') {
        if let Some(dt) = parse_naive(rest) {
            return Some(dt);
        }
    }
    if let Some(dt) = parse_naive(s) {
        return Some(dt);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_naive(s: &str) -> Option<DateTime<Utc>> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn repair_ut_suffix(s: &str) -> Option<String> {
    let split = s.len().checked_sub(3)?;
    let (head, tail) = (s.get(..split)?, s.get(split..)?);
    tail.eq_ignore_ascii_case(" UT")
        .then(|| format!("{} GMT", head.trim_end()))
}

fn repair_offset_colon(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let n = bytes.len();
    if n < 5 {
        return None;
    }
    let sign = bytes[n - 5];
    let digits = &bytes[n - 4..];
    if (sign == b'+' || sign == b'-') && digits.iter().all(u8::is_ascii_digit) {
        Some(format!("{}:{}", &s[..n - 2], &s[n - 2..]))
    } else {
        None
    }
}

fn repair_weekday(s: &str) -> Option<String> {
    let (day, rest) = s.split_once(',')?;
    let day = day.trim();
    (day.len() >= 3 && day.chars().all(|c| c.is_ascii_alphabetic()))
        .then(|| rest.trim_start().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_iso_date() {
        assert_eq!(
            parse_date("2025-01-01T12:00:00.000Z"),
            Some(utc(2025, 1, 1, 12, 0, 0))
        );
    }

    #[test]
    fn test_rfc2822_date() {
        assert_eq!(
            parse_date("Wed, 01 Jan 2025 10:00:00 GMT"),
            Some(utc(2025, 1, 1, 10, 0, 0))
        );
        assert_eq!(
            parse_date("Wed, 01 Jan 2025 10:00:00 +0100"),
            Some(utc(2025, 1, 1, 9, 0, 0))
        );
    }

    #[test]
    fn test_ut_suffix() {
        assert_eq!(
            parse_date("Wed, 01 Jan 2025 10:00:00 UT"),
            Some(utc(2025, 1, 1, 10, 0, 0))
        );
    }

    #[test]
    fn test_offset_without_colon() {
        assert_eq!(
            parse_date("2025-01-01T12:00:00+0530"),
            Some(utc(2025, 1, 1, 6, 30, 0))
        );
    }

    #[test]
    fn test_wrong_weekday_tolerated() {
        // 1 Jan 2025 was a Wednesday
        assert_eq!(
            parse_date("Mon, 01 Jan 2025 10:00:00 GMT"),
            Some(utc(2025, 1, 1, 10, 0, 0))
        );
    }

    #[test]
    fn test_date_only_and_naive() {
        assert_eq!(parse_date("2025-01-02"), Some(utc(2025, 1, 2, 0, 0, 0)));
        assert_eq!(
            parse_date("2025-01-02 08:30:00"),
            Some(utc(2025, 1, 2, 8, 30, 0))
        );
    }

    #[test]
    fn test_garbage_is_none() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("yesterday-ish"), None);
        assert_eq!(parse_date("2025-13-45"), None);
    }

    #[test]
    fn test_iso_output() {
        assert_eq!(
            to_iso_string("Wed, 01 Jan 2025 10:00:00 GMT").as_deref(),
            Some("2025-01-01T10:00:00.000Z")
        );
    }

    #[test]
    fn test_repairs() {
        assert_eq!(
            repair_offset_colon("2025-01-01 10:00:00 +0530").as_deref(),
            Some("2025-01-01 10:00:00 +05:30")
        );
        assert_eq!(repair_offset_colon("2025-01-01"), None);
        assert_eq!(
            repair_ut_suffix("01 Jan 2025 10:00:00 ut").as_deref(),
            Some("01 Jan 2025 10:00:00 GMT")
        );
    }
}
