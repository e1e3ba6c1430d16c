use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

const WITH_WEEKDAY: &str = "%a, %d %b %Y %H:%M:%S";
const WITHOUT_WEEKDAY: &str = "%d %b %Y %H:%M:%S";

/// Parse a free-form email `Date` value.
///
/// Accepted shapes, with or without a leading weekday:
/// - `Fri, 28 Nov 2025 13:29:02 +0000`
/// - `28 Nov 2025 13:29:02 -0700 (MST)`
/// - `Fri, 28 Nov 2025 13:29:02 GMT`
/// - `Fri, 28 Nov 2025 13:29:02 (CST)` (abbreviation alone is read as UTC)
pub fn parse_email_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let mut date_part = strip_zone_abbreviation(raw.trim());
    let mut offset_seconds = 0;

    if let Some(index) = date_part.find(" GMT").or_else(|| date_part.find(" UTC")) {
        date_part = &date_part[..index];
    } else if let Some((rest, zone)) = date_part.rsplit_once(' ') {
        if let Some(seconds) = parse_numeric_offset(zone) {
            offset_seconds = seconds;
            date_part = rest;
        }
    }

    let naive = parse_naive(date_part.trim())?;
    let offset = FixedOffset::east_opt(offset_seconds)?;
    offset.from_local_datetime(&naive).single()
}

fn strip_zone_abbreviation(value: &str) -> &str {
    if let Some(open) = value.rfind(" (") {
        let inner = &value[open + 2..];
        if let Some(abbreviation) = inner.strip_suffix(')') {
            if !abbreviation.is_empty() && abbreviation.chars().all(|c| c.is_ascii_alphabetic()) {
                return value[..open].trim_end();
            }
        }
    }
    value
}

/// `+HHMM` / `-HHMM` to seconds east of UTC.
fn parse_numeric_offset(zone: &str) -> Option<i32> {
    let (sign, digits) = match zone.as_bytes().first()? {
        b'+' => (1, &zone[1..]),
        b'-' => (-1, &zone[1..]),
        _ => return None,
    };
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    Some(sign * (hours * 3600 + minutes * 60))
}

fn parse_naive(date_part: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = NaiveDateTime::parse_from_str(date_part, WITH_WEEKDAY) {
        return Some(parsed);
    }
    // chrono rejects a weekday that disagrees with the date; mail clients get this wrong.
    let without_weekday = match date_part.split_once(", ") {
        Some((_, rest)) => rest,
        None => date_part,
    };
    NaiveDateTime::parse_from_str(without_weekday, WITHOUT_WEEKDAY).ok()
}

/// Age test used by the archive decision.
///
/// A threshold of 0 is always eligible. Otherwise the email must be at least
/// `threshold_days` whole days old. Unparseable dates are never eligible.
pub fn is_archivable(raw_date: &str, threshold_days: u32, now: DateTime<Utc>) -> bool {
    if threshold_days == 0 {
        return true;
    }

    match parse_email_date(raw_date) {
        Some(date) => now.signed_duration_since(date).num_days() >= i64::from(threshold_days),
        None => {
            log::warn!("Could not parse date '{raw_date}', not archiving");
            false
        }
    }
}

/// RFC 3339 rendering that keeps the original offset, or the input unchanged.
pub fn to_iso(raw_date: &str) -> String {
    match parse_email_date(raw_date) {
        Some(date) => date.to_rfc3339(),
        None => raw_date.to_string(),
    }
}
