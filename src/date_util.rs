use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Parse a timestamp field leniently. Malformed or absent values yield `None`
/// so call sites pick the fallback; a bad date never fails an item.
pub fn parse_date(value: Option<&str>) -> Option<DateTime<Utc>> {
    let s = value?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Some WSAPI fields come back as bare dates.
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
    }
    None
}

/// Whole days between two instants, floored on the elapsed duration rather
/// than by subtracting calendar dates (avoids partial-day truncation bias).
pub fn whole_days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_days()
}

/// Floor a duration to whole days, clamped to zero for negative spans.
pub fn duration_days(d: Duration) -> i64 {
    d.num_days().max(0)
}
