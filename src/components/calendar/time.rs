use chrono::{
    DateTime, Datelike, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Utc,
};
use chrono_tz::Tz;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse a timestamp the way sources send them.
///
/// RFC 3339 values keep their own offset. Naive datetimes and date-only values
/// are placed in `tz`; a date-only value becomes local midnight.
pub fn parse_timestamp(value: &str, tz: &Tz) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }

    // Offsets without a colon, e.g. 2024-05-01T14:00:00+0300
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt);
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return localize(&naive, tz);
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| localize(&date.and_time(NaiveTime::MIN), tz))
}

/// Place a naive datetime in a timezone. Ambiguous times take the earlier
/// instant; times skipped by a DST jump move forward one hour.
pub fn localize(naive: &NaiveDateTime, tz: &Tz) -> Option<DateTime<FixedOffset>> {
    match tz.from_local_datetime(naive) {
        LocalResult::Single(dt) => Some(dt.fixed_offset()),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.fixed_offset()),
        LocalResult::None => match tz.from_local_datetime(&(*naive + Duration::hours(1))) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt.fixed_offset()),
            LocalResult::None => None,
        },
    }
}

/// Current instant in `tz`
pub fn now_in(tz: &Tz) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(tz).fixed_offset()
}

/// Next Sunday at 19:00 local time, strictly after `now`
pub fn next_sunday_evening(now: DateTime<FixedOffset>, tz: &Tz) -> Option<DateTime<FixedOffset>> {
    let local = now.with_timezone(tz);
    let days_until_sunday = (7 - local.weekday().num_days_from_sunday()) % 7;

    let mut date = local
        .date_naive()
        .checked_add_signed(Duration::days(days_until_sunday as i64))?;
    let evening = NaiveTime::from_hms_opt(19, 0, 0)?;

    if days_until_sunday == 0 && date.and_time(evening) <= local.naive_local() {
        date = date.checked_add_signed(Duration::days(7))?;
    }

    localize(&date.and_time(evening), tz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_timestamp_formats() {
        let tz: Tz = chrono_tz::UTC;

        let dt = parse_timestamp("2024-05-01T14:00:00+03:00", &tz).unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 3 * 3600);
        assert_eq!(dt.hour(), 14);

        let dt = parse_timestamp("2024-05-01T14:00:00+0300", &tz).unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 3 * 3600);

        let dt = parse_timestamp("2024-05-01T14:30", &tz).unwrap();
        assert_eq!((dt.hour(), dt.minute()), (14, 30));

        let dt = parse_timestamp("2024-05-01 09:15:00", &tz).unwrap();
        assert_eq!(dt.hour(), 9);

        let dt = parse_timestamp("2024-05-01", &tz).unwrap();
        assert_eq!(dt.date_naive(), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(dt.hour(), 0);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        let tz: Tz = chrono_tz::UTC;
        assert_eq!(parse_timestamp("", &tz), None);
        assert_eq!(parse_timestamp("   ", &tz), None);
        assert_eq!(parse_timestamp("next tuesday", &tz), None);
        assert_eq!(parse_timestamp("2024-13-45", &tz), None);
    }

    #[test]
    fn test_date_only_uses_zone_midnight() {
        let tz: Tz = chrono_tz::Europe::Helsinki;
        let dt = parse_timestamp("2024-05-01", &tz).unwrap();
        assert_eq!(dt.date_naive(), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(dt.offset().local_minus_utc(), 3 * 3600);
    }

    #[test]
    fn test_localize_skipped_hour() {
        // Clocks jump from 03:00 to 04:00 in Helsinki on 2024-03-31
        let tz: Tz = chrono_tz::Europe::Helsinki;
        let naive = NaiveDate::from_ymd_opt(2024, 3, 31)
            .unwrap()
            .and_hms_opt(3, 30, 0)
            .unwrap();
        let dt = localize(&naive, &tz).unwrap();
        assert_eq!(dt.hour(), 4);
    }

    #[test]
    fn test_next_sunday_evening() {
        let tz: Tz = chrono_tz::UTC;

        // Wednesday
        let now = parse_timestamp("2024-05-01T10:00:00Z", &tz).unwrap();
        let next = next_sunday_evening(now, &tz).unwrap();
        assert_eq!(next.to_rfc3339(), "2024-05-05T19:00:00+00:00");

        // Sunday before the meeting
        let now = parse_timestamp("2024-05-05T10:00:00Z", &tz).unwrap();
        let next = next_sunday_evening(now, &tz).unwrap();
        assert_eq!(next.to_rfc3339(), "2024-05-05T19:00:00+00:00");

        // Sunday after the meeting
        let now = parse_timestamp("2024-05-05T20:00:00Z", &tz).unwrap();
        let next = next_sunday_evening(now, &tz).unwrap();
        assert_eq!(next.to_rfc3339(), "2024-05-12T19:00:00+00:00");
    }
}
