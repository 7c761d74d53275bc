//! Threshold parsing for `receivedDate` conditions.
//!
//! Relative values ("7 days", "2 months") count back from a caller-supplied
//! `now`. A month is a fixed 30 days, never a calendar month.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

/// Length of a "month" in relative thresholds.
pub const DAYS_PER_MONTH: i64 = 30;

/// Reasons a threshold value cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThresholdError {
    #[error("no leading number in {0:?}")]
    MissingCount(String),

    #[error("threshold {0:?} is out of range")]
    OutOfRange(String),

    #[error("unrecognized date {0:?}")]
    UnrecognizedDate(String),
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Resolves a condition value to the instant it compares against.
pub fn parse_threshold(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ThresholdError> {
    let normalized = value.trim().to_lowercase();

    if normalized.contains("day") {
        let days = leading_count(&normalized, value)?;
        return days_before(now, days, value);
    }

    if normalized.contains("month") {
        let months = leading_count(&normalized, value)?;
        let days = months
            .checked_mul(DAYS_PER_MONTH)
            .ok_or_else(|| ThresholdError::OutOfRange(value.to_string()))?;
        return days_before(now, days, value);
    }

    parse_absolute(value.trim()).ok_or_else(|| ThresholdError::UnrecognizedDate(value.to_string()))
}

fn leading_count(normalized: &str, original: &str) -> Result<i64, ThresholdError> {
    let digits: String = normalized
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();

    if digits.is_empty() {
        return Err(ThresholdError::MissingCount(original.to_string()));
    }

    digits
        .parse()
        .map_err(|_| ThresholdError::OutOfRange(original.to_string()))
}

fn days_before(
    now: DateTime<Utc>,
    days: i64,
    original: &str,
) -> Result<DateTime<Utc>, ThresholdError> {
    Duration::try_days(days)
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| ThresholdError::OutOfRange(original.to_string()))
}

/// Absolute dates; values without an offset are taken as UTC.
fn parse_absolute(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    DATE_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(text, format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn days_count_back_from_now() {
        assert_eq!(
            parse_threshold("30 days", now()).unwrap(),
            now() - Duration::days(30)
        );
        assert_eq!(
            parse_threshold("  1 Day ", now()).unwrap(),
            now() - Duration::days(1)
        );
    }

    #[test]
    fn a_month_is_exactly_thirty_days() {
        assert_eq!(
            parse_threshold("1 month", now()).unwrap(),
            now() - Duration::days(30)
        );
        assert_eq!(
            parse_threshold("3 Months", now()).unwrap(),
            now() - Duration::days(90)
        );
    }

    #[test]
    fn count_may_touch_the_unit() {
        assert_eq!(
            parse_threshold("7days", now()).unwrap(),
            now() - Duration::days(7)
        );
    }

    #[test]
    fn absolute_dates_are_utc() {
        assert_eq!(
            parse_threshold("2024-01-05", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_threshold("2024-01-05 08:30:00", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 5, 8, 30, 0).unwrap()
        );
        assert_eq!(
            parse_threshold("2024-01-05T08:30:00+02:00", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 5, 6, 30, 0).unwrap()
        );
        assert_eq!(
            parse_threshold("2024/01/05", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn unit_without_count_is_rejected() {
        assert_eq!(
            parse_threshold("some days", now()),
            Err(ThresholdError::MissingCount("some days".to_string()))
        );
    }

    #[test]
    fn weekday_names_take_the_relative_branch() {
        assert_eq!(
            parse_threshold("last tuesday", now()),
            Err(ThresholdError::MissingCount("last tuesday".to_string()))
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            parse_threshold("next week", now()),
            Err(ThresholdError::UnrecognizedDate(_))
        ));
        assert!(matches!(
            parse_threshold("", now()),
            Err(ThresholdError::UnrecognizedDate(_))
        ));
    }

    #[test]
    fn huge_counts_are_out_of_range() {
        assert!(matches!(
            parse_threshold("99999999999999999999 days", now()),
            Err(ThresholdError::OutOfRange(_))
        ));
        assert!(matches!(
            parse_threshold("9000000000000 months", now()),
            Err(ThresholdError::OutOfRange(_))
        ));
    }
}
