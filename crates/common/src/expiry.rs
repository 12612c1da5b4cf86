//! Expiry dates and one-time link windows
//!
//! Expiry is a day-granularity value. It is normalized once, at the boundary,
//! to the last second of that day in UTC.

use crate::{Error, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Validity window of a freshly generated one-time link
pub const ONE_TIME_LINK_TTL_MINUTES: i64 = 5;

pub fn one_time_link_ttl() -> Duration {
    Duration::minutes(ONE_TIME_LINK_TTL_MINUTES)
}

/// 23:59:59 UTC on `date`
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(23, 59, 59)
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// Parse `YYYY-MM-DD`, or an RFC 3339 timestamp whose date part is kept.
pub fn parse_expiry_date(input: &str) -> Result<NaiveDate> {
    let input = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(input)
        .map(|ts| ts.with_timezone(&Utc).date_naive())
        .map_err(|_| Error::Validation(format!("{:?} is not a valid expiry date", input)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_end_of_day() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let ts = end_of_day(date);
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap());
        assert_eq!(ts.nanosecond(), 0);
    }

    #[test]
    fn test_parse_plain_date() {
        let date = parse_expiry_date("2025-12-31").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
    }

    #[test]
    fn test_parse_timestamp_keeps_date() {
        let date = parse_expiry_date("2025-03-04T10:11:12Z").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_expiry_date("next tuesday").unwrap_err().is_validation());
        assert!(parse_expiry_date("2025-02-30").is_err());
    }
}
