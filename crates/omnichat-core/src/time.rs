// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timestamp helpers. All persisted times use one fixed-width UTC format.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Current time as a persisted timestamp.
pub fn now() -> String {
    format(Utc::now())
}

pub fn format(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Unix seconds to a persisted timestamp. Out-of-range input yields `None`.
pub fn from_unix(secs: i64) -> Option<String> {
    Utc.timestamp_opt(secs, 0).single().map(format)
}

pub fn parse(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Whole seconds from `earlier` to `later`, if both parse.
pub fn seconds_between(earlier: &str, later: &str) -> Option<i64> {
    Some((parse(later)? - parse(earlier)?).num_seconds())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_round_trip_is_sortable() {
        let a = from_unix(1_700_000_000).unwrap();
        let b = from_unix(1_700_000_001).unwrap();
        assert_eq!(a, "2023-11-14T22:13:20.000Z");
        assert!(a < b);
        assert_eq!(parse(&a).unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn seconds_between_handles_order() {
        let a = from_unix(100).unwrap();
        let b = from_unix(160).unwrap();
        assert_eq!(seconds_between(&a, &b), Some(60));
        assert_eq!(seconds_between(&b, &a), Some(-60));
        assert_eq!(seconds_between("garbage", &a), None);
    }
}
