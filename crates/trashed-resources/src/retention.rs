/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Retention deadlines for captured records
//!
//! Deadlines are computed once at capture time and persisted as RFC3339
//! text, so everything here works on `DateTime<Utc>` and the textual form
//! produced by [`format_timestamp`].

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration key holding the minutes a record is kept
pub const MINUTES_TO_KEEP_KEY: &str = "minutesToKeep";
/// Configuration key holding the hours a record is kept
pub const HOURS_TO_KEEP_KEY: &str = "hoursToKeep";

pub const DEFAULT_MINUTES_TO_KEEP: u32 = 60;
pub const DEFAULT_HOURS_TO_KEEP: u32 = 0;

/// Longest accepted retention, roughly one hundred years
pub const MAX_HOURS_TO_KEEP: u32 = 876_600;
pub const MAX_MINUTES_TO_KEEP: u32 = MAX_HOURS_TO_KEEP * 60;

/// How long a captured record is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub minutes_to_keep: u32,
    pub hours_to_keep: u32,
}

impl RetentionConfig {
    pub fn new(minutes_to_keep: u32, hours_to_keep: u32) -> Self {
        Self {
            minutes_to_keep,
            hours_to_keep,
        }
    }

    /// Build from raw configuration values. Missing or invalid values fall
    /// back to the defaults independently of each other.
    pub fn from_values(minutes: Option<&str>, hours: Option<&str>) -> Self {
        Self {
            minutes_to_keep: parse_amount(
                MINUTES_TO_KEEP_KEY,
                minutes,
                DEFAULT_MINUTES_TO_KEEP,
                MAX_MINUTES_TO_KEEP,
            ),
            hours_to_keep: parse_amount(
                HOURS_TO_KEEP_KEY,
                hours,
                DEFAULT_HOURS_TO_KEEP,
                MAX_HOURS_TO_KEEP,
            ),
        }
    }

    /// Total retention period
    pub fn period(&self) -> Duration {
        Duration::hours(i64::from(self.hours_to_keep))
            + Duration::minutes(i64::from(self.minutes_to_keep))
    }

    /// `now + hours + minutes`. A deadline past the representable date range
    /// falls back to the default retention, then to the latest representable
    /// instant.
    pub fn deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.period()).unwrap_or_else(|| {
            warn!(
                minutes_to_keep = self.minutes_to_keep,
                hours_to_keep = self.hours_to_keep,
                "Retention period out of range, using default"
            );
            now.checked_add_signed(RetentionConfig::default().period())
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }

    /// Deadline in its persisted textual form
    pub fn keep_until(&self, now: DateTime<Utc>) -> String {
        format_timestamp(self.deadline(now))
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            minutes_to_keep: DEFAULT_MINUTES_TO_KEEP,
            hours_to_keep: DEFAULT_HOURS_TO_KEEP,
        }
    }
}

fn parse_amount(key: &str, value: Option<&str>, default: u32, max: u32) -> u32 {
    match value.map(str::trim) {
        None | Some("") => default,
        Some(raw) => match raw.parse::<u32>() {
            Ok(amount) if amount <= max => amount,
            Ok(amount) => {
                warn!(
                    key,
                    value = amount,
                    max,
                    default,
                    "Retention value too large, using default"
                );
                default
            }
            Err(err) => {
                warn!(
                    key,
                    value = raw,
                    error = %err,
                    default,
                    "Invalid retention value in configuration, using default"
                );
                default
            }
        },
    }
}

/// Render a timestamp the way deadlines are persisted
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|timestamp| timestamp.with_timezone(&Utc))
}

/// Whether `now` has reached `deadline`. `None` when the deadline does not
/// parse.
pub fn now_is_after_or_equal(deadline: &str, now: DateTime<Utc>) -> Option<bool> {
    parse_timestamp(deadline).map(|deadline| now >= deadline)
}

/// Time left until `deadline`, negative once it has passed.
pub fn time_remaining(deadline: &str, now: DateTime<Utc>) -> Option<Duration> {
    parse_timestamp(deadline).map(|deadline| deadline - now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_default_deadline_is_one_hour() {
        let config = RetentionConfig::default();
        assert_eq!(config.deadline(at(10, 0)), at(11, 0));
        assert_eq!(config.keep_until(at(10, 0)), "2024-05-01T11:00:00Z");
    }

    #[test]
    fn test_hours_and_minutes_are_additive() {
        let config = RetentionConfig::new(30, 2);
        assert_eq!(config.deadline(at(10, 0)), at(12, 30));
    }

    #[test]
    fn test_deadline_is_monotonic() {
        let now = at(8, 0);
        let mut previous = RetentionConfig::new(0, 0).deadline(now);
        for minutes in [1, 5, 59, 60, 61, 600] {
            let next = RetentionConfig::new(minutes, 0).deadline(now);
            assert!(next >= previous);
            previous = next;
        }
        for hours in [0, 1, 24, 48] {
            let base = RetentionConfig::new(10, hours).deadline(now);
            let more = RetentionConfig::new(10, hours + 1).deadline(now);
            assert!(more >= base);
        }
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        assert_eq!(
            RetentionConfig::from_values(Some("abc"), Some("-3")),
            RetentionConfig::default()
        );
        assert_eq!(
            RetentionConfig::from_values(Some(" 15 "), None),
            RetentionConfig::new(15, 0)
        );
        assert_eq!(
            RetentionConfig::from_values(Some("bad"), Some("4")),
            RetentionConfig::new(DEFAULT_MINUTES_TO_KEEP, 4)
        );
        assert_eq!(RetentionConfig::from_values(None, Some("")), RetentionConfig::default());
    }

    #[test]
    fn test_oversized_values_fall_back_to_defaults() {
        assert_eq!(
            RetentionConfig::from_values(None, Some("3000000000")),
            RetentionConfig::default()
        );
        assert_eq!(
            RetentionConfig::from_values(Some("4294967295"), Some("2")),
            RetentionConfig::new(DEFAULT_MINUTES_TO_KEEP, 2)
        );
        assert_eq!(
            RetentionConfig::from_values(None, Some("876600")),
            RetentionConfig::new(DEFAULT_MINUTES_TO_KEEP, MAX_HOURS_TO_KEEP)
        );
    }

    #[test]
    fn test_deadline_out_of_range_uses_default_period() {
        let config = RetentionConfig::new(u32::MAX, u32::MAX);
        assert_eq!(config.deadline(at(10, 0)), at(11, 0));

        let late = DateTime::<Utc>::MAX_UTC - Duration::minutes(30);
        assert_eq!(
            RetentionConfig::new(0, 1).deadline(late),
            DateTime::<Utc>::MAX_UTC
        );
    }

    #[test]
    fn test_deadline_checks() {
        let deadline = format_timestamp(at(12, 0));
        assert_eq!(now_is_after_or_equal(&deadline, at(11, 59)), Some(false));
        assert_eq!(now_is_after_or_equal(&deadline, at(12, 0)), Some(true));
        assert_eq!(now_is_after_or_equal(&deadline, at(13, 0)), Some(true));
        assert_eq!(now_is_after_or_equal("not-a-date", at(13, 0)), None);

        assert_eq!(time_remaining(&deadline, at(11, 30)), Some(Duration::minutes(30)));
        assert_eq!(time_remaining(&deadline, at(12, 10)), Some(Duration::minutes(-10)));
    }

    #[test]
    fn test_parse_timestamp_accepts_offsets() {
        assert_eq!(parse_timestamp("2024-05-01T14:00:00+02:00"), Some(at(12, 0)));
    }
}
