/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Human duration parsing for `--older-than`
//!
//! Durations are read by `humantime`: `90s`, `10m`, `1h30m`, `1d` and the
//! other units it knows. A single fractional term such as `1.5h` is also
//! accepted.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationError {
    #[error("invalid duration \"{0}\"")]
    Invalid(String),

    #[error("missing unit in duration \"{0}\" (use 10m, 5h, 1d)")]
    MissingUnit(String),

    #[error("unknown unit \"{unit}\" in duration \"{input}\"")]
    UnknownUnit { unit: String, input: String },

    #[error("negative duration \"{0}\" is not allowed")]
    Negative(String),

    #[error("duration \"{0}\" is out of range")]
    Overflow(String),
}

impl DurationError {
    fn from_humantime(err: humantime::DurationError, input: &str) -> Self {
        match err {
            humantime::DurationError::UnknownUnit { unit, .. } if unit.is_empty() => {
                DurationError::MissingUnit(input.to_string())
            }
            humantime::DurationError::UnknownUnit { unit, .. } => DurationError::UnknownUnit {
                unit,
                input: input.to_string(),
            },
            humantime::DurationError::NumberOverflow => DurationError::Overflow(input.to_string()),
            _ => DurationError::Invalid(input.to_string()),
        }
    }
}

/// clap value parser for `--older-than`
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let value = input.trim();
    let (negative, rest) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    if rest.is_empty() {
        return Err(DurationError::Invalid(input.to_string()));
    }

    let duration = if rest.trim_start_matches('0').is_empty() {
        Duration::ZERO
    } else if rest.chars().all(|c| c.is_ascii_digit()) {
        return Err(DurationError::MissingUnit(input.to_string()));
    } else if rest.contains('.') {
        parse_fraction(rest, input)?
    } else {
        humantime::parse_duration(rest).map_err(|err| DurationError::from_humantime(err, input))?
    };

    if negative && !duration.is_zero() {
        return Err(DurationError::Negative(input.to_string()));
    }
    Ok(duration)
}

/// `<number>.<number><unit>`, scaled by what one `<unit>` parses to
fn parse_fraction(value: &str, input: &str) -> Result<Duration, DurationError> {
    let (amount, unit) = value.split_at(
        value
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(value.len()),
    );
    let amount: f64 = amount
        .parse()
        .map_err(|_| DurationError::Invalid(input.to_string()))?;
    if unit.is_empty() {
        return Err(DurationError::MissingUnit(input.to_string()));
    }
    let unit = humantime::parse_duration(&format!("1{unit}"))
        .map_err(|err| DurationError::from_humantime(err, input))?;
    Duration::try_from_secs_f64(unit.as_secs_f64() * amount)
        .map_err(|_| DurationError::Overflow(input.to_string()))
}

/// Rendering to whole seconds, e.g. `1day`, `1h 30m` or `1m 30s`
pub fn format_duration(duration: Duration) -> String {
    humantime::format_duration(Duration::from_secs(duration.as_secs())).to_string()
}
