//! Duration strings
//!
//! TTLs and intervals travel as Go-style duration strings (`10s`, `1500ms`,
//! `1h30m`). The same format is used in the YAML config and on the wire
//! between the router and the storage nodes.

use std::time::Duration;

use crate::error::{Error, Result};

/// Parse a Go-style duration string (e.g., "1h", "30m", "250ms", "1h30m", "1.5s")
///
/// A bare number is taken as seconds. `"0"` is accepted and means zero,
/// which callers treat as "use the default TTL". Fractions below one
/// nanosecond are truncated.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::DurationParse("empty duration string".to_string()));
    }

    let mut total_nanos: u128 = 0;
    let mut num_buf = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() || c == '.' {
            num_buf.push(c);
            continue;
        }

        // Two-letter units share their first letter with a one-letter unit.
        let multiplier: u128 = match (c, chars.peek().copied()) {
            ('m' | 'M', Some('s' | 'S')) => {
                chars.next();
                1_000_000
            }
            ('u' | 'U' | 'µ', Some('s' | 'S')) => {
                chars.next();
                1_000
            }
            ('n' | 'N', Some('s' | 'S')) => {
                chars.next();
                1
            }
            ('d' | 'D', _) => 86_400 * 1_000_000_000,
            ('h' | 'H', _) => 3_600 * 1_000_000_000,
            ('m' | 'M', _) => 60 * 1_000_000_000,
            ('s' | 'S', _) => 1_000_000_000,
            _ => {
                return Err(Error::DurationParse(format!(
                    "unknown duration unit: {}",
                    c
                )))
            }
        };

        total_nanos = add_component(s, total_nanos, &num_buf, multiplier)?;
        num_buf.clear();
    }

    // Trailing number without a unit is seconds
    if !num_buf.is_empty() {
        total_nanos = add_component(s, total_nanos, &num_buf, 1_000_000_000)?;
    }

    let secs = u64::try_from(total_nanos / 1_000_000_000)
        .map_err(|_| Error::DurationParse(format!("duration overflows: {}", s)))?;
    Ok(Duration::new(secs, (total_nanos % 1_000_000_000) as u32))
}

/// Longest fraction kept; anything finer is below a nanosecond for every unit
const MAX_FRACTION_DIGITS: usize = 15;

/// Add `number * multiplier` nanoseconds to `total`. `number` may carry a
/// fractional part (`1.5`, `.5`, `2.`).
fn add_component(s: &str, total: u128, number: &str, multiplier: u128) -> Result<u128> {
    let invalid_number = || Error::DurationParse(format!("invalid number in duration: {}", s));
    let overflow = || Error::DurationParse(format!("duration overflows: {}", s));

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
        return Err(invalid_number());
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid_number())?
    };

    let fraction = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
    let fraction_nanos = if fraction.is_empty() {
        0
    } else {
        let digits: u128 = fraction.parse().map_err(|_| invalid_number())?;
        digits * multiplier / 10u128.pow(fraction.len() as u32)
    };

    whole
        .checked_mul(multiplier)
        .and_then(|n| n.checked_add(fraction_nanos))
        .and_then(|n| total.checked_add(n))
        .ok_or_else(overflow)
}

/// Format a duration in the coarsest unit that keeps it exact
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        "0s".to_string()
    } else if nanos % 1_000_000_000 == 0 {
        format!("{}s", nanos / 1_000_000_000)
    } else if nanos % 1_000_000 == 0 {
        format!("{}ms", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!("{}us", nanos / 1_000)
    } else {
        format!("{}ns", nanos)
    }
}

/// Serde adapter for duration fields written as strings in config files
pub mod serde_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
