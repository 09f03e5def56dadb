//! Duration directives in the `1h2m3.5s` notation used by orchestrator annotations.
//!
//! Accepted grammar: an optional leading `+`, then one or more `<number><unit>` pairs
//! where a number may carry a decimal fraction and a unit is one of `ns`, `us`, `µs`,
//! `μs`, `ms`, `s`, `m`, `h`. The bare string `0` is also accepted. Negative values are
//! rejected.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{FerryError, Result};

const NANOS_PER_MICRO: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_SEC: u64 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<u64> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3600 * NANOS_PER_SEC),
        _ => None,
    }
}

/// Parse a duration string into a [`Duration`].
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || FerryError::InvalidDuration(input.to_string());

    let mut s = input.strip_prefix('+').unwrap_or(input);
    if s.starts_with('-') || input.starts_with('-') {
        return Err(invalid());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total: u64 = 0;
    while !s.is_empty() {
        let first = s.as_bytes()[0];
        if !(first == b'.' || first.is_ascii_digit()) {
            return Err(invalid());
        }

        // integer part
        let int_len = s.bytes().take_while(u8::is_ascii_digit).count();
        let whole: u64 = if int_len > 0 {
            s[..int_len].parse().map_err(|_| invalid())?
        } else {
            0
        };
        s = &s[int_len..];

        // fractional part; digits beyond u64 precision are dropped
        let mut frac: u64 = 0;
        let mut scale: f64 = 1.0;
        let mut frac_len = 0;
        if let Some(rest) = s.strip_prefix('.') {
            s = rest;
            frac_len = s.bytes().take_while(u8::is_ascii_digit).count();
            let mut overflowed = false;
            for digit in s[..frac_len].bytes() {
                if overflowed {
                    continue;
                }
                match frac
                    .checked_mul(10)
                    .and_then(|f| f.checked_add(u64::from(digit - b'0')))
                {
                    Some(next) => {
                        frac = next;
                        scale *= 10.0;
                    }
                    None => overflowed = true,
                }
            }
            s = &s[frac_len..];
        }
        if int_len == 0 && frac_len == 0 {
            return Err(invalid());
        }

        let unit_len = s
            .char_indices()
            .find(|(_, c)| *c == '.' || c.is_ascii_digit())
            .map_or(s.len(), |(i, _)| i);
        if unit_len == 0 {
            return Err(invalid());
        }
        let unit = unit_nanos(&s[..unit_len]).ok_or_else(invalid)?;
        s = &s[unit_len..];

        let mut value = whole.checked_mul(unit).ok_or_else(invalid)?;
        if frac > 0 {
            let extra = (frac as f64 * (unit as f64 / scale)) as u64;
            value = value.checked_add(extra).ok_or_else(invalid)?;
        }
        total = total.checked_add(value).ok_or_else(invalid)?;
        if total > i64::MAX as u64 {
            return Err(invalid());
        }
    }

    Ok(Duration::from_nanos(total))
}

/// A validated duration directive that remembers the text it was parsed from.
///
/// Tokens embed the raw text, so encoding must reproduce it exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationSpec {
    raw: String,
    value: Duration,
}

impl DurationSpec {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn duration(&self) -> Duration {
        self.value
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.value.as_secs_f64()
    }
}

impl FromStr for DurationSpec {
    type Err = FerryError;

    fn from_str(s: &str) -> Result<Self> {
        let value = parse_duration(s)?;
        Ok(Self {
            raw: s.to_string(),
            value,
        })
    }
}

impl fmt::Display for DurationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
