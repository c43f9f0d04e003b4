//! Human-friendly TTL parsing.
//!
//! Parses strings like `"10m"`, `"1h30s"`, `"2d"` into a [`Duration`]. Units
//! are accumulated left to right: a run of digits followed by a unit letter
//! adds `digits * unit` to the total, so `"1h30s"` means one hour plus
//! thirty seconds, not ninety minutes.

use std::time::Duration;

/// Error returned when a TTL string cannot be parsed.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TtlParseError {
    /// The string contained a character that isn't a digit or a known unit.
    #[error("unrecognized unit {0:?} in TTL string")]
    UnknownUnit(char),
    /// The string was empty or contained no digits before a unit.
    #[error("malformed TTL string {0:?}")]
    Malformed(String),
}

/// A TTL value: either a fixed duration or "no expiry".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Entry expires after this duration.
    Fixed(Duration),
    /// Entry never expires.
    Unbounded,
}

impl Ttl {
    /// Returns the duration, or `None` for [`Ttl::Unbounded`].
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Ttl::Fixed(d) => Some(*d),
            Ttl::Unbounded => None,
        }
    }
}

/// Parses a human duration string such as `"10m"` or `"1h30s"`.
///
/// Recognized unit suffixes: `d` (days), `h` (hours), `m` (minutes), `s`
/// (seconds). An empty string is malformed; a bare number of digits with no
/// unit is also rejected, since the source format always requires a unit.
pub fn parse_human_duration(input: &str) -> Result<Duration, TtlParseError> {
    if input.is_empty() {
        return Err(TtlParseError::Malformed(input.to_string()));
    }

    let mut total = Duration::ZERO;
    let mut digits = String::new();

    for ch in input.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let unit_seconds: u64 = match ch {
            'd' => 24 * 60 * 60,
            'h' => 60 * 60,
            'm' => 60,
            's' => 1,
            other => return Err(TtlParseError::UnknownUnit(other)),
        };
        if digits.is_empty() {
            return Err(TtlParseError::Malformed(input.to_string()));
        }
        let amount: u64 = digits.parse().map_err(|_| TtlParseError::Malformed(input.to_string()))?;
        total += Duration::from_secs(amount * unit_seconds);
        digits.clear();
    }

    if !digits.is_empty() {
        // trailing digits with no unit: the source rejects this shape.
        return Err(TtlParseError::Malformed(input.to_string()));
    }

    Ok(total)
}
