use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr, time::Duration};

/// A non-negative duration in Go `time.Duration` notation, extended with a `d` (24h) unit.
///
/// Formats the way Go's `Duration.String()` does, so values written back to the API server (e.g.
/// a backup's TTL) are understood by Go controllers.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct K8sDuration(Duration);

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("empty duration")]
    Empty,

    #[error("negative durations are not supported")]
    Negative,

    #[error("invalid unit: {}", EXPECTED_UNITS)]
    InvalidUnit,

    #[error("missing a unit: {}", EXPECTED_UNITS)]
    NoUnit,

    #[error("invalid floating-point number: {}", .0)]
    NotANumber(#[from] std::num::ParseFloatError),

    #[error("duration out of range")]
    Overflow,
}

const EXPECTED_UNITS: &str =
    "expected one of 'ns', 'us', '\u{00b5}s', 'ms', 's', 'm', 'h', or 'd'";

const NANOS_PER_SEC: u128 = 1_000_000_000;

// === impl K8sDuration ===

impl K8sDuration {
    pub const fn from_days(days: u64) -> Self {
        Self(Duration::from_secs(days * 24 * 60 * 60))
    }

    pub const fn from_hours(hours: u64) -> Self {
        Self(Duration::from_secs(hours * 60 * 60))
    }

    pub const fn as_duration(&self) -> Duration {
        self.0
    }
}

impl From<Duration> for K8sDuration {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

impl From<K8sDuration> for Duration {
    fn from(K8sDuration(duration): K8sDuration) -> Self {
        duration
    }
}

impl fmt::Debug for K8sDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for K8sDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = self.0.as_nanos();
        if nanos == 0 {
            return f.write_str("0s");
        }

        // Sub-second values use the largest unit that keeps the integer part non-zero.
        if nanos < NANOS_PER_SEC {
            return match nanos {
                n if n < 1_000 => write!(f, "{n}ns"),
                n if n < 1_000_000 => write_fraction(f, n, 1_000, "\u{00b5}s"),
                n => write_fraction(f, n, 1_000_000, "ms"),
            };
        }

        let secs = self.0.as_secs();
        let (hours, minutes) = (secs / 3600, (secs % 3600) / 60);
        if hours > 0 {
            write!(f, "{hours}h")?;
        }
        if hours > 0 || minutes > 0 {
            write!(f, "{minutes}m")?;
        }
        write_fraction(f, nanos % (60 * NANOS_PER_SEC), NANOS_PER_SEC, "s")
    }
}

/// Writes `value / per_unit` with its fractional part, trailing zeros trimmed.
fn write_fraction(f: &mut fmt::Formatter<'_>, value: u128, per_unit: u128, unit: &str) -> fmt::Result {
    let (int, frac) = (value / per_unit, value % per_unit);
    if frac == 0 {
        return write!(f, "{int}{unit}");
    }
    let width = per_unit.ilog10() as usize;
    let digits = format!("{frac:0width$}");
    write!(f, "{int}.{}{unit}", digits.trim_end_matches('0'))
}

impl FromStr for K8sDuration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut s = s.trim();
        if s.is_empty() {
            return Err(ParseError::Empty);
        }
        if let Some(rest) = s.strip_prefix('-') {
            if rest.chars().all(|c| c == '0' || c == '.') {
                return Ok(Self::default());
            }
            return Err(ParseError::Negative);
        }
        s = s.strip_prefix('+').unwrap_or(s);
        if s == "0" {
            return Ok(Self::default());
        }

        let mut total = Duration::ZERO;
        while !s.is_empty() {
            let unit_start = s
                .find(|c: char| c.is_alphabetic())
                .ok_or(ParseError::NoUnit)?;
            let (value, rest) = s.split_at(unit_start);
            let unit_end = rest
                .find(|c: char| !c.is_alphabetic())
                .unwrap_or(rest.len());
            let (unit, rest) = rest.split_at(unit_end);
            s = rest;

            let value = value.parse::<f64>()?;
            let part = scale(value, unit_duration(unit)?)?;
            total = total.checked_add(part).ok_or(ParseError::Overflow)?;
        }

        Ok(Self(total))
    }
}

fn unit_duration(unit: &str) -> Result<Duration, ParseError> {
    const MINUTE: Duration = Duration::from_secs(60);
    Ok(match unit {
        "ns" => Duration::from_nanos(1),
        // U+00B5 is the micro sign; U+03BC is the Greek letter mu.
        "us" | "\u{00b5}s" | "\u{03bc}s" => Duration::from_micros(1),
        "ms" => Duration::from_millis(1),
        "s" => Duration::from_secs(1),
        "m" => MINUTE,
        "h" => MINUTE * 60,
        "d" => MINUTE * 60 * 24,
        _ => return Err(ParseError::InvalidUnit),
    })
}

/// Multiplies a unit by a parsed value, exactly when the value is integral.
fn scale(value: f64, unit: Duration) -> Result<Duration, ParseError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ParseError::Overflow);
    }
    if value.fract() == 0.0 && value < u64::MAX as f64 {
        let nanos = unit
            .as_nanos()
            .checked_mul(value as u128)
            .ok_or(ParseError::Overflow)?;
        let secs = u64::try_from(nanos / NANOS_PER_SEC).map_err(|_| ParseError::Overflow)?;
        return Ok(Duration::new(secs, (nanos % NANOS_PER_SEC) as u32));
    }
    Duration::try_from_secs_f64(unit.as_secs_f64() * value).map_err(|_| ParseError::Overflow)
}

impl Serialize for K8sDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for K8sDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;
        impl de::Visitor<'_> for Visitor {
            type Value = K8sDuration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a duration such as `90s`, `1h30m` or `30d`")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value.parse::<K8sDuration>().map_err(de::Error::custom)
            }
        }
        deserializer.deserialize_str(Visitor)
    }
}
