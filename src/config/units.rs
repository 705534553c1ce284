//! Parsing of size, rate, and duration settings.
//!
//! Sizes accept a decimal number with an optional single-letter suffix from
//! `b k m g t p` (case-insensitive, powers of 1024): `"512"`, `"1.5M"`, `"2g"`.
//! Rates and durations accept either a single value or an `"A-B"` range,
//! sampled uniformly on every call.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

const SIZE_SUFFIXES: &str = "bkmgtp";

/// A config value that may be written as a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumOrText {
    /// Plain JSON number.
    Number(f64),
    /// String form, possibly with suffixes or a range.
    Text(String),
}

impl NumOrText {
    /// Returns the value as it would have been written as a string.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(n) if n.fract() == 0.0 => format!("{n:.0}"),
            Self::Number(n) => n.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

/// Parses a byte size such as `"1.5M"`.
///
/// Returns `None` for empty, negative, or malformed values.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn parse_bytes(value: &str) -> Option<u64> {
    let value = value.trim();
    let last = value.chars().last()?.to_ascii_lowercase();

    let (number, multiplier) = match SIZE_SUFFIXES.find(last) {
        Some(index) => (&value[..value.len() - 1], 1024_u64.pow(index as u32)),
        None => (value, 1),
    };

    let parsed: f64 = number.trim().parse().ok()?;
    if !parsed.is_finite() || parsed < 0.0 {
        return None;
    }
    Some((parsed * multiplier as f64).round() as u64)
}

/// Bytes-per-second cap, fixed or sampled from a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSpec {
    min: u64,
    max: u64,
}

impl RateSpec {
    /// Parses `"S"` or `"A-B"`; returns `None` when the upper bound is zero
    /// or either bound is malformed.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let (lower, upper) = match value.split_once('-') {
            Some((lower, upper)) if !upper.trim().is_empty() => (lower, upper),
            _ => (value, value),
        };
        let lower = parse_bytes(lower)?;
        let upper = parse_bytes(upper)?;
        if upper == 0 {
            return None;
        }
        Some(Self {
            min: lower.min(upper),
            max: upper.max(lower),
        })
    }

    /// A fixed rate.
    #[must_use]
    pub fn fixed(bytes_per_second: u64) -> Self {
        Self {
            min: bytes_per_second,
            max: bytes_per_second,
        }
    }

    /// Upper bound of the rate.
    #[must_use]
    pub fn max(&self) -> u64 {
        self.max
    }

    /// Picks the rate for one transfer.
    #[must_use]
    pub fn sample(&self) -> u64 {
        if self.min == self.max {
            self.max
        } else {
            rand::thread_rng().gen_range(self.min..=self.max)
        }
    }
}

/// A sleep duration, fixed or sampled from a range of seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationSpec {
    min: f64,
    max: f64,
}

impl DurationSpec {
    /// Parses `"N"` or `"A-B"` (seconds, fractional allowed).
    ///
    /// Returns `None` for malformed values, for a zero upper bound, and for
    /// bounds too large for a [`Duration`].
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (lower, upper) = match value.split_once('-') {
            Some((lower, upper)) if !lower.trim().is_empty() => (lower, Some(upper)),
            _ => (value, None),
        };
        let lower: f64 = lower.trim().parse().ok()?;
        let upper: f64 = match upper {
            Some(upper) => upper.trim().parse().ok()?,
            None => lower,
        };
        if !lower.is_finite() || upper <= 0.0 || Duration::try_from_secs_f64(upper).is_err() {
            return None;
        }
        Some(Self {
            min: lower.max(0.0),
            max: upper.max(lower.max(0.0)),
        })
    }

    /// A fixed duration in seconds.
    #[must_use]
    pub fn fixed(seconds: f64) -> Self {
        let seconds = seconds.max(0.0);
        Self {
            min: seconds,
            max: seconds,
        }
    }

    /// Picks one duration.
    #[must_use]
    pub fn sample(&self) -> Duration {
        let seconds = if (self.max - self.min).abs() < f64::EPSILON {
            self.max
        } else {
            rand::thread_rng().gen_range(self.min..=self.max)
        };
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bytes_plain_and_suffixed() {
        assert_eq!(parse_bytes("512"), Some(512));
        assert_eq!(parse_bytes("512b"), Some(512));
        assert_eq!(parse_bytes("1k"), Some(1024));
        assert_eq!(parse_bytes("1.5M"), Some(1_572_864));
        assert_eq!(parse_bytes("2G"), Some(2 * 1024 * 1024 * 1024));
    }

    #[test]
    fn test_parse_bytes_rejects_garbage() {
        assert_eq!(parse_bytes(""), None);
        assert_eq!(parse_bytes("abc"), None);
        assert_eq!(parse_bytes("-5k"), None);
        assert_eq!(parse_bytes("k"), None);
    }

    #[test]
    fn test_rate_spec_single_value() {
        let rate = RateSpec::parse("500k").unwrap();
        assert_eq!(rate.max(), 512_000);
        assert_eq!(rate.sample(), 512_000);
    }

    #[test]
    fn test_rate_spec_range_samples_within_bounds() {
        let rate = RateSpec::parse("1k-2k").unwrap();
        assert_eq!(rate.max(), 2048);
        for _ in 0..50 {
            let sampled = rate.sample();
            assert!((1024..=2048).contains(&sampled), "out of range: {sampled}");
        }
    }

    #[test]
    fn test_rate_spec_invalid_is_none() {
        assert_eq!(RateSpec::parse("fast"), None);
        assert_eq!(RateSpec::parse("0"), None);
    }

    #[test]
    fn test_duration_spec_fixed_and_range() {
        let fixed = DurationSpec::parse("2.5").unwrap();
        assert_eq!(fixed.sample(), Duration::from_millis(2500));

        let range = DurationSpec::parse("1-3").unwrap();
        for _ in 0..50 {
            let sampled = range.sample();
            assert!(sampled >= Duration::from_secs(1) && sampled <= Duration::from_secs(3));
        }
    }

    #[test]
    fn test_duration_spec_invalid_is_none() {
        assert_eq!(DurationSpec::parse("soon"), None);
        assert_eq!(DurationSpec::parse("0"), None);
        assert_eq!(DurationSpec::parse("1e300"), None);
        assert_eq!(DurationSpec::parse("1-inf"), None);
    }

    #[test]
    fn test_num_or_text_as_text() {
        assert_eq!(NumOrText::Number(32768.0).as_text(), "32768");
        assert_eq!(NumOrText::Number(1.5).as_text(), "1.5");
        assert_eq!(NumOrText::Text("2M".into()).as_text(), "2M");
    }
}
