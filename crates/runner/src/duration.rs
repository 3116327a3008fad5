//! Parsing of duration strings such as `500ms`, `10s` or `1h2m3.5s`.

use std::time::Duration;

const UNITS: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("us", 1e3),
    ("µs", 1e3),
    ("μs", 1e3),
    ("ms", 1e6),
    ("s", 1e9),
    ("m", 60e9),
    ("h", 3_600e9),
];

/// A parsed duration that may be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedDuration {
    /// Whether the text had a leading `-`
    pub negative: bool,
    /// Magnitude
    pub magnitude: Duration,
}

/// Parse a sequence of `<number><unit>` terms with an optional sign.
///
/// A bare `0` is accepted without a unit.
///
/// # Errors
///
/// Returns a description of the first invalid part of `text`.
pub fn parse_duration(text: &str) -> Result<SignedDuration, String> {
    let text = text.trim();
    let (negative, mut rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    if rest == "0" {
        return Ok(SignedDuration {
            negative,
            magnitude: Duration::ZERO,
        });
    }
    if rest.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut nanos = 0.0_f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_len];
        if number.is_empty() || number == "." {
            return Err(format!("expected a number at '{rest}'"));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid number '{number}'"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        let scale = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| {
                if unit.is_empty() {
                    format!("missing unit after '{number}'")
                } else {
                    format!("unknown unit '{unit}'")
                }
            })?;
        nanos += value * scale;
        rest = &rest[unit_len..];
    }

    if !nanos.is_finite() || nanos > u64::MAX as f64 {
        return Err("duration out of range".to_string());
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let magnitude = Duration::from_nanos(nanos.round() as u64);
    Ok(SignedDuration { negative, magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Duration {
        parse_duration(text).unwrap().magnitude
    }

    #[test]
    fn test_single_units() {
        assert_eq!(parse("300ms"), Duration::from_millis(300));
        assert_eq!(parse("10s"), Duration::from_secs(10));
        assert_eq!(parse("2m"), Duration::from_secs(120));
        assert_eq!(parse("1h"), Duration::from_secs(3600));
        assert_eq!(parse("5us"), Duration::from_micros(5));
        assert_eq!(parse("5µs"), Duration::from_micros(5));
        assert_eq!(parse("7ns"), Duration::from_nanos(7));
    }

    #[test]
    fn test_compound_and_fractional() {
        assert_eq!(parse("1m30s"), Duration::from_secs(90));
        assert_eq!(parse("1.5s"), Duration::from_millis(1500));
        assert_eq!(parse("1h2m3s4ms"), Duration::from_millis(3_723_004));
    }

    #[test]
    fn test_sign_and_zero() {
        assert_eq!(parse("0"), Duration::ZERO);
        let negative = parse_duration("-5s").unwrap();
        assert!(negative.negative);
        assert_eq!(negative.magnitude, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("10 s").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("s").is_err());
    }
}
