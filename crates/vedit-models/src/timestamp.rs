//! Timestamp parsing for edit requests.
//!
//! Clients may send times either as a number of seconds or as a string in
//! one of the `HH:MM:SS`, `HH:MM:SS.mmm`, `MM:SS` or `SS` forms.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use thiserror::Error;

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use HH:MM:SS, HH:MM:SS.mmm, MM:SS, or SS")]
    InvalidFormat(String),
}

/// Parse a timestamp string to total seconds.
///
/// # Examples
/// ```
/// use vedit_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("90").unwrap(), 90.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [s] => (0.0, 0.0, component("seconds", s)?),
        [m, s] => (0.0, component("minutes", m)?, component("seconds", s)?),
        [h, m, s] => (
            component("hours", h)?,
            component("minutes", m)?,
            component("seconds", s)?,
        ),
        _ => return Err(TimestampError::InvalidFormat(ts.to_string())),
    };

    Ok(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn component(name: &'static str, raw: &str) -> Result<f64, TimestampError> {
    let value: f64 = raw
        .parse()
        .map_err(|_| TimestampError::InvalidValue(name, raw.to_string()))?;
    if !value.is_finite() {
        return Err(TimestampError::InvalidValue(name, raw.to_string()));
    }
    if value < 0.0 {
        return Err(TimestampError::Negative);
    }
    Ok(value)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SecondsRepr {
    Number(f64),
    Text(String),
}

/// Serde helper: accept seconds as a number or as a timestamp string.
///
/// ```ignore
/// #[serde(deserialize_with = "vedit_models::timestamp::deserialize_seconds")]
/// start_time: f64,
/// ```
pub fn deserialize_seconds<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match SecondsRepr::deserialize(deserializer)? {
        SecondsRepr::Number(n) if n.is_finite() && n >= 0.0 => Ok(n),
        SecondsRepr::Number(_) => Err(de::Error::custom(TimestampError::Negative)),
        SecondsRepr::Text(s) => parse_timestamp(&s).map_err(de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_hh_mm_ss() {
        assert_eq!(parse_timestamp("00:00:00").unwrap(), 0.0);
        assert_eq!(parse_timestamp("01:00:00").unwrap(), 3600.0);
        assert_eq!(parse_timestamp("01:30:45").unwrap(), 5445.0);
    }

    #[test]
    fn test_parse_timestamp_short_forms() {
        assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
        assert_eq!(parse_timestamp("90").unwrap(), 90.0);
        assert!((parse_timestamp("00:00:30.500").unwrap() - 30.5).abs() < 0.001);
    }

    #[test]
    fn test_parse_timestamp_errors() {
        assert_eq!(parse_timestamp("  "), Err(TimestampError::Empty));
        assert_eq!(parse_timestamp("-5"), Err(TimestampError::Negative));
        assert!(matches!(parse_timestamp("abc"), Err(TimestampError::InvalidValue(_, _))));
        assert!(matches!(parse_timestamp("inf"), Err(TimestampError::InvalidValue(_, _))));
        assert!(matches!(parse_timestamp("1:2:3:4"), Err(TimestampError::InvalidFormat(_))));
    }

    #[derive(Deserialize)]
    struct Payload {
        #[serde(deserialize_with = "deserialize_seconds")]
        at: f64,
    }

    #[test]
    fn test_deserialize_seconds_accepts_number_and_string() {
        let p: Payload = serde_json::from_str(r#"{"at": 12.5}"#).unwrap();
        assert_eq!(p.at, 12.5);

        let p: Payload = serde_json::from_str(r#"{"at": "00:01:05"}"#).unwrap();
        assert_eq!(p.at, 65.0);

        assert!(serde_json::from_str::<Payload>(r#"{"at": -1}"#).is_err());
        assert!(serde_json::from_str::<Payload>(r#"{"at": "soon"}"#).is_err());
    }
}
