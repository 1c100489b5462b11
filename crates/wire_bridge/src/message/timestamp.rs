//! Wire encoding for message timestamps.
//!
//! Timestamps are written as RFC 3339 strings with millisecond precision.
//! Reading also accepts the legacy epoch-milliseconds number form.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de, Deserialize, Deserializer, Serializer};

/// Formats a timestamp the way it appears on the wire.
pub fn format(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an RFC 3339 timestamp string.
pub fn parse_iso(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Converts a legacy epoch-milliseconds number.
pub fn from_epoch_millis(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() || millis < 0.0 || millis.fract() != 0.0 {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64)
}

pub fn serialize<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(timestamp))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Text(String),
        Integer(u64),
        Float(f64),
    }

    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Text(text) => parse_iso(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid ISO-8601 timestamp: {text}"))),
        RawTimestamp::Integer(millis) => from_epoch_millis(millis as f64)
            .ok_or_else(|| de::Error::custom(format!("invalid epoch timestamp: {millis}"))),
        RawTimestamp::Float(millis) => from_epoch_millis(millis)
            .ok_or_else(|| de::Error::custom(format!("invalid epoch timestamp: {millis}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uses_millis_and_z() {
        let ts = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(format(&ts), "2023-11-14T22:13:20.123Z");
        assert_eq!(parse_iso("2023-11-14T22:13:20.123Z"), Some(ts));
    }

    #[test]
    fn test_epoch_millis() {
        let ts = from_epoch_millis(1_700_000_000_123.0).unwrap();
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_123);
        assert!(from_epoch_millis(-5.0).is_none());
        assert!(from_epoch_millis(1.5).is_none());
        assert!(from_epoch_millis(f64::NAN).is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_iso("yesterday").is_none());
        assert!(parse_iso("2023-13-40T00:00:00Z").is_none());
    }
}
