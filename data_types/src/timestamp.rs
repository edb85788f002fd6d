//! RFC3339 ↔ epoch-second conversions.
//!
//! The database boundary delivers timestamps either as RFC3339 strings or as
//! integers depending on the requested epoch; everything inside this
//! workspace works in whole epoch seconds and converts back to RFC3339 only
//! when rendering query text.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use snafu::Snafu;

/// A timestamp that does not parse or does not fit in epoch seconds.
#[derive(Debug, Snafu)]
#[allow(missing_copy_implementations, missing_docs)]
pub enum InvalidTimestamp {
    #[snafu(display("invalid RFC3339 timestamp {:?}: {}", text, source))]
    Unparseable {
        text: String,
        source: chrono::ParseError,
    },

    #[snafu(display("timestamp {} out of representable range", seconds))]
    OutOfRange { seconds: i64 },
}

/// Parse an RFC3339 timestamp (`2019-08-18T00:00:00Z`) to epoch seconds.
pub fn parse_rfc3339(text: &str) -> Result<i64, InvalidTimestamp> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.timestamp())
        .map_err(|source| InvalidTimestamp::Unparseable {
            text: text.to_string(),
            source,
        })
}

/// Format epoch seconds as the `Z`-suffixed RFC3339 form the query language
/// uses, e.g. `2019-08-18T00:00:00Z`.
pub fn format_rfc3339(seconds: i64) -> Result<String, InvalidTimestamp> {
    let naive = NaiveDateTime::from_timestamp_opt(seconds, 0)
        .ok_or(InvalidTimestamp::OutOfRange { seconds })?;
    let utc = DateTime::<Utc>::from_utc(naive, Utc);
    Ok(utc.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format_round_trip() {
        let secs = parse_rfc3339("2022-01-01T00:00:20Z").unwrap();
        assert_eq!(secs, 1640995220);
        assert_eq!(format_rfc3339(secs).unwrap(), "2022-01-01T00:00:20Z");
    }

    #[test]
    fn offset_timestamps_normalize_to_utc() {
        let secs = parse_rfc3339("2022-01-01T02:00:00+02:00").unwrap();
        assert_eq!(format_rfc3339(secs).unwrap(), "2022-01-01T00:00:00Z");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_rfc3339("yesterday").is_err());
        assert!(format_rfc3339(i64::MAX).is_err());
    }
}
