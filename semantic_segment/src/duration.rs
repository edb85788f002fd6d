//! Duration literals as they appear in `GROUP BY time(...)` buckets.

use crate::{Error, Result};

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Parse a duration literal such as `1m`, `90s` or `1h30m` into
/// nanoseconds. Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`, `d`, `w`.
pub fn parse_duration(text: &str) -> Result<i64> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidDuration {
            text: text.to_string(),
        });
    }

    let invalid = || Error::InvalidDuration {
        text: text.to_string(),
    };

    let mut total: i64 = 0;
    let mut rest = text;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        if digits_end == 0 {
            return Err(invalid());
        }
        let number: i64 = rest[..digits_end].parse().map_err(|_| invalid())?;
        rest = &rest[digits_end..];

        let (unit_nanos, unit_len) = if rest.starts_with("ns") {
            (1, 2)
        } else if rest.starts_with("us") {
            (NANOS_PER_MICRO, 2)
        } else if rest.starts_with("µs") {
            (NANOS_PER_MICRO, "µs".len())
        } else if rest.starts_with("ms") {
            (NANOS_PER_MILLI, 2)
        } else if rest.starts_with('s') {
            (NANOS_PER_SEC, 1)
        } else if rest.starts_with('m') {
            (60 * NANOS_PER_SEC, 1)
        } else if rest.starts_with('h') {
            (3600 * NANOS_PER_SEC, 1)
        } else if rest.starts_with('d') {
            (24 * 3600 * NANOS_PER_SEC, 1)
        } else if rest.starts_with('w') {
            (7 * 24 * 3600 * NANOS_PER_SEC, 1)
        } else {
            return Err(invalid());
        };

        total = total
            .checked_add(number.checked_mul(unit_nanos).ok_or_else(invalid)?)
            .ok_or_else(invalid)?;
        rest = &rest[unit_len..];
    }

    Ok(total)
}

/// Format nanoseconds back into the shortest `h`/`m`/`s` (or sub-second)
/// spelling, dropping zero-valued components: `720s` → `12m`, `5400s` →
/// `1h30m`, `90s` → `1m30s`.
pub fn format_duration(nanos: i64) -> String {
    if nanos <= 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    let secs = nanos / NANOS_PER_SEC;
    let sub = nanos % NANOS_PER_SEC;

    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 {
        out.push_str(&format!("{}s", seconds));
    }

    if sub > 0 {
        let millis = sub / NANOS_PER_MILLI;
        let micros = (sub % NANOS_PER_MILLI) / NANOS_PER_MICRO;
        let ns = sub % NANOS_PER_MICRO;
        if millis > 0 {
            out.push_str(&format!("{}ms", millis));
        }
        if micros > 0 {
            out.push_str(&format!("{}us", micros));
        }
        if ns > 0 {
            out.push_str(&format!("{}ns", ns));
        }
    }

    out
}
