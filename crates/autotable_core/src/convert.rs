//! Value coercions, timestamp ticks and string normalisation.

use autotable_storage::Value;
use chrono::{DateTime, NaiveDateTime};
use thiserror::Error;

/// Ticks per second (one tick is 100 ns).
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Tick count of 1970-01-01T00:00:00, counted from 0001-01-01T00:00:00.
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// A column value could not be turned into the field's type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, found {found}")]
pub struct CoercionError {
    /// Type the field wanted.
    pub expected: &'static str,
    /// What the column held.
    pub found: String,
}

impl CoercionError {
    pub(crate) fn new(expected: &'static str, value: &Value) -> Self {
        Self {
            expected,
            found: format!("{} {value}", value.type_name()),
        }
    }
}

/// Converts a timestamp into ticks since 0001-01-01.
///
/// # Errors
///
/// Returns a [`CoercionError`] when the tick count does not fit an `i64`,
/// roughly outside the years -27256 to 29228.
pub fn to_ticks(timestamp: NaiveDateTime) -> Result<i64, CoercionError> {
    let utc = timestamp.and_utc();
    utc.timestamp()
        .checked_mul(TICKS_PER_SECOND)
        .and_then(|t| t.checked_add(i64::from(utc.timestamp_subsec_nanos() / 100)))
        .and_then(|t| t.checked_add(UNIX_EPOCH_TICKS))
        .ok_or_else(|| CoercionError {
            expected: "timestamp within the tick range",
            found: timestamp.to_string(),
        })
}

/// Reconstructs a timestamp from ticks. Returns `None` when out of range.
pub fn from_ticks(ticks: i64) -> Option<NaiveDateTime> {
    let since_epoch = ticks.checked_sub(UNIX_EPOCH_TICKS)?;
    let secs = since_epoch.div_euclid(TICKS_PER_SECOND);
    let nanos = u32::try_from(since_epoch.rem_euclid(TICKS_PER_SECOND) * 100).ok()?;
    DateTime::from_timestamp(secs, nanos).map(|dt| dt.naive_utc())
}

/// Trims a string and decodes HTML character references.
///
/// Applied to every string field before it is written.
pub fn normalize_text(raw: &str) -> String {
    html_decode(raw.trim())
}

/// Decodes named (`&amp;`, `&lt;`, `&gt;`, `&quot;`, `&apos;`, `&nbsp;`) and
/// numeric (`&#39;`, `&#x27;`) character references. Anything else is kept.
pub fn html_decode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        match candidate.find(';').and_then(|end| {
            decode_entity(&candidate[1..end]).map(|c| (c, end))
        }) {
            Some((c, end)) => {
                out.push(c);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Coerces a column value into an `i32`.
pub fn int_of(value: &Value) -> Result<i32, CoercionError> {
    let wide = match value {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Float(f) if f.is_finite() => Some(f.round() as i64),
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    };
    wide.and_then(|w| i32::try_from(w).ok())
        .ok_or_else(|| CoercionError::new("int", value))
}

/// Coerces a column value into a string.
pub fn text_of(value: &Value) -> Result<String, CoercionError> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        Value::Bytes(b) => {
            String::from_utf8(b.clone()).map_err(|_| CoercionError::new("string", value))
        }
        Value::Int(_) | Value::Float(_) => Ok(value.to_string()),
        _ => Err(CoercionError::new("string", value)),
    }
}

/// Coerces a column value into a `bool`.
///
/// `BIT` columns arrive as bytes from the wire protocol.
pub fn bool_of(value: &Value) -> Result<bool, CoercionError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Int(i) => Ok(*i != 0),
        Value::Float(f) => Ok(*f != 0.0),
        Value::Bytes(b) => Ok(b.iter().any(|byte| *byte != 0)),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            _ => Err(CoercionError::new("bool", value)),
        },
        Value::Null => Err(CoercionError::new("bool", value)),
    }
}

/// Coerces a column value into an `f64`.
pub fn float_of(value: &Value) -> Result<f64, CoercionError> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Int(i) => Ok(*i as f64),
        Value::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| CoercionError::new("float", value)),
        _ => Err(CoercionError::new("float", value)),
    }
}

/// Coerces a tick-count column into a timestamp.
pub fn timestamp_of(value: &Value) -> Result<NaiveDateTime, CoercionError> {
    let ticks = match value {
        Value::Int(i) => Some(*i),
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    };
    ticks
        .and_then(from_ticks)
        .ok_or_else(|| CoercionError::new("timestamp", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    #[test]
    fn epoch_ticks() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(to_ticks(epoch).unwrap(), UNIX_EPOCH_TICKS);
        let first = NaiveDate::from_ymd_opt(1, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(to_ticks(first).unwrap(), 0);
        assert_eq!(from_ticks(0), Some(first));
    }

    #[test]
    fn html_entities() {
        assert_eq!(html_decode("a &amp; b"), "a & b");
        assert_eq!(html_decode("&lt;p&gt;"), "<p>");
        assert_eq!(html_decode("it&#39;s &#x41;"), "it's A");
        assert_eq!(html_decode("AT&T; fish & chips"), "AT&T; fish & chips");
        assert_eq!(html_decode("trailing &"), "trailing &");
    }

    #[test]
    fn normalize_trims_first() {
        assert_eq!(normalize_text("  Tom &amp; Jerry \n"), "Tom & Jerry");
    }

    #[test]
    fn bool_coercions() {
        assert!(bool_of(&Value::Bytes(vec![1])).unwrap());
        assert!(!bool_of(&Value::Bytes(vec![0])).unwrap());
        assert!(bool_of(&Value::Int(1)).unwrap());
        assert!(bool_of(&Value::Null).is_err());
    }

    #[test]
    fn int_coercions() {
        assert_eq!(int_of(&Value::Int(7)).unwrap(), 7);
        assert_eq!(int_of(&Value::from(" 12 ")).unwrap(), 12);
        assert!(int_of(&Value::from("twelve")).is_err());
        assert!(int_of(&Value::Int(i64::MAX)).is_err());
    }

    #[test]
    fn text_coercions() {
        assert_eq!(text_of(&Value::Bytes(b"hi".to_vec())).unwrap(), "hi");
        assert!(text_of(&Value::Bytes(vec![0xff, 0xfe])).is_err());
        assert!(text_of(&Value::Null).is_err());
    }

    #[test]
    fn ticks_outside_i64_are_rejected() {
        assert!(to_ticks(NaiveDateTime::MAX).is_err());
        assert!(to_ticks(NaiveDateTime::MIN).is_err());
    }

    proptest! {
        #[test]
        fn ticks_never_overflow(
            secs in NaiveDateTime::MIN.and_utc().timestamp()..=NaiveDateTime::MAX.and_utc().timestamp(),
            hundreds in 0u32..10_000_000,
        ) {
            let ts = DateTime::from_timestamp(secs, hundreds * 100).unwrap().naive_utc();
            let wide = i128::from(secs) * i128::from(TICKS_PER_SECOND)
                + i128::from(hundreds)
                + i128::from(UNIX_EPOCH_TICKS);
            match to_ticks(ts) {
                Ok(ticks) => {
                    prop_assert_eq!(i128::from(ticks), wide);
                    prop_assert_eq!(from_ticks(ticks), Some(ts));
                }
                Err(_) => prop_assert!(i64::try_from(wide).is_err()),
            }
        }

        #[test]
        fn ticks_round_trip(secs in -62_135_596_800_i64..253_402_300_799, hundreds in 0u32..10_000_000) {
            let ts = DateTime::from_timestamp(secs, hundreds * 100).unwrap().naive_utc();
            prop_assert_eq!(from_ticks(to_ticks(ts).unwrap()), Some(ts));
        }

        #[test]
        fn plain_text_is_only_trimmed(raw in "[ a-zA-Z0-9.,]{0,40}") {
            prop_assert_eq!(normalize_text(&raw), raw.trim());
        }
    }
}
