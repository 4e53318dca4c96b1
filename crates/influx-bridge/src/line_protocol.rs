// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB v2 Line Protocol encoding.
//!
//! Line Protocol format:
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ns
//! ```
//!
//! Tags and fields are written in the order the point carries them (mapping
//! order), so the same point always encodes to the same line.
//!
//! See: <https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/>

use crate::point::{FieldValue, Point};
use thiserror::Error;

/// Line Protocol encoding errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineProtocolError {
    #[error("point for measurement '{0}' has no fields")]
    NoFields(String),

    #[error("measurement name is empty")]
    EmptyMeasurement,

    #[error("{what} '{text}' contains a line break")]
    LineBreak { what: &'static str, text: String },

    #[error("{what} '{text}' has a backslash before a delimiter")]
    DanglingBackslash { what: &'static str, text: String },
}

impl FieldValue {
    /// Format this value for InfluxDB Line Protocol.
    ///
    /// - Float: written as-is (e.g., `3.14`)
    /// - Integer: suffixed with `i` (e.g., `42i`)
    /// - String: quoted with double quotes, inner quotes escaped (e.g., `"hello"`)
    /// - Boolean: `true` or `false`
    pub fn to_line_protocol(&self) -> String {
        match self {
            FieldValue::Float(v) => format!("{}", v),
            FieldValue::Integer(v) => format!("{}i", v),
            FieldValue::String(v) => {
                let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\"", escaped)
            }
            FieldValue::Boolean(v) => v.to_string(),
        }
    }
}

/// Encode one point as a single Line Protocol line (no trailing newline).
///
/// Tags with an empty value are skipped; the store does not accept them.
/// Names and tag values that would split the line or swallow a delimiter
/// are rejected instead of escaped.
pub fn encode(point: &Point) -> Result<String, LineProtocolError> {
    if point.measurement.is_empty() {
        return Err(LineProtocolError::EmptyMeasurement);
    }
    if point.fields.is_empty() {
        return Err(LineProtocolError::NoFields(point.measurement.clone()));
    }
    check("measurement", &point.measurement, MEASUREMENT_SPECIALS)?;
    for (key, value) in &point.tags {
        check("tag key", key, KEY_SPECIALS)?;
        check("tag value", value, KEY_SPECIALS)?;
    }
    for (key, _) in &point.fields {
        check("field key", key, KEY_SPECIALS)?;
    }

    let mut line = escape_measurement(&point.measurement);

    for (key, value) in &point.tags {
        if value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }

    line.push(' ');

    for (i, (key, value)) in point.fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&value.to_line_protocol());
    }

    line.push(' ');
    line.push_str(&point.timestamp_ns().to_string());

    Ok(line)
}

const MEASUREMENT_SPECIALS: &[char] = &[',', ' '];
const KEY_SPECIALS: &[char] = &[',', '=', ' '];

/// Line breaks end a record. A backslash at the end of a token, or in front
/// of a character the encoder escapes, would escape the escape or the
/// delimiter that follows it.
fn check(what: &'static str, text: &str, specials: &[char]) -> Result<(), LineProtocolError> {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' | '\r' => {
                return Err(LineProtocolError::LineBreak {
                    what,
                    text: text.to_string(),
                })
            }
            '\\' if chars.peek().map_or(true, |next| specials.contains(next)) => {
                return Err(LineProtocolError::DanglingBackslash {
                    what,
                    text: text.to_string(),
                })
            }
            _ => {}
        }
    }
    Ok(())
}

/// Escape measurement name per Line Protocol spec.
/// Spaces and commas must be escaped with backslash.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escape tag keys, tag values and field keys.
/// Commas, equals signs, and spaces must be escaped.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(ns: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_nanos(ns)
    }

    #[test]
    fn test_field_value_formats() {
        assert_eq!(FieldValue::Float(3.15).to_line_protocol(), "3.15");
        assert_eq!(FieldValue::Integer(42).to_line_protocol(), "42i");
        assert_eq!(
            FieldValue::String("say \"hi\"".to_string()).to_line_protocol(),
            "\"say \\\"hi\\\"\""
        );
        assert_eq!(FieldValue::Boolean(true).to_line_protocol(), "true");
        assert_eq!(FieldValue::Boolean(false).to_line_protocol(), "false");
    }

    #[test]
    fn test_encode_keeps_mapping_order() {
        let point = Point::with_timestamp("weather", at(2_000_000_000))
            .tag("station", "north")
            .tag("area", "coast")
            .field("temp", FieldValue::Float(22.1))
            .field("humidity", FieldValue::Integer(65))
            .field("ok", FieldValue::Boolean(true));

        assert_eq!(
            encode(&point).expect("encode"),
            "weather,station=north,area=coast temp=22.1,humidity=65i,ok=true 2000000000"
        );
    }

    #[test]
    fn test_encode_skips_empty_tag_values() {
        let point = Point::with_timestamp("m", at(1))
            .tag("empty", "")
            .tag("host", "a")
            .field("v", FieldValue::Integer(1));

        assert_eq!(encode(&point).expect("encode"), "m,host=a v=1i 1");
    }

    #[test]
    fn test_encode_escape_special_chars() {
        let point = Point::with_timestamp("my measurement", at(3_000_000_000))
            .tag("tag key", "tag,value")
            .field("field=key", FieldValue::String("hello \"world\"".to_string()));

        assert_eq!(
            encode(&point).expect("encode"),
            "my\\ measurement,tag\\ key=tag\\,value field\\=key=\"hello \\\"world\\\"\" 3000000000"
        );
    }

    #[test]
    fn test_encode_rejects_point_without_fields() {
        let point = Point::with_timestamp("m", at(1)).tag("a", "b");
        assert_eq!(
            encode(&point),
            Err(LineProtocolError::NoFields("m".to_string()))
        );
    }

    #[test]
    fn test_encode_rejects_line_breaks() {
        let point = Point::with_timestamp("m", at(1))
            .tag("loc", "lab\nevil,host=x v=0i 0")
            .field("v", FieldValue::Integer(1));
        assert!(matches!(
            encode(&point),
            Err(LineProtocolError::LineBreak { what: "tag value", .. })
        ));

        let point = Point::with_timestamp("m\r", at(1)).field("v", FieldValue::Integer(1));
        assert!(matches!(
            encode(&point),
            Err(LineProtocolError::LineBreak { what: "measurement", .. })
        ));

        let point = Point::with_timestamp("m", at(1)).field("a\nb", FieldValue::Integer(1));
        assert!(matches!(
            encode(&point),
            Err(LineProtocolError::LineBreak { what: "field key", .. })
        ));
    }

    #[test]
    fn test_encode_keeps_line_breaks_inside_string_fields() {
        let point = Point::with_timestamp("m", at(1))
            .field("note", FieldValue::String("two\nlines".to_string()));
        assert_eq!(encode(&point).expect("encode"), "m note=\"two\nlines\" 1");
    }

    #[test]
    fn test_encode_rejects_backslash_before_delimiter() {
        let trailing = Point::with_timestamp("m", at(1))
            .tag("loc", "srv\\")
            .field("v", FieldValue::Integer(1));
        assert_eq!(
            encode(&trailing),
            Err(LineProtocolError::DanglingBackslash {
                what: "tag value",
                text: "srv\\".to_string(),
            })
        );

        let before_space = Point::with_timestamp("m", at(1))
            .field("a\\ b", FieldValue::Integer(1));
        assert!(matches!(
            encode(&before_space),
            Err(LineProtocolError::DanglingBackslash { what: "field key", .. })
        ));

        let inner = Point::with_timestamp("m", at(1))
            .tag("path", "C:\\data")
            .field("v", FieldValue::Integer(1));
        assert_eq!(encode(&inner).expect("encode"), "m,path=C:\\data v=1i 1");
    }
}
