// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event record to time-series point conversion.
//!
//! Tags are always strings. Fields are coerced to the type declared for
//! their source key; undeclared keys are written as strings.

use crate::mapping::{MappingError, MappingTable};
use crate::value::{AttributeType, Record, Scalar, TypeDictionary};
use chrono::{DateTime, Utc};
use std::fmt;

/// A value that can be stored in an InfluxDB field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit floating point.
    Float(f64),
    /// 64-bit signed integer.
    Integer(i64),
    /// UTF-8 string.
    String(String),
    /// Boolean value.
    Boolean(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::String(v) => f.write_str(v),
            FieldValue::Boolean(v) => write!(f, "{}", v),
        }
    }
}

/// A single time-series point.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub timestamp: DateTime<Utc>,
    /// Tag set in mapping order.
    pub tags: Vec<(String, String)>,
    /// Field set in mapping order.
    pub fields: Vec<(String, FieldValue)>,
}

impl Point {
    /// Start an empty point stamped with the current instant.
    pub fn new(measurement: impl Into<String>) -> Self {
        Self::with_timestamp(measurement, Utc::now())
    }

    pub fn with_timestamp(measurement: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            timestamp,
            tags: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((name.into(), value.into()));
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    /// Tag value by name.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Field value by name.
    pub fn field_value(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Nanoseconds since the Unix epoch. Saturates outside the representable
    /// range (years 1677..2262).
    pub fn timestamp_ns(&self) -> i64 {
        self.timestamp.timestamp_nanos_opt().unwrap_or(if self.timestamp.timestamp() < 0 {
            i64::MIN
        } else {
            i64::MAX
        })
    }
}

/// Builds points from event records using tag and field mapping tables.
pub struct PointBuilder<'a> {
    tags: &'a MappingTable,
    fields: &'a MappingTable,
    types: &'a TypeDictionary,
}

impl<'a> PointBuilder<'a> {
    pub fn new(tags: &'a MappingTable, fields: &'a MappingTable, types: &'a TypeDictionary) -> Self {
        Self {
            tags,
            fields,
            types,
        }
    }

    /// Build one point for `measurement` from `record`.
    ///
    /// `index` is the record's position in its batch and is only used to
    /// label errors. The timestamp is taken now; the payload never supplies
    /// it.
    pub fn build(
        &self,
        measurement: &str,
        record: &Record,
        index: usize,
    ) -> Result<Point, MappingError> {
        if self.fields.is_empty() {
            return Err(MappingError::NoFields { index });
        }

        let mut point = Point::new(measurement);

        for entry in self.tags {
            let value = lookup(record, &entry.source_key, index)?;
            point.tags.push((entry.target_name.clone(), value.to_string()));
        }

        for entry in self.fields {
            let value = lookup(record, &entry.source_key, index)?;
            let expected = self.types.type_of(&entry.source_key);
            let field = coerce(value, expected).ok_or_else(|| MappingError::TypeCoercion {
                key: entry.source_key.clone(),
                target: entry.target_name.clone(),
                expected,
                value: value.to_string(),
                index,
            })?;
            point.fields.push((entry.target_name.clone(), field));
        }

        tracing::trace!(
            measurement,
            index,
            tags = point.tags.len(),
            fields = point.fields.len(),
            "built point"
        );
        Ok(point)
    }
}

fn lookup<'r>(record: &'r Record, key: &str, index: usize) -> Result<&'r Scalar, MappingError> {
    record.lookup(key).ok_or_else(|| MappingError::MissingKey {
        key: key.to_string(),
        index,
    })
}

/// Coerce a scalar to the declared attribute type.
///
/// Returns `None` when the value cannot be represented as that type.
/// String (and anything undeclared) never fails.
pub fn coerce(value: &Scalar, expected: AttributeType) -> Option<FieldValue> {
    match expected {
        AttributeType::Long => match value {
            Scalar::Integer(i) => Some(FieldValue::Integer(*i)),
            other => other.to_string().trim().parse::<i64>().ok().map(FieldValue::Integer),
        },
        AttributeType::Int => match value {
            Scalar::Integer(i) => i32::try_from(*i).ok().map(|v| FieldValue::Integer(v.into())),
            other => other
                .to_string()
                .trim()
                .parse::<i32>()
                .ok()
                .map(|v| FieldValue::Integer(v.into())),
        },
        AttributeType::Double => {
            let parsed = match value {
                Scalar::Float(v) => Some(*v),
                Scalar::Integer(i) => Some(*i as f64),
                other => other.to_string().trim().parse::<f64>().ok(),
            };
            parsed.filter(|v| v.is_finite()).map(FieldValue::Float)
        }
        AttributeType::Boolean => match value {
            Scalar::Boolean(b) => Some(FieldValue::Boolean(*b)),
            other => {
                let text = other.to_string();
                let text = text.trim();
                if text.eq_ignore_ascii_case("true") {
                    Some(FieldValue::Boolean(true))
                } else if text.eq_ignore_ascii_case("false") {
                    Some(FieldValue::Boolean(false))
                } else {
                    None
                }
            }
        },
        AttributeType::String => Some(FieldValue::String(value.to_string())),
    }
}
