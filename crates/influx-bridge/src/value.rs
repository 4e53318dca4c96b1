// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Generic record model crossing the host boundary.
//!
//! A [`Record`] is an insertion-ordered map from string keys to [`Scalar`]
//! values. Looking up a key distinguishes a missing key (`None`) from a key
//! that is present with a null value (`Some(Scalar::Null)`).

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A dynamically typed scalar value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    /// UTF-8 string.
    String(String),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit floating point.
    Float(f64),
    /// Boolean value.
    Boolean(bool),
    /// Present but empty.
    Null,
}

impl Scalar {
    /// Borrow the inner string, if this is a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for [`Scalar::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Convert a JSON value into a scalar.
    ///
    /// Arrays and objects are not scalars; they are kept as their JSON text
    /// so that a mapping can still carry them as strings.
    pub fn from_json(val: serde_json::Value) -> Self {
        match val {
            serde_json::Value::String(s) => Scalar::String(s),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Scalar::Integer(i)
                } else {
                    n.as_f64().map_or(Scalar::Null, Scalar::Float)
                }
            }
            serde_json::Value::Bool(b) => Scalar::Boolean(b),
            serde_json::Value::Null => Scalar::Null,
            other => Scalar::String(other.to_string()),
        }
    }
}

/// Stringified form used for tags and for typed field coercion.
///
/// Null renders as the empty string.
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::String(s) => f.write_str(s),
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Boolean(b) => write!(f, "{}", b),
            Scalar::Null => Ok(()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Integer(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Boolean(v)
    }
}

/// Ordered key to scalar mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    entries: IndexMap<String, Scalar>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key. `None` means the key is absent.
    pub fn lookup(&self, key: &str) -> Option<&Scalar> {
        self.entries.get(key)
    }

    /// Insert or replace a value, keeping the original position of an
    /// existing key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Scalar>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns true if the key is present (even with a null value).
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a record from a JSON object. Non-object values yield `None`.
    pub fn from_json(val: serde_json::Value) -> Option<Self> {
        match val {
            serde_json::Value::Object(map) => Some(
                map.into_iter()
                    .map(|(k, v)| (k, Scalar::from_json(v)))
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl FromIterator<(String, Scalar)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Scalar)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = IndexMap::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .map(|(k, v)| (k, Scalar::from_json(v)))
            .collect())
    }
}

/// Declared type of an upstream attribute.
///
/// Drives field coercion only; tags are always strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AttributeType {
    #[default]
    String,
    Long,
    Double,
    Boolean,
    Int,
}

impl AttributeType {
    /// Parse a host type name, case-insensitively. Unknown names are
    /// treated as strings.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "long" => AttributeType::Long,
            "double" => AttributeType::Double,
            "boolean" | "bool" => AttributeType::Boolean,
            "int" => AttributeType::Int,
            _ => AttributeType::String,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttributeType::String => "String",
            AttributeType::Long => "Long",
            AttributeType::Double => "Double",
            AttributeType::Boolean => "Boolean",
            AttributeType::Int => "Int",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for AttributeType {
    fn from(s: String) -> Self {
        AttributeType::from_name(&s)
    }
}

impl From<AttributeType> for String {
    fn from(t: AttributeType) -> Self {
        t.as_str().to_string()
    }
}

/// A named, typed attribute as reported by upstream discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: AttributeType,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: AttributeType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Source key to declared type lookup for field coercion.
#[derive(Debug, Clone, Default)]
pub struct TypeDictionary {
    types: HashMap<String, AttributeType>,
}

impl TypeDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the dictionary from discovered attributes. Later duplicates win.
    pub fn from_attributes(attributes: &[Attribute]) -> Self {
        attributes
            .iter()
            .map(|a| (a.name.clone(), a.kind))
            .collect()
    }

    /// Declared type of a source key; undeclared keys are strings.
    pub fn type_of(&self, key: &str) -> AttributeType {
        self.types.get(key).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl FromIterator<(String, AttributeType)> for TypeDictionary {
    fn from_iter<I: IntoIterator<Item = (String, AttributeType)>>(iter: I) -> Self {
        Self {
            types: iter.into_iter().collect(),
        }
    }
}
