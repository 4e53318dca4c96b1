// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tag and field mapping tables.
//!
//! A mapping table is the parsed form of a host configuration grid: an
//! ordered list of `(source key, target name)` pairs. Order is preserved so
//! that built points and generated queries are reproducible.

use crate::value::AttributeType;
use indexmap::IndexMap;
use std::collections::HashSet;
use thiserror::Error;

/// Mapping and translation errors.
///
/// Grid errors (`MalformedGrid` through `DuplicateTargetName`) are raised
/// when a table is parsed. The remaining variants are per-event failures
/// raised while building a point. Row numbers are 1-based, record indexes
/// are 0-based positions in the batch.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("malformed mapping grid: {0}")]
    MalformedGrid(String),

    #[error("mapping row {row} has an empty source key")]
    EmptySourceKey { row: usize },

    #[error("mapping row {row} has an empty target name")]
    EmptyTargetName { row: usize },

    #[error("duplicate source key '{key}' in mapping row {row}")]
    DuplicateSourceKey { key: String, row: usize },

    #[error("duplicate target name '{name}' in mapping row {row}")]
    DuplicateTargetName { name: String, row: usize },

    #[error("event {index} has no value for key '{key}'")]
    MissingKey { key: String, index: usize },

    #[error("event {index}: field '{target}' (from '{key}') cannot convert '{value}' to {expected}")]
    TypeCoercion {
        key: String,
        target: String,
        expected: AttributeType,
        value: String,
        index: usize,
    },

    #[error("event {index} produced no fields")]
    NoFields { index: usize },
}

/// Column layout of a configuration grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    /// Column holding the source key.
    pub source_column: &'static str,
    /// Column holding the target name.
    pub target_column: &'static str,
    /// Whether two rows may share a target name.
    pub unique_targets: bool,
}

impl GridLayout {
    /// Writer tag grid: event key in `TagName`, tag name in `TagValue`.
    pub const WRITER_TAGS: GridLayout = GridLayout {
        source_column: "TagName",
        target_column: "TagValue",
        unique_targets: true,
    };

    /// Writer field grid: event key in `FieldKey`, field name in `FieldName`.
    pub const WRITER_FIELDS: GridLayout = GridLayout {
        source_column: "FieldKey",
        target_column: "FieldName",
        unique_targets: true,
    };

    /// Reader tag grid: tag name and the value it must equal. Values may repeat.
    pub const READER_TAGS: GridLayout = GridLayout {
        source_column: "TagName",
        target_column: "TagValue",
        unique_targets: false,
    };

    /// Reader field grid: result column name, emitted under the same name.
    pub const READER_FIELDS: GridLayout = GridLayout {
        source_column: "FieldName",
        target_column: "FieldName",
        unique_targets: true,
    };
}

/// One `(source key, target name)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub source_key: String,
    pub target_name: String,
}

impl MappingEntry {
    pub fn new(source_key: impl Into<String>, target_name: impl Into<String>) -> Self {
        Self {
            source_key: source_key.into(),
            target_name: target_name.into(),
        }
    }
}

/// Ordered, validated mapping table. Immutable once parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    entries: Vec<MappingEntry>,
}

impl MappingTable {
    /// Parse a raw grid value.
    ///
    /// The grid is a JSON (or YAML flow) array of row objects keyed by column
    /// name, e.g. `[{"FieldKey":"temp","FieldName":"temperature"}]`. An empty
    /// or blank value yields an empty table. Numeric and boolean cells are
    /// accepted and stringified.
    pub fn parse(raw: &str, layout: GridLayout) -> Result<Self, MappingError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let rows: Vec<IndexMap<String, serde_yaml::Value>> =
            serde_yaml::from_str(raw).map_err(|e| MappingError::MalformedGrid(e.to_string()))?;

        let mut pairs = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let source = cell(row, layout.source_column, i + 1)?;
            let target = cell(row, layout.target_column, i + 1)?;
            pairs.push((source, target));
        }

        Self::from_pairs(pairs, layout.unique_targets)
    }

    /// Build a table from pairs, applying the same validation as [`parse`].
    ///
    /// [`parse`]: MappingTable::parse
    pub fn from_pairs<S, T>(
        pairs: impl IntoIterator<Item = (S, T)>,
        unique_targets: bool,
    ) -> Result<Self, MappingError>
    where
        S: Into<String>,
        T: Into<String>,
    {
        let mut entries = Vec::new();
        let mut seen_sources = HashSet::new();
        let mut seen_targets = HashSet::new();

        for (i, (source, target)) in pairs.into_iter().enumerate() {
            let row = i + 1;
            let entry = MappingEntry::new(source.into().trim(), target.into().trim());

            if entry.source_key.is_empty() {
                return Err(MappingError::EmptySourceKey { row });
            }
            if entry.target_name.is_empty() {
                return Err(MappingError::EmptyTargetName { row });
            }
            if !seen_sources.insert(entry.source_key.clone()) {
                return Err(MappingError::DuplicateSourceKey {
                    key: entry.source_key,
                    row,
                });
            }
            if unique_targets && !seen_targets.insert(entry.target_name.clone()) {
                return Err(MappingError::DuplicateTargetName {
                    name: entry.target_name,
                    row,
                });
            }

            entries.push(entry);
        }

        Ok(Self { entries })
    }

    /// Entries in configuration order.
    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MappingEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a MappingTable {
    type Item = &'a MappingEntry;
    type IntoIter = std::slice::Iter<'a, MappingEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Read one grid cell as a string. Missing and null cells read as empty so
/// the emptiness checks report them.
fn cell(
    row: &IndexMap<String, serde_yaml::Value>,
    column: &str,
    row_number: usize,
) -> Result<String, MappingError> {
    match row.get(column) {
        None | Some(serde_yaml::Value::Null) => Ok(String::new()),
        Some(serde_yaml::Value::String(s)) => Ok(s.clone()),
        Some(serde_yaml::Value::Number(n)) => Ok(n.to_string()),
        Some(serde_yaml::Value::Bool(b)) => Ok(b.to_string()),
        Some(_) => Err(MappingError::MalformedGrid(format!(
            "row {} column '{}' is not a scalar",
            row_number, column
        ))),
    }
}
