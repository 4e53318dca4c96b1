// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Query result tables back to flat records.

use crate::mapping::{MappingError, MappingTable};
use crate::query::{flux_time, FIELD_COLUMN, MEASUREMENT_COLUMN};
use crate::value::{Record, Scalar};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;

pub const RESULT_COLUMN: &str = "result";
pub const TABLE_COLUMN: &str = "table";
pub const START_COLUMN: &str = "_start";
pub const STOP_COLUMN: &str = "_stop";
pub const TIME_COLUMN: &str = "_time";
pub const VALUE_COLUMN: &str = "_value";

/// System columns copied into every decoded record, in output order.
pub const SYSTEM_COLUMNS: [&str; 8] = [
    RESULT_COLUMN,
    TABLE_COLUMN,
    START_COLUMN,
    STOP_COLUMN,
    TIME_COLUMN,
    VALUE_COLUMN,
    FIELD_COLUMN,
    MEASUREMENT_COLUMN,
];

/// One table of a query response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Rows keyed by column name.
    pub records: Vec<Record>,
}

impl Table {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

/// Records dropped by one decode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecords {
    pub count: usize,
    /// Failure message of the first dropped record.
    pub first: String,
}

impl fmt::Display for RejectedRecords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} record(s) dropped: {}", self.count, self.first)
    }
}

/// Outcome of decoding one query response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub records: Vec<Record>,
    /// Set when at least one record was dropped.
    pub rejected: Option<RejectedRecords>,
    /// Latest `_time` among the decoded records.
    pub latest_time: Option<DateTime<Utc>>,
}

impl Decoded {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Flattens query tables into records.
///
/// Tag entries echo the value configured in the reader tag table rather
/// than the value of the returned row; field entries read the same-named
/// column of the row.
pub struct ResultDecoder<'a> {
    tags: &'a MappingTable,
    fields: &'a MappingTable,
}

impl<'a> ResultDecoder<'a> {
    pub fn new(tags: &'a MappingTable, fields: &'a MappingTable) -> Self {
        Self { tags, fields }
    }

    /// Column names of decoded records, in order: system columns, tag
    /// source keys, field target names.
    pub fn columns(&self) -> impl Iterator<Item = &str> + '_ {
        SYSTEM_COLUMNS
            .iter()
            .copied()
            .chain(self.tags.iter().map(|e| e.source_key.as_str()))
            .chain(self.fields.iter().map(|e| e.target_name.as_str()))
    }

    /// Every column must be distinct, otherwise a later value would replace
    /// an earlier one in the decoded record. `row` is the offending row of
    /// the tag or field grid.
    pub fn check_columns(&self) -> Result<(), MappingError> {
        let rows = std::iter::repeat(0)
            .take(SYSTEM_COLUMNS.len())
            .chain(1..=self.tags.len())
            .chain(1..=self.fields.len());

        let mut seen = HashSet::new();
        for (name, row) in self.columns().zip(rows) {
            if !seen.insert(name) {
                return Err(MappingError::DuplicateTargetName {
                    name: name.to_string(),
                    row,
                });
            }
        }
        Ok(())
    }

    /// Decode every record of every table, in order.
    ///
    /// A record whose `_time` is missing or not an RFC 3339 instant is
    /// dropped. Drops are summarised once in [`Decoded::rejected`].
    pub fn decode(&self, tables: &[Table]) -> Decoded {
        let mut out = Decoded::default();

        for (t, table) in tables.iter().enumerate() {
            for (r, row) in table.records.iter().enumerate() {
                match parse_time(row) {
                    Ok(time) => {
                        out.latest_time = Some(out.latest_time.map_or(time, |l| l.max(time)));
                        out.records.push(self.flatten(row, time));
                    }
                    Err(reason) => {
                        tracing::debug!(table = t, record = r, %reason, "dropping result record");
                        match out.rejected.as_mut() {
                            Some(rejected) => rejected.count += 1,
                            None => {
                                out.rejected = Some(RejectedRecords {
                                    count: 1,
                                    first: format!("table {} record {}: {}", t, r, reason),
                                })
                            }
                        }
                    }
                }
            }
        }

        out
    }

    fn flatten(&self, row: &Record, time: DateTime<Utc>) -> Record {
        let mut record = Record::new();

        for column in SYSTEM_COLUMNS {
            let value = match column {
                TIME_COLUMN => Scalar::String(flux_time(time)),
                START_COLUMN | STOP_COLUMN => match row.lookup(column) {
                    Some(Scalar::Null) | None => Scalar::Null,
                    Some(v) => Scalar::String(v.to_string()),
                },
                _ => row.lookup(column).cloned().unwrap_or(Scalar::Null),
            };
            record.insert(column, value);
        }

        for entry in self.tags {
            record.insert(entry.source_key.clone(), entry.target_name.clone());
        }

        for entry in self.fields {
            let value = row.lookup(&entry.source_key).cloned().unwrap_or(Scalar::Null);
            record.insert(entry.target_name.clone(), value);
        }

        record
    }
}

fn parse_time(row: &Record) -> Result<DateTime<Utc>, String> {
    match row.lookup(TIME_COLUMN) {
        None | Some(Scalar::Null) => Err(format!("missing {}", TIME_COLUMN)),
        Some(value) => {
            let text = value.to_string();
            DateTime::parse_from_rfc3339(text.trim())
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| format!("invalid {} '{}': {}", TIME_COLUMN, text, e))
        }
    }
}
