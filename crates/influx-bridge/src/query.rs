// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flux filter-pipeline query composition.
//!
//! ```text
//! from(bucket: "metrics")
//! |> range(start: 2024-01-01T00:00:00Z)
//! |> filter(fn: (r) => r["_measurement"] == "cpu")
//! |> filter(fn: (r) => r["_field"] == "usage")
//! |> filter(fn: (r) => r["host"] == "srv1")
//! ```
//!
//! Every embedded string literal is escaped, so names or values containing
//! quotes cannot close the literal and add clauses.

use crate::mapping::MappingTable;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write;

/// Column holding the measurement name.
pub const MEASUREMENT_COLUMN: &str = "_measurement";
/// Column holding the field key.
pub const FIELD_COLUMN: &str = "_field";

/// Selection of one measurement/field/tag slice of a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilter {
    pub bucket: String,
    pub range_start: Option<DateTime<Utc>>,
    pub measurement: String,
    pub field_key: String,
    /// `(tag name, required value)` pairs in configuration order.
    pub tag_filters: Vec<(String, String)>,
}

impl QueryFilter {
    pub fn new(
        bucket: impl Into<String>,
        measurement: impl Into<String>,
        field_key: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            range_start: None,
            measurement: measurement.into(),
            field_key: field_key.into(),
            tag_filters: Vec::new(),
        }
    }

    pub fn range_start(mut self, start: DateTime<Utc>) -> Self {
        self.range_start = Some(start);
        self
    }

    pub fn tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tag_filters.push((name.into(), value.into()));
        self
    }

    /// Use a reader tag table (tag name, value) as the tag filters.
    pub fn tags_from(mut self, table: &MappingTable) -> Self {
        self.tag_filters.extend(
            table
                .iter()
                .map(|e| (e.source_key.clone(), e.target_name.clone())),
        );
        self
    }
}

/// Builds Flux query text. Stateless.
pub struct QueryBuilder;

impl QueryBuilder {
    /// Compose the pipeline for `filter`. Each clause ends with a newline.
    pub fn build(filter: &QueryFilter) -> String {
        let mut query = String::new();

        // Writing into a String cannot fail.
        let _ = writeln!(query, "from(bucket: {})", flux_string(&filter.bucket));
        if let Some(start) = filter.range_start {
            let _ = writeln!(query, "|> range(start: {})", flux_time(start));
        }
        push_filter(&mut query, MEASUREMENT_COLUMN, &filter.measurement);
        push_filter(&mut query, FIELD_COLUMN, &filter.field_key);
        for (name, value) in &filter.tag_filters {
            push_filter(&mut query, name, value);
        }

        query
    }
}

fn push_filter(query: &mut String, column: &str, value: &str) {
    let _ = writeln!(
        query,
        "|> filter(fn: (r) => r[{}] == {})",
        flux_string(column),
        flux_string(value)
    );
}

/// Quote and escape a Flux string literal.
pub fn flux_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            // `${` opens string interpolation.
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// RFC 3339 UTC time literal with the shortest exact fractional seconds.
pub fn flux_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
