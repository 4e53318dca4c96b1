// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB v2 annotated CSV query responses.
//!
//! ```text
//! #datatype,string,long,dateTime:RFC3339,double,string
//! #group,false,false,false,false,true
//! #default,_result,,,,
//! ,result,table,_time,_value,host
//! ,,0,2024-01-01T00:00:00Z,1.5,srv1
//! ```
//!
//! Each block starts with a `#datatype` row and a fresh set of
//! annotations; the blank lines between blocks are skipped by the reader.
//! Consecutive rows sharing a `table` value form one table. The first
//! (unnamed) column carries annotation markers and is skipped.

use super::ClientError;
use crate::decode::{Table, TABLE_COLUMN};
use crate::value::{Record, Scalar};
use csv::{Position, ReaderBuilder, StringRecord};

/// Parse a complete response body into tables.
///
/// An error table (columns `error`, `reference`) is turned into
/// [`ClientError::Query`].
pub fn parse(text: &str) -> Result<Vec<Table>, ClientError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut tables: Vec<Table> = Vec::new();
    let mut block = Block::default();
    let mut current_table: Option<Scalar> = None;

    for row in reader.records() {
        let row = row.map_err(|e| ClientError::Csv {
            line: line_of(e.position()),
            message: e.to_string(),
        })?;
        let line = line_of(row.position());
        let marker = row.get(0).unwrap_or("");
        let cells = cells(&row);

        match marker {
            "#datatype" => {
                block = Block {
                    datatypes: cells,
                    ..Block::default()
                };
                current_table = None;
                continue;
            }
            "#default" => {
                block.defaults = cells;
                continue;
            }
            s if s.starts_with('#') => continue,
            _ => {}
        }

        if row.len() == 1 && marker.is_empty() {
            continue;
        }

        let Some(header) = block.header.as_ref() else {
            block.header = Some(cells);
            continue;
        };

        let record = block.record(header, &cells, line)?;

        if let Some(message) = error_message(&record) {
            return Err(ClientError::Query(message));
        }

        let table_id = record.lookup(TABLE_COLUMN).cloned().unwrap_or(Scalar::Null);
        match tables.last_mut() {
            Some(table) if current_table.as_ref() == Some(&table_id) => table.records.push(record),
            _ => {
                tables.push(Table::new(vec![record]));
                current_table = Some(table_id);
            }
        }
    }

    Ok(tables)
}

/// Cells after the annotation column.
fn cells(row: &StringRecord) -> Vec<String> {
    row.iter().skip(1).map(str::to_string).collect()
}

fn line_of(position: Option<&Position>) -> usize {
    position.map_or(0, |p| p.line() as usize)
}

#[derive(Default)]
struct Block {
    datatypes: Vec<String>,
    defaults: Vec<String>,
    header: Option<Vec<String>>,
}

impl Block {
    fn record(&self, header: &[String], cells: &[String], line: usize) -> Result<Record, ClientError> {
        let mut record = Record::new();
        for (i, name) in header.iter().enumerate() {
            if name.is_empty() {
                continue;
            }
            let mut raw = cells.get(i).map(String::as_str).unwrap_or("");
            if raw.is_empty() {
                raw = self.defaults.get(i).map(String::as_str).unwrap_or("");
            }
            let datatype = self.datatypes.get(i).map(String::as_str).unwrap_or("string");
            let value = convert(raw, datatype).map_err(|message| ClientError::Csv {
                line,
                message: format!("column '{}': {}", name, message),
            })?;
            record.insert(name.clone(), value);
        }
        Ok(record)
    }
}

fn convert(raw: &str, datatype: &str) -> Result<Scalar, String> {
    if raw.is_empty() {
        return Ok(match datatype {
            "string" => Scalar::String(String::new()),
            _ => Scalar::Null,
        });
    }

    match datatype {
        "long" => raw
            .parse::<i64>()
            .map(Scalar::Integer)
            .map_err(|e| format!("invalid long '{}': {}", raw, e)),
        "unsignedLong" => {
            let v = raw
                .parse::<u64>()
                .map_err(|e| format!("invalid unsignedLong '{}': {}", raw, e))?;
            Ok(i64::try_from(v).map_or(Scalar::Float(v as f64), Scalar::Integer))
        }
        "double" => raw
            .parse::<f64>()
            .map(Scalar::Float)
            .map_err(|e| format!("invalid double '{}': {}", raw, e)),
        "boolean" => match raw {
            "true" => Ok(Scalar::Boolean(true)),
            "false" => Ok(Scalar::Boolean(false)),
            other => Err(format!("invalid boolean '{}'", other)),
        },
        // dateTime:RFC3339, dateTime:RFC3339Nano, duration, base64Binary, string
        _ => Ok(Scalar::String(raw.to_string())),
    }
}

fn error_message(record: &Record) -> Option<String> {
    if !(record.contains_key("error") && record.contains_key("reference")) {
        return None;
    }
    let message = record.lookup("error").map(|v| v.to_string()).unwrap_or_default();
    let reference = record
        .lookup("reference")
        .map(|v| v.to_string())
        .unwrap_or_default();
    Some(if reference.is_empty() {
        message
    } else {
        format!("{} (reference {})", message, reference)
    })
}
