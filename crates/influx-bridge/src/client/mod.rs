// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Time-series store clients.
//!
//! - [`http::HttpClient`]: blocking InfluxDB v2 HTTP API client
//! - [`memory::MemoryClient`]: in-process client for tests and dry runs

pub mod annotated_csv;
pub mod buffer;
pub mod http;
pub mod memory;

use crate::line_protocol::LineProtocolError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpClient;
pub use memory::MemoryClient;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("query failed: {0}")]
    Query(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("CSV line {line}: {message}")]
    Csv { line: usize, message: String },

    #[error("encoding error: {0}")]
    Encode(#[from] LineProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A storage bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "orgID", default)]
    pub org_id: String,
}

impl Bucket {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            org_id: String::new(),
        }
    }
}
