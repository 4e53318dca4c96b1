// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB Bridge
//!
//! Bidirectional adapter between generic key-value event records and the
//! InfluxDB v2 point/query model.
//!
//! This crate provides:
//! - Grid-based tag and field mapping tables
//! - Point construction with declared-type field coercion
//! - Flux filter-pipeline query composition with literal escaping
//! - Decoding of query tables back into flat records
//! - Numbered configuration validation
//! - A blocking InfluxDB v2 HTTP client (line protocol, gzip, annotated CSV)
//! - Writer (`ActionAgent`) and reader (`ContextProvider`) shells driven
//!   through injected ports
//!
//! # Overview
//!
//! ```text
//! write: Record --> PointBuilder --> Point --> PointWriter --> line protocol
//! read:  QueryBuilder --> Flux --> TimeSeriesClient --> Table --> ResultDecoder --> Record
//! ```

pub mod agent;
pub mod client;
pub mod config;
pub mod decode;
pub mod line_protocol;
pub mod mapping;
pub mod point;
pub mod ports;
pub mod provider;
pub mod query;
pub mod validate;
pub mod value;

pub use agent::{ActionAgent, AgentError};
pub use config::{BridgeFile, Parameters};
pub use decode::{Decoded, ResultDecoder, Table};
pub use mapping::{GridLayout, MappingEntry, MappingError, MappingTable};
pub use point::{FieldValue, Point, PointBuilder};
pub use ports::{
    AttributeSource, EventSink, PointWriter, SecretResolver, Settled, TimeSeriesClient,
};
pub use provider::{ContextProvider, ProviderError};
pub use query::{QueryBuilder, QueryFilter};
pub use value::{Attribute, AttributeType, Record, Scalar, TypeDictionary};
