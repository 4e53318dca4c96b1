// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reader shell.
//!
//! Each poll queries one measurement/field slice, filtered by the
//! configured tags, and publishes the decoded records. The range start
//! moves past the newest record seen so later polls only return new data.

use crate::client::ClientError;
use crate::config::{ConfigError, Parameters, ReaderSettings};
use crate::decode::ResultDecoder;
use crate::mapping::{GridLayout, MappingError, MappingTable};
use crate::ports::{ErrorEvent, EventSink, SecretResolver, TimeSeriesClient};
use crate::query::{QueryBuilder, QueryFilter};
use crate::validate::validate_reader;
use crate::value::{Attribute, AttributeType};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Endpoint decoded records are published to.
pub const OUTPUT_ENDPOINT: &str = "Output";

const POLL_OPERATION: &str = "Poll";

/// Reader shell errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("query failed: {0}")]
    Query(#[from] ClientError),
}

/// Polls the store and publishes decoded records.
pub struct ContextProvider {
    unique_id: i64,
    settings: ReaderSettings,
    tags: Arc<MappingTable>,
    fields: Arc<MappingTable>,
    client: Arc<dyn TimeSeriesClient>,
    sink: Arc<dyn EventSink>,
    /// Range start of the next poll once something has been read.
    watermark: Option<DateTime<Utc>>,
}

impl ContextProvider {
    pub fn initialize(
        params: &Parameters,
        secrets: &dyn SecretResolver,
        client: Arc<dyn TimeSeriesClient>,
        sink: Arc<dyn EventSink>,
        unique_id: i64,
    ) -> Result<Self, ProviderError> {
        let settings = ReaderSettings::resolve(params, secrets)?;
        let tags = MappingTable::parse(&settings.tag_grid, GridLayout::READER_TAGS)?;
        let fields = MappingTable::parse(&settings.field_grid, GridLayout::READER_FIELDS)?;
        ResultDecoder::new(&tags, &fields).check_columns()?;

        client.set_compression(settings.connection.enable_gzip);

        tracing::info!(
            provider = unique_id,
            bucket = %settings.bucket,
            measurement = %settings.measurement,
            tags = tags.len(),
            fields = fields.len(),
            "reader initialized"
        );

        Ok(Self {
            unique_id,
            settings,
            tags: Arc::new(tags),
            fields: Arc::new(fields),
            client,
            sink,
            watermark: None,
        })
    }

    /// Numbered problems with reader parameters.
    pub fn validate(params: &Parameters, secrets: &dyn SecretResolver) -> Vec<String> {
        validate_reader(params, secrets)
    }

    /// Schema of published records: the system columns, one column per tag
    /// mapping, then one per field mapping. All are strings.
    pub fn output_attributes(&self) -> Vec<Attribute> {
        ResultDecoder::new(&self.tags, &self.fields)
            .columns()
            .map(|name| Attribute::new(name, AttributeType::String))
            .collect()
    }

    pub fn unique_id(&self) -> i64 {
        self.unique_id
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    /// Range start the next poll would use.
    pub fn range_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.watermark.unwrap_or_else(|| {
            Duration::from_std(self.settings.lookback)
                .ok()
                .and_then(|lookback| now.checked_sub_signed(lookback))
                .unwrap_or_default()
        })
    }

    /// Flux text of the next poll.
    pub fn query_text(&self, now: DateTime<Utc>) -> String {
        let filter = QueryFilter::new(
            self.settings.bucket.as_str(),
            self.settings.measurement.as_str(),
            self.settings.field_key.as_str(),
        )
        .range_start(self.range_start(now))
        .tags_from(&self.tags);
        QueryBuilder::build(&filter)
    }

    /// Run one query and publish what it returns.
    ///
    /// Returns the number of records published. Query failures are
    /// returned to the caller; records with an unreadable `_time` are
    /// dropped and reported once through the sink.
    pub fn poll(&mut self) -> Result<usize, ProviderError> {
        let query = self.query_text(Utc::now());
        tracing::debug!(provider = self.unique_id, %query, "polling");

        let tables = self
            .client
            .run_query(&query, &self.settings.connection.org)?;
        let decoded = ResultDecoder::new(&self.tags, &self.fields).decode(&tables);

        if let Some(rejected) = &decoded.rejected {
            tracing::warn!(provider = self.unique_id, count = rejected.count, "result records dropped");
            self.sink.publish_error(ErrorEvent::now(
                self.unique_id,
                POLL_OPERATION,
                rejected.to_string(),
                rejected.first.clone(),
            ));
        }

        if let Some(latest) = decoded.latest_time {
            let next = latest
                .checked_add_signed(Duration::nanoseconds(1))
                .unwrap_or(latest);
            if self.watermark.map_or(true, |w| next > w) {
                self.watermark = Some(next);
            }
        }

        if decoded.is_empty() {
            return Ok(0);
        }

        tracing::debug!(provider = self.unique_id, records = decoded.records.len(), "publishing");
        self.sink.publish(&decoded.records, OUTPUT_ENDPOINT);
        Ok(decoded.records.len())
    }
}
