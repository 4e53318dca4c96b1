// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Writer shell.
//!
//! Receives batches of event records from the host, turns each into a
//! point and writes it to the store, then forwards the batch downstream.
//!
//! Batch policy:
//! - the first record that cannot be mapped aborts the rest of the batch;
//!   the failure is reported once and the batch is not published
//! - a point the store rejects is reported, the remaining points are still
//!   written and the batch is published
//! - a point counts as written only once the request carrying it succeeded;
//!   a rejected request charges every point it carried

use crate::client::ClientError;
use crate::config::{ConfigError, Parameters, WriterSettings, MEASUREMENT_TITLE};
use crate::mapping::{GridLayout, MappingError, MappingTable};
use crate::point::PointBuilder;
use crate::ports::{
    AttributeSource, ErrorEvent, EventSink, PointWriter, PortError, SecretResolver, Settled,
    TimeSeriesClient,
};
use crate::validate::validate_writer;
use crate::value::{Attribute, AttributeType, Record, TypeDictionary};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

/// Endpoint the host delivers events on.
pub const INPUT_ENDPOINT: &str = "Input";
/// Endpoint written batches are published to.
pub const OUTPUT_ENDPOINT: &str = "Output";

const RECEIVE_OPERATION: &str = "Receive";

/// Writer shell errors.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("attribute discovery failed: {0}")]
    Attributes(#[from] PortError),

    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("event {index}: no MeasurementTitle in mapped event")]
    MissingMeasurement { index: usize },
}

/// Outcome of one `receive` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveReport {
    /// Points the store acknowledged.
    pub written: usize,
    /// One message per point that did not reach the store.
    pub write_failures: Vec<String>,
    /// Set when a mapping failure stopped the batch.
    pub aborted: Option<String>,
}

/// Running totals over the agent's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStats {
    pub points_written: u64,
    pub points_failed: u64,
    pub batches_published: u64,
    pub batches_aborted: u64,
}

/// Writes event records as points.
pub struct ActionAgent {
    unique_id: i64,
    settings: WriterSettings,
    tags: Arc<MappingTable>,
    fields: Arc<MappingTable>,
    types: TypeDictionary,
    upstream: Vec<Attribute>,
    client: Arc<dyn TimeSeriesClient>,
    sink: Arc<dyn EventSink>,
    stats: AgentStats,
}

impl ActionAgent {
    /// Resolve settings, parse the mapping grids and discover upstream
    /// attribute types. Nothing here is re-read afterwards.
    pub fn initialize(
        params: &Parameters,
        secrets: &dyn SecretResolver,
        client: Arc<dyn TimeSeriesClient>,
        attributes: &dyn AttributeSource,
        sink: Arc<dyn EventSink>,
        unique_id: i64,
    ) -> Result<Self, AgentError> {
        let settings = WriterSettings::resolve(params, secrets)?;
        let tags = MappingTable::parse(&settings.tag_grid, GridLayout::WRITER_TAGS)?;
        let fields = MappingTable::parse(&settings.field_grid, GridLayout::WRITER_FIELDS)?;
        let upstream = attributes.request_upstream_attributes(INPUT_ENDPOINT)?;
        let types = TypeDictionary::from_attributes(&upstream);

        client.set_compression(settings.connection.enable_gzip);

        tracing::info!(
            agent = unique_id,
            bucket = %settings.bucket,
            tags = tags.len(),
            fields = fields.len(),
            attributes = upstream.len(),
            "writer initialized"
        );

        Ok(Self {
            unique_id,
            settings,
            tags: Arc::new(tags),
            fields: Arc::new(fields),
            types,
            upstream,
            client,
            sink,
            stats: AgentStats::default(),
        })
    }

    /// Numbered problems with writer parameters.
    pub fn validate(params: &Parameters, secrets: &dyn SecretResolver) -> Vec<String> {
        validate_writer(params, secrets)
    }

    /// Attributes the agent expects on mapped events.
    pub fn input_attributes() -> Vec<Attribute> {
        vec![Attribute::new(MEASUREMENT_TITLE, AttributeType::String)]
    }

    /// Events pass through unchanged, so the output schema is the upstream one.
    pub fn output_attributes(&self) -> &[Attribute] {
        &self.upstream
    }

    pub fn unique_id(&self) -> i64 {
        self.unique_id
    }

    pub fn settings(&self) -> &WriterSettings {
        &self.settings
    }

    pub fn stats(&self) -> AgentStats {
        self.stats
    }

    /// Write one batch.
    ///
    /// `mapped[i]` carries the measurement name for `events[i]`. One write
    /// handle is held for the whole batch and released on every path.
    pub fn receive(&mut self, events: &[Record], mapped: &[Record]) -> ReceiveReport {
        let mut report = ReceiveReport::default();

        if let Err(e) = self.write_batch(events, mapped, &mut report) {
            let inner = std::error::Error::source(&e)
                .map(|s| s.to_string())
                .into_iter()
                .chain(report.write_failures.iter().cloned())
                .collect::<Vec<_>>()
                .join("; ");
            tracing::warn!(
                agent = self.unique_id,
                error = %e,
                written = report.written,
                failed = report.write_failures.len(),
                "batch aborted"
            );
            self.sink.publish_error(ErrorEvent::now(
                self.unique_id,
                RECEIVE_OPERATION,
                e.to_string(),
                inner,
            ));
            self.record(&report);
            self.stats.batches_aborted += 1;
            report.aborted = Some(e.to_string());
            return report;
        }

        if !report.write_failures.is_empty() {
            tracing::warn!(
                agent = self.unique_id,
                failed = report.write_failures.len(),
                written = report.written,
                "points rejected by store"
            );
            self.sink.publish_error(ErrorEvent::now(
                self.unique_id,
                RECEIVE_OPERATION,
                format!(
                    "{} of {} point(s) failed to write",
                    report.write_failures.len(),
                    events.len()
                ),
                report.write_failures.join("; "),
            ));
        }

        self.sink.publish(events, OUTPUT_ENDPOINT);
        self.record(&report);
        self.stats.batches_published += 1;
        report
    }

    /// Events handed to the writer wait in `pending` until a settled
    /// request accounts for them. The handle is flushed on every path,
    /// including an abort, so nothing is left to the release-time flush.
    fn write_batch(
        &self,
        events: &[Record],
        mapped: &[Record],
        report: &mut ReceiveReport,
    ) -> Result<(), AgentError> {
        let mut writer = self.client.open_writer()?;
        let mut pending = VecDeque::new();

        let result = self.write_points(writer.as_mut(), &mut pending, events, mapped, report);
        settle(&mut pending, writer.flush(), report);
        result
    }

    fn write_points(
        &self,
        writer: &mut dyn PointWriter,
        pending: &mut VecDeque<usize>,
        events: &[Record],
        mapped: &[Record],
        report: &mut ReceiveReport,
    ) -> Result<(), AgentError> {
        let builder = PointBuilder::new(&self.tags, &self.fields, &self.types);
        let bucket = self.settings.bucket.as_str();
        let org = self.settings.connection.org.as_str();

        for (index, event) in events.iter().enumerate() {
            let measurement = mapped
                .get(index)
                .and_then(|m| m.lookup(MEASUREMENT_TITLE))
                .map(|v| v.to_string())
                .filter(|m| !m.trim().is_empty())
                .ok_or(AgentError::MissingMeasurement { index })?;

            let point = builder.build(&measurement, event, index)?;
            tracing::debug!(index, measurement = %point.measurement, "writing point");

            pending.push_back(index);
            match writer.write_point(bucket, org, &point) {
                Ok(settled) => settle(pending, settled, report),
                Err(e) => {
                    pending.pop_back();
                    report.write_failures.push(format!("event {}: {}", index, e));
                }
            }
        }
        Ok(())
    }

    fn record(&mut self, report: &ReceiveReport) {
        self.stats.points_written += report.written as u64;
        self.stats.points_failed += report.write_failures.len() as u64;
    }
}

/// Charge settled requests to the oldest pending events.
fn settle(pending: &mut VecDeque<usize>, settled: Vec<Settled>, report: &mut ReceiveReport) {
    for Settled { points, outcome } in settled {
        let events = pending.drain(..points.min(pending.len()));
        match outcome {
            Ok(()) => report.written += events.len(),
            Err(e) => {
                let message = e.to_string();
                report
                    .write_failures
                    .extend(events.map(|index| format!("event {}: {}", index, message)));
            }
        }
    }
}
